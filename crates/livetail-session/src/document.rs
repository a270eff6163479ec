//! Bounded document mutation.
//!
//! A tail document is an external text buffer shown in zero or more views.
//! New lines are appended at the end and the oldest lines are trimmed in the
//! same atomic edit, so a renderer never observes the over-long intermediate
//! state. Views whose visible range covered the last line before the edit are
//! scrolled to the new last line; every other view is left where the user put
//! it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::TailError;
use crate::format::DisplayLine;

/// Identity of one view (editor tab/pane) onto a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(pub u64);

/// Half-open range of zero-based line indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line < self.end
    }
}

/// One operation of a [`DocumentEdit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Insert newline-terminated text before `line` (`line == line_count`
    /// appends).
    Insert { line: usize, text: String },
    /// Delete whole lines.
    Delete { range: LineRange },
}

/// An ordered batch of operations committed as one atomic change. Each
/// operation addresses the document as left by the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentEdit {
    pub ops: Vec<EditOp>,
}

impl DocumentEdit {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn inserted_lines(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                EditOp::Insert { text, .. } => text_line_count(text),
                EditOp::Delete { .. } => 0,
            })
            .sum()
    }

    pub fn deleted_lines(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                EditOp::Insert { .. } => 0,
                EditOp::Delete { range } => range.len(),
            })
            .sum()
    }
}

/// The document/view substrate a session writes into.
pub trait TextDocument: Send {
    fn line_count(&self) -> usize;

    /// Apply every operation or none of them.
    fn apply_edit(&mut self, edit: &DocumentEdit) -> Result<(), TailError>;

    /// Views currently showing this document.
    fn views(&self) -> Vec<ViewId>;

    fn visible_range(&self, view: ViewId) -> Option<LineRange>;

    /// Scroll `view` so that `line` is visible.
    fn reveal(&mut self, view: ViewId, line: usize);

    /// Remove all content.
    fn clear(&mut self);
}

/// A document shared between its session's pump and the host.
pub type SharedDocument = Arc<Mutex<dyn TextDocument>>;

/// Result of [`apply_lines`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub appended: usize,
    pub trimmed: usize,
}

/// Builds the edit that appends `lines` and trims the document back to
/// `max_lines`.
pub fn plan_edit(current_line_count: usize, lines: &[DisplayLine], max_lines: usize) -> DocumentEdit {
    if lines.is_empty() {
        return DocumentEdit::default();
    }

    let text: String = lines.iter().map(DisplayLine::as_str).collect();
    let new_line_count = text_line_count(&text);
    let mut ops = vec![EditOp::Insert {
        line: current_line_count,
        text,
    }];

    let total = current_line_count + new_line_count;
    if total > max_lines {
        let trim = total - max_lines;
        ops.push(EditOp::Delete {
            range: LineRange::new(0, trim),
        });
    }

    DocumentEdit { ops }
}

/// Appends `lines` to `document` as one atomic edit, trimming the oldest
/// lines so the document holds at most `max_lines`.
pub fn apply_lines(
    document: &mut dyn TextDocument,
    lines: &[DisplayLine],
    max_lines: usize,
) -> Result<ApplyOutcome, TailError> {
    let edit = plan_edit(document.line_count(), lines, max_lines);
    if edit.is_empty() {
        return Ok(ApplyOutcome::default());
    }
    document.apply_edit(&edit)?;
    Ok(ApplyOutcome {
        appended: edit.inserted_lines(),
        trimmed: edit.deleted_lines(),
    })
}

/// Views whose visible range contains the document's last line. An empty
/// document counts as scrolled to the bottom.
pub fn views_at_bottom(document: &dyn TextDocument) -> Vec<ViewId> {
    let line_count = document.line_count();
    document
        .views()
        .into_iter()
        .filter(|view| {
            if line_count == 0 {
                return true;
            }
            document
                .visible_range(*view)
                .is_some_and(|range| range.contains(line_count - 1))
        })
        .collect()
}

/// Reveals the last line in each of `views`.
pub fn reveal_last_line(document: &mut dyn TextDocument, views: &[ViewId]) {
    let Some(last) = document.line_count().checked_sub(1) else {
        return;
    };
    for view in views {
        document.reveal(*view, last);
    }
}

fn text_line_count(text: &str) -> usize {
    text.split_terminator('\n').count()
}

// ---------------------------------------------------------------------------
// LineBuffer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Viewport {
    top: usize,
    height: usize,
}

/// In-memory [`TextDocument`] holding whole lines, with fixed-height
/// viewports.
#[derive(Debug, Default)]
pub struct LineBuffer {
    lines: VecDeque<String>,
    views: BTreeMap<ViewId, Viewport>,
    next_view: u64,
    edits_applied: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a view showing `height` lines from the top of the document.
    pub fn open_view(&mut self, height: usize) -> ViewId {
        self.next_view += 1;
        let id = ViewId(self.next_view);
        self.views.insert(
            id,
            Viewport {
                top: 0,
                height: height.max(1),
            },
        );
        id
    }

    pub fn close_view(&mut self, view: ViewId) -> bool {
        self.views.remove(&view).is_some()
    }

    /// Scroll `view` so its first visible line is `top`.
    pub fn scroll_to(&mut self, view: ViewId, top: usize) {
        if let Some(viewport) = self.views.get_mut(&view) {
            viewport.top = top;
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Document text with every line newline-terminated.
    pub fn text(&self) -> String {
        self.lines.iter().map(|line| format!("{line}\n")).collect()
    }

    /// Number of successful [`TextDocument::apply_edit`] calls.
    pub fn edits_applied(&self) -> usize {
        self.edits_applied
    }

    fn check_edit(&self, edit: &DocumentEdit) -> Result<(), TailError> {
        let mut count = self.lines.len();
        for op in &edit.ops {
            match op {
                EditOp::Insert { line, text } => {
                    if *line > count {
                        return Err(TailError::Document {
                            message: format!("insert at line {line} past end ({count})"),
                        });
                    }
                    count += text_line_count(text);
                }
                EditOp::Delete { range } => {
                    if range.start > range.end || range.end > count {
                        return Err(TailError::Document {
                            message: format!(
                                "delete {}..{} outside document of {count} lines",
                                range.start, range.end
                            ),
                        });
                    }
                    count -= range.len();
                }
            }
        }
        Ok(())
    }
}

impl TextDocument for LineBuffer {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn apply_edit(&mut self, edit: &DocumentEdit) -> Result<(), TailError> {
        self.check_edit(edit)?;
        for op in &edit.ops {
            match op {
                EditOp::Insert { line, text } => {
                    for (offset, fragment) in text.split_terminator('\n').enumerate() {
                        self.lines.insert(line + offset, fragment.to_string());
                    }
                }
                EditOp::Delete { range } => {
                    self.lines.drain(range.start..range.end);
                }
            }
        }
        self.edits_applied += 1;
        Ok(())
    }

    fn views(&self) -> Vec<ViewId> {
        self.views.keys().copied().collect()
    }

    fn visible_range(&self, view: ViewId) -> Option<LineRange> {
        let viewport = self.views.get(&view)?;
        let count = self.lines.len();
        let start = viewport.top.min(count);
        let end = (viewport.top + viewport.height).min(count);
        Some(LineRange::new(start, end))
    }

    fn reveal(&mut self, view: ViewId, line: usize) {
        let Some(viewport) = self.views.get_mut(&view) else {
            return;
        };
        if line < viewport.top {
            viewport.top = line;
        } else if line >= viewport.top + viewport.height {
            viewport.top = line + 1 - viewport.height;
        }
    }

    fn clear(&mut self) {
        self.lines.clear();
        for viewport in self.views.values_mut() {
            viewport.top = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_record;
    use crate::transport::LogRecord;

    fn lines(messages: &[&str]) -> Vec<DisplayLine> {
        messages
            .iter()
            .enumerate()
            .filter_map(|(i, m)| format_record(&LogRecord::new(876_830_400_000 + i as i64 * 1000, *m)))
            .collect()
    }

    #[test]
    fn plan_appends_without_trim_under_budget() {
        let edit = plan_edit(3, &lines(&["a", "b"]), 10);
        assert_eq!(edit.ops.len(), 1);
        assert_eq!(edit.inserted_lines(), 2);
        assert_eq!(edit.deleted_lines(), 0);
        assert!(matches!(edit.ops[0], EditOp::Insert { line: 3, .. }));
    }

    #[test]
    fn plan_trims_exact_overflow() {
        let edit = plan_edit(9, &lines(&["a", "b", "c"]), 10);
        assert_eq!(
            edit.ops[1],
            EditOp::Delete {
                range: LineRange::new(0, 2)
            }
        );
    }

    #[test]
    fn plan_with_no_lines_is_empty() {
        assert!(plan_edit(5, &[], 1).is_empty());
    }

    #[test]
    fn trim_never_exceeds_prior_plus_new() {
        for current in 0..20 {
            for new in 1..20 {
                for max_lines in 1..25 {
                    let batch: Vec<String> = (0..new).map(|i| format!("m{i}")).collect();
                    let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
                    let edit = plan_edit(current, &lines(&refs), max_lines);
                    assert!(edit.deleted_lines() <= current + new);
                    assert_eq!(
                        current + edit.inserted_lines() - edit.deleted_lines(),
                        (current + new).min(max_lines)
                    );
                }
            }
        }
    }

    #[test]
    fn line_buffer_applies_insert_and_trim_atomically() {
        let mut doc = LineBuffer::new();
        let first = apply_lines(&mut doc, &lines(&["a", "b", "c"]), 4);
        assert_eq!(
            first,
            Ok(ApplyOutcome {
                appended: 3,
                trimmed: 0
            })
        );
        let second = apply_lines(&mut doc, &lines(&["d", "e"]), 4);
        assert_eq!(
            second,
            Ok(ApplyOutcome {
                appended: 2,
                trimmed: 1
            })
        );
        assert_eq!(doc.line_count(), 4);
        assert_eq!(doc.edits_applied(), 2);
        assert!(doc.lines()[0].ends_with("\tb"));
        assert!(doc.lines()[3].ends_with("\te"));
    }

    #[test]
    fn batch_larger_than_budget_keeps_newest_lines() {
        let mut doc = LineBuffer::new();
        let outcome = apply_lines(&mut doc, &lines(&["a", "b", "c"]), 1);
        assert_eq!(outcome.map(|o| o.trimmed), Ok(2));
        assert_eq!(doc.text(), "12:00:02\tc\n");
    }

    #[test]
    fn line_buffer_rejects_out_of_range_delete_without_mutating() {
        let mut doc = LineBuffer::new();
        let edit = DocumentEdit {
            ops: vec![
                EditOp::Insert {
                    line: 0,
                    text: "x\n".into(),
                },
                EditOp::Delete {
                    range: LineRange::new(0, 2),
                },
            ],
        };
        assert!(matches!(
            doc.apply_edit(&edit),
            Err(TailError::Document { .. })
        ));
        assert_eq!(doc.line_count(), 0);
        assert_eq!(doc.edits_applied(), 0);
    }

    #[test]
    fn empty_document_counts_as_bottom() {
        let mut doc = LineBuffer::new();
        let view = doc.open_view(5);
        assert_eq!(views_at_bottom(&doc), vec![view]);
    }

    #[test]
    fn view_at_bottom_follows_new_lines() {
        let mut doc = LineBuffer::new();
        let view = doc.open_view(3);
        for batch in [&["a", "b"][..], &["c", "d", "e"][..], &["f"][..]] {
            let follow = views_at_bottom(&doc);
            assert!(apply_lines(&mut doc, &lines(batch), 100).is_ok());
            reveal_last_line(&mut doc, &follow);
        }
        assert_eq!(doc.visible_range(view), Some(LineRange::new(3, 6)));
    }

    #[test]
    fn scrolled_back_view_is_left_alone() {
        let mut doc = LineBuffer::new();
        let view = doc.open_view(2);
        assert!(apply_lines(&mut doc, &lines(&["a", "b", "c", "d", "e"]), 100).is_ok());
        doc.scroll_to(view, 1);
        let before = doc.visible_range(view);

        let follow = views_at_bottom(&doc);
        assert!(follow.is_empty());
        assert!(apply_lines(&mut doc, &lines(&["f", "g"]), 100).is_ok());
        reveal_last_line(&mut doc, &follow);

        assert_eq!(doc.visible_range(view), before);
    }

    #[test]
    fn views_are_decided_independently() {
        let mut doc = LineBuffer::new();
        let following = doc.open_view(10);
        let reading = doc.open_view(2);
        assert!(apply_lines(&mut doc, &lines(&["a", "b", "c", "d"]), 100).is_ok());

        assert_eq!(views_at_bottom(&doc), vec![following]);
        let follow = views_at_bottom(&doc);
        assert!(apply_lines(&mut doc, &lines(&["e"; 12]), 100).is_ok());
        reveal_last_line(&mut doc, &follow);

        let last = doc.line_count() - 1;
        assert!(doc.visible_range(following).is_some_and(|r| r.contains(last)));
        assert_eq!(doc.visible_range(reading), Some(LineRange::new(0, 2)));
    }

    #[test]
    fn clear_empties_and_resets_views() {
        let mut doc = LineBuffer::new();
        let view = doc.open_view(2);
        assert!(apply_lines(&mut doc, &lines(&["a", "b", "c"]), 100).is_ok());
        doc.reveal(view, 2);
        doc.clear();
        assert_eq!(doc.line_count(), 0);
        assert_eq!(doc.visible_range(view), Some(LineRange::new(0, 0)));
    }
}
