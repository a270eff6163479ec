//! Document/view host.
//!
//! The host editor owns documents and the views showing them. A tail session
//! only needs to open (or re-focus) the document for its key, count the views
//! still showing it, and hear about view changes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::document::{LineBuffer, SharedDocument, TextDocument, ViewId};
use crate::error::TailError;
use crate::key::ResourceKey;

/// Capacity of the view event channel.
pub const VIEW_EVENT_CAPACITY: usize = 64;

/// Default height of views opened by [`InMemoryWorkspace`].
pub const DEFAULT_VIEW_HEIGHT: usize = 40;

/// A change in the set of open views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Opened { key: ResourceKey, view: ViewId },
    Closed { key: ResourceKey, view: ViewId },
}

pub trait Workspace: Send + Sync {
    /// Open the document for `key`, creating it if needed, and show it.
    fn open_document(&self, key: &ResourceKey) -> Result<SharedDocument, TailError>;

    /// The document for `key`, if one was opened.
    fn document(&self, key: &ResourceKey) -> Option<SharedDocument>;

    /// Bring an existing document to the front. Returns `false` if there is
    /// no document for `key`.
    fn focus_document(&self, key: &ResourceKey) -> bool;

    /// Number of views currently showing the document for `key`.
    fn open_view_count(&self, key: &ResourceKey) -> usize;

    /// Subscribe to view open/close events.
    fn subscribe(&self) -> broadcast::Receiver<ViewEvent>;
}

struct Inner {
    documents: BTreeMap<ResourceKey, Arc<Mutex<LineBuffer>>>,
    focused: Option<ResourceKey>,
    focus_requests: usize,
}

/// In-memory [`Workspace`] backed by [`LineBuffer`]s.
pub struct InMemoryWorkspace {
    inner: Mutex<Inner>,
    events: broadcast::Sender<ViewEvent>,
    view_height: usize,
}

impl Default for InMemoryWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::with_view_height(DEFAULT_VIEW_HEIGHT)
    }

    pub fn with_view_height(view_height: usize) -> Self {
        let (events, _) = broadcast::channel(VIEW_EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                documents: BTreeMap::new(),
                focused: None,
                focus_requests: 0,
            }),
            events,
            view_height,
        }
    }

    /// Concrete buffer behind `key`, for inspection.
    pub fn buffer(&self, key: &ResourceKey) -> Option<Arc<Mutex<LineBuffer>>> {
        lock_inner(&self.inner).documents.get(key).cloned()
    }

    /// Open an additional view on an existing document.
    pub fn open_view(&self, key: &ResourceKey) -> Option<ViewId> {
        let buffer = self.buffer(key)?;
        let view = lock_buffer(&buffer).open_view(self.view_height);
        self.publish(ViewEvent::Opened {
            key: key.clone(),
            view,
        });
        Some(view)
    }

    pub fn close_view(&self, key: &ResourceKey, view: ViewId) -> bool {
        let Some(buffer) = self.buffer(key) else {
            return false;
        };
        let closed = lock_buffer(&buffer).close_view(view);
        if closed {
            self.publish(ViewEvent::Closed {
                key: key.clone(),
                view,
            });
        }
        closed
    }

    /// Close every view of `key`'s document, like closing all its tabs.
    pub fn close_all_views(&self, key: &ResourceKey) -> usize {
        let Some(buffer) = self.buffer(key) else {
            return 0;
        };
        let views = lock_buffer(&buffer).views();
        views
            .into_iter()
            .filter(|view| self.close_view(key, *view))
            .count()
    }

    pub fn focused(&self) -> Option<ResourceKey> {
        lock_inner(&self.inner).focused.clone()
    }

    /// How many times a document was brought to the front.
    pub fn focus_requests(&self) -> usize {
        lock_inner(&self.inner).focus_requests
    }

    /// Document text of `key`, empty if absent.
    pub fn text(&self, key: &ResourceKey) -> String {
        self.buffer(key)
            .map(|buffer| lock_buffer(&buffer).text())
            .unwrap_or_default()
    }

    fn publish(&self, event: ViewEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn show(&self, key: &ResourceKey, buffer: &Arc<Mutex<LineBuffer>>) {
        let view = {
            let mut guard = lock_buffer(buffer);
            if guard.views().is_empty() {
                Some(guard.open_view(self.view_height))
            } else {
                None
            }
        };
        {
            let mut inner = lock_inner(&self.inner);
            inner.focused = Some(key.clone());
            inner.focus_requests += 1;
        }
        if let Some(view) = view {
            self.publish(ViewEvent::Opened {
                key: key.clone(),
                view,
            });
        }
    }
}

impl Workspace for InMemoryWorkspace {
    fn open_document(&self, key: &ResourceKey) -> Result<SharedDocument, TailError> {
        let buffer = {
            let mut inner = lock_inner(&self.inner);
            Arc::clone(
                inner
                    .documents
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(LineBuffer::new()))),
            )
        };
        self.show(key, &buffer);
        let document: SharedDocument = buffer;
        Ok(document)
    }

    fn document(&self, key: &ResourceKey) -> Option<SharedDocument> {
        self.buffer(key).map(|buffer| {
            let document: SharedDocument = buffer;
            document
        })
    }

    fn focus_document(&self, key: &ResourceKey) -> bool {
        match self.buffer(key) {
            Some(buffer) => {
                self.show(key, &buffer);
                true
            }
            None => false,
        }
    }

    fn open_view_count(&self, key: &ResourceKey) -> usize {
        self.buffer(key)
            .map(|buffer| lock_buffer(&buffer).views().len())
            .unwrap_or(0)
    }

    fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_buffer(buffer: &Mutex<LineBuffer>) -> MutexGuard<'_, LineBuffer> {
    match buffer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
