use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::TailError;
use crate::key::ResourceKey;
use crate::session::{SessionSnapshot, TailSession};

struct Inner {
    sessions: BTreeMap<ResourceKey, Arc<TailSession>>,
}

/// Tracks live tail sessions by resource key, at most one per key.
///
/// Cloning yields another handle onto the same map. The lock is never held
/// across an await.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sessions: BTreeMap::new(),
            })),
        }
    }

    pub fn register(&self, session: Arc<TailSession>) -> Result<(), TailError> {
        let mut guard = lock_inner(&self.inner);
        let key = session.key().clone();
        if guard.sessions.contains_key(&key) {
            return Err(TailError::AlreadyExists {
                key: key.to_string(),
            });
        }
        guard.sessions.insert(key, session);
        Ok(())
    }

    pub fn lookup(&self, key: &ResourceKey) -> Result<Arc<TailSession>, TailError> {
        let guard = lock_inner(&self.inner);
        match guard.sessions.get(key) {
            Some(session) => Ok(Arc::clone(session)),
            None => Err(TailError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Remove the entry for `key`, if any.
    pub fn remove(&self, key: &ResourceKey) -> Option<Arc<TailSession>> {
        lock_inner(&self.inner).sessions.remove(key)
    }

    /// Remove the entry for `key` only if it is the session `instance_id`.
    pub fn remove_instance(
        &self,
        key: &ResourceKey,
        instance_id: &str,
    ) -> Option<Arc<TailSession>> {
        let mut guard = lock_inner(&self.inner);
        let matches = guard
            .sessions
            .get(key)
            .is_some_and(|session| session.instance_id() == instance_id);
        if matches {
            guard.sessions.remove(key)
        } else {
            None
        }
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        lock_inner(&self.inner).sessions.contains_key(key)
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        lock_inner(&self.inner).sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock_inner(&self.inner).sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<TailSession>> =
            lock_inner(&self.inner).sessions.values().cloned().collect();
        sessions.iter().map(|session| session.snapshot()).collect()
    }
}

fn lock_inner(inner: &Arc<Mutex<Inner>>) -> MutexGuard<'_, Inner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::StreamFilter;
    use crate::mock::{test_config, MockScript, MockTransport};

    fn session(config: crate::key::SessionConfiguration) -> Arc<TailSession> {
        let transport = MockTransport::new(MockScript::frames(Vec::new()));
        match TailSession::new(config, 10, Box::new(transport)) {
            Ok(session) => Arc::new(session),
            Err(err) => panic!("session: {err}"),
        }
    }

    #[test]
    fn register_rejects_duplicate_key() {
        let registry = SessionRegistry::new();
        let first = session(test_config("g"));
        let second = session(test_config("g").with_stream_filter(StreamFilter::All));

        assert!(registry.register(Arc::clone(&first)).is_ok());
        assert_eq!(
            registry.register(second),
            Err(TailError::AlreadyExists {
                key: first.key().to_string()
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn second_session_registers_after_first_is_removed() {
        let registry = SessionRegistry::new();
        let first = session(test_config("g"));
        let second = session(test_config("g"));

        assert!(registry.register(Arc::clone(&first)).is_ok());
        assert!(registry.remove(first.key()).is_some());
        assert!(registry.register(Arc::clone(&second)).is_ok());
        assert!(registry.contains(second.key()));
    }

    #[test]
    fn lookup_missing_key_is_not_found() {
        let registry = SessionRegistry::new();
        let key = test_config("g").key();
        assert!(matches!(
            registry.lookup(&key),
            Err(TailError::NotFound { .. })
        ));
    }

    #[test]
    fn remove_is_a_no_op_when_absent() {
        let registry = SessionRegistry::new();
        let key = test_config("g").key();
        assert!(registry.remove(&key).is_none());
        assert!(registry.remove(&key).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_instance_ignores_other_instances() {
        let registry = SessionRegistry::new();
        let old = session(test_config("g"));
        let current = session(test_config("g"));
        assert!(registry.register(Arc::clone(&current)).is_ok());

        assert!(registry.remove_instance(old.key(), old.instance_id()).is_none());
        assert!(registry.contains(current.key()));

        assert!(registry
            .remove_instance(current.key(), current.instance_id())
            .is_some());
        assert!(!registry.contains(current.key()));
    }

    #[test]
    fn clones_share_state() {
        let registry = SessionRegistry::new();
        let handle = registry.clone();
        let s = session(test_config("g"));
        assert!(registry.register(Arc::clone(&s)).is_ok());
        assert!(handle.contains(s.key()));
        assert_eq!(handle.keys(), vec![s.key().clone()]);
        assert_eq!(handle.snapshots().len(), 1);
    }
}
