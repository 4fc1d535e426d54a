use parking_lot::Mutex;
use reportkit_types::CollectionId;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Emitted by a backend after every mutation of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: CollectionId,
    pub kind: ChangeKind,
    pub pk: Option<i64>,
}

pub type Hook = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

struct Connection {
    collection: CollectionId,
    uid: String,
    hook: Hook,
}

/// Change-notification hook registry.
///
/// Hooks are keyed by `(collection, dispatch uid)`; connecting the same pair
/// twice keeps the first hook, so a mutation never fires it twice.
#[derive(Default)]
pub struct Signals {
    connections: Mutex<Vec<Connection>>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `(collection, uid)` was already connected.
    pub fn connect(&self, collection: &CollectionId, uid: &str, hook: Hook) -> bool {
        let mut connections = self.connections.lock();
        if connections
            .iter()
            .any(|c| &c.collection == collection && c.uid == uid)
        {
            tracing::trace!(collection = %collection, uid, "hook already connected");
            return false;
        }
        connections.push(Connection {
            collection: collection.clone(),
            uid: uid.to_string(),
            hook,
        });
        true
    }

    pub fn disconnect(&self, collection: &CollectionId, uid: &str) -> bool {
        let mut connections = self.connections.lock();
        let before = connections.len();
        connections.retain(|c| !(&c.collection == collection && c.uid == uid));
        connections.len() != before
    }

    pub fn is_connected(&self, collection: &CollectionId, uid: &str) -> bool {
        self.connections
            .lock()
            .iter()
            .any(|c| &c.collection == collection && c.uid == uid)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Invoke every hook registered for the event's collection.
    ///
    /// Hooks run after the lock is released, so a hook may connect others.
    pub fn emit(&self, event: &ChangeEvent) {
        let hooks: Vec<Hook> = self
            .connections
            .lock()
            .iter()
            .filter(|c| c.collection == event.collection)
            .map(|c| c.hook.clone())
            .collect();
        tracing::trace!(
            collection = %event.collection,
            kind = ?event.kind,
            hook_count = hooks.len(),
            "emitting change"
        );
        for hook in hooks {
            hook(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_hook(counter: &Arc<AtomicUsize>) -> Hook {
        let counter = counter.clone();
        Arc::new(move |_: &ChangeEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn event(collection: &str) -> ChangeEvent {
        ChangeEvent {
            collection: CollectionId::new(collection),
            kind: ChangeKind::Updated,
            pk: Some(1),
        }
    }

    #[test]
    fn test_connect_is_idempotent_per_uid() {
        let signals = Signals::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let users = CollectionId::new("auth.User");

        assert!(signals.connect(&users, "save", counter_hook(&hits)));
        assert!(!signals.connect(&users, "save", counter_hook(&hits)));
        signals.emit(&event("auth.User"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_only_reaches_matching_collection() {
        let signals = Signals::new();
        let hits = Arc::new(AtomicUsize::new(0));
        signals.connect(&CollectionId::new("auth.User"), "a", counter_hook(&hits));

        signals.emit(&event("auth.Group"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(signals.disconnect(&CollectionId::new("auth.User"), "a"));
        signals.emit(&event("auth.User"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
