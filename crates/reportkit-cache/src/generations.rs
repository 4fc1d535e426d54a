use crate::error::{Error, Result};
use crate::store::{CacheStore, CacheValue};
use reportkit_store::{ChangeEvent, Signals};
use reportkit_types::CollectionId;
use std::sync::Arc;

/// Store key of the global generation; bumping it invalidates every entry.
pub const GLOBAL_KEY: &str = "reportkit";

const MODELS_PREFIX: &str = "reportkit/models/";

/// Per-collection generation counters kept in a cache store.
pub struct Generations {
    store: Arc<dyn CacheStore>,
}

impl Generations {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn key_for(collection: &CollectionId) -> String {
        format!("{}{}", MODELS_PREFIX, collection)
    }

    fn read(&self, key: &str, default: i64) -> Result<i64> {
        Ok(match self.store.get(key)? {
            Some(CacheValue::Int(value)) => value,
            _ => default,
        })
    }

    /// Current generation; an untracked collection reads as 0.
    pub fn current(&self, collection: &CollectionId) -> Result<i64> {
        self.read(&Self::key_for(collection), 0)
    }

    /// Global generation; defaults to 1 until someone bumps it.
    pub fn global(&self) -> Result<i64> {
        self.read(GLOBAL_KEY, 1)
    }

    /// Force the counter to 0.
    pub fn reset(&self, collection: &CollectionId) -> Result<()> {
        tracing::debug!(collection = %collection, "resetting generation");
        self.store
            .set(&Self::key_for(collection), CacheValue::Int(0), None)
    }

    /// Bump the counter. A missing or non-numeric counter degrades to a reset.
    pub fn invalidate(&self, collection: &CollectionId) -> Result<i64> {
        match self.store.incr(&Self::key_for(collection), 1) {
            Ok(generation) => {
                tracing::debug!(collection = %collection, generation, "generation bumped");
                Ok(generation)
            }
            Err(err @ (Error::Missing(_) | Error::NotNumeric(_))) => {
                tracing::warn!(collection = %collection, error = %err, "generation counter unusable, resetting");
                self.reset(collection)?;
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Administrative "invalidate everything".
    pub fn bump_global(&self) -> Result<i64> {
        match self.store.incr(GLOBAL_KEY, 1) {
            Ok(generation) => Ok(generation),
            Err(Error::Missing(_) | Error::NotNumeric(_)) => {
                let next = self.global()? + 1;
                self.store.set(GLOBAL_KEY, CacheValue::Int(next), None)?;
                Ok(next)
            }
            Err(err) => Err(err),
        }
    }

    /// Initialise the counter if absent and hook it to the collection's
    /// change signal. Returns `false` when the hook was already connected.
    pub fn monitor(self: &Arc<Self>, collection: &CollectionId, signals: &Signals) -> Result<bool> {
        if self.store.get(&Self::key_for(collection))?.is_none() {
            self.reset(collection)?;
        }
        let generations = Arc::clone(self);
        let connected = signals.connect(
            collection,
            &format!("reportkit_invalidate_{}", collection),
            Arc::new(move |event: &ChangeEvent| {
                if let Err(err) = generations.invalidate(&event.collection) {
                    tracing::warn!(collection = %event.collection, error = %err, "failed to invalidate generation");
                }
            }),
        );
        if connected {
            tracing::debug!(collection = %collection, "monitoring collection");
        }
        Ok(connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use reportkit_store::ChangeKind;

    fn users() -> CollectionId {
        CollectionId::new("auth.User")
    }

    #[test]
    fn test_defaults() {
        let generations = Generations::new(Arc::new(MemoryStore::new()));
        assert_eq!(generations.current(&users()).unwrap(), 0);
        assert_eq!(generations.global().unwrap(), 1);
    }

    #[test]
    fn test_invalidate_on_missing_counter_resets() {
        let generations = Generations::new(Arc::new(MemoryStore::new()));
        assert_eq!(generations.invalidate(&users()).unwrap(), 0);
        assert_eq!(generations.invalidate(&users()).unwrap(), 1);
        assert_eq!(generations.current(&users()).unwrap(), 1);
    }

    #[test]
    fn test_invalidate_on_corrupted_counter_resets() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                &Generations::key_for(&users()),
                CacheValue::Bytes(b"garbage".to_vec()),
                None,
            )
            .unwrap();
        let generations = Generations::new(store);
        assert_eq!(generations.invalidate(&users()).unwrap(), 0);
        assert_eq!(generations.current(&users()).unwrap(), 0);
    }

    #[test]
    fn test_bump_global() {
        let generations = Generations::new(Arc::new(MemoryStore::new()));
        assert_eq!(generations.bump_global().unwrap(), 2);
        assert_eq!(generations.bump_global().unwrap(), 3);
        assert_eq!(generations.global().unwrap(), 3);
    }

    #[test]
    fn test_monitor_is_idempotent() {
        let generations = Arc::new(Generations::new(Arc::new(MemoryStore::new())));
        let signals = Signals::new();

        assert!(generations.monitor(&users(), &signals).unwrap());
        assert!(!generations.monitor(&users(), &signals).unwrap());
        assert_eq!(generations.current(&users()).unwrap(), 0);

        signals.emit(&ChangeEvent {
            collection: users(),
            kind: ChangeKind::Created,
            pk: Some(1),
        });
        assert_eq!(generations.current(&users()).unwrap(), 1);
    }

    #[test]
    fn test_monitor_keeps_existing_counter() {
        let generations = Arc::new(Generations::new(Arc::new(MemoryStore::new())));
        generations.reset(&users()).unwrap();
        generations.invalidate(&users()).unwrap();
        generations.invalidate(&users()).unwrap();

        generations.monitor(&users(), &Signals::new()).unwrap();
        assert_eq!(generations.current(&users()).unwrap(), 2);
    }
}
