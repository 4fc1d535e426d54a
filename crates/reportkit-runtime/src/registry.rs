use crate::{Error, Result};
use reportkit_cache::Generations;
use reportkit_engine::Report;
use reportkit_store::Backend;
use reportkit_types::CollectionId;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Builds a fresh report on every call.
pub type ReportFactory = Arc<dyn Fn() -> Result<Report> + Send + Sync>;

struct Entry {
    name: String,
    collection: CollectionId,
    factory: ReportFactory,
}

/// Named report factories.
///
/// Registering a report starts generation monitoring on its target
/// collection, once per collection, so cached rows go stale as soon as
/// the backend reports a change.
pub struct ReportRegistry {
    backend: Arc<dyn Backend>,
    generations: Arc<Generations>,
    entries: Vec<Entry>,
    monitored: BTreeSet<CollectionId>,
}

impl ReportRegistry {
    pub fn new(backend: Arc<dyn Backend>, generations: Arc<Generations>) -> Self {
        Self {
            backend,
            generations,
            entries: Vec::new(),
            monitored: BTreeSet::new(),
        }
    }

    /// Register (or replace) `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        collection: CollectionId,
        factory: ReportFactory,
    ) -> Result<()> {
        self.monitor(&collection)?;
        let name = name.into();
        tracing::debug!(report = %name, collection = %collection, "registering report");

        let entry = Entry {
            name,
            collection,
            factory,
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Hook generation invalidation to `collection`. Returns `false` when it
    /// was already monitored.
    pub fn monitor(&mut self, collection: &CollectionId) -> Result<bool> {
        if self.monitored.contains(collection) {
            return Ok(false);
        }
        self.generations
            .monitor(collection, self.backend.signals())?;
        self.monitored.insert(collection.clone());
        Ok(true)
    }

    pub fn monitored(&self) -> impl Iterator<Item = &CollectionId> {
        self.monitored.iter()
    }

    /// `(name, collection)` in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CollectionId)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), &entry.collection))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    /// `(value, label)` pairs for a report picker.
    pub fn choices(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.name.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<&ReportFactory> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.factory)
            .ok_or_else(|| Error::UnknownReport(name.to_string()))
    }

    pub fn build(&self, name: &str) -> Result<Report> {
        (self.get(name)?)()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportkit_cache::MemoryStore;
    use reportkit_engine::{DatasourceOptions, ReportOptions};
    use reportkit_testing::fixtures::{demo_backend, insert_simple};

    #[test]
    fn test_register_monitors_each_collection_once() -> anyhow::Result<()> {
        let (backend, schemas) = demo_backend()?;
        let generations = Arc::new(Generations::new(Arc::new(MemoryStore::new())));
        let mut registry = ReportRegistry::new(backend.clone(), generations.clone());

        for name in ["first", "second"] {
            let backend = backend.clone();
            let schema = schemas.simple.clone();
            registry.register(
                name,
                schemas.simple.id.clone(),
                Arc::new(move || -> Result<Report> {
                    Ok(Report::as_report(ReportOptions {
                        datasource_options: Some(DatasourceOptions::for_schema(
                            backend.clone(),
                            schema.clone(),
                        )),
                        ..ReportOptions::default()
                    })?)
                }),
            )?;
        }

        assert_eq!(registry.monitored().count(), 1);
        assert_eq!(
            registry.choices(),
            [
                ("first".to_string(), "first".to_string()),
                ("second".to_string(), "second".to_string())
            ]
        );
        assert!(registry.contains("second"));

        let before = generations.current(&schemas.simple.id)?;
        insert_simple(backend.as_ref(), &schemas, "abc", 1, 2)?;
        assert_eq!(generations.current(&schemas.simple.id)?, before + 1);

        assert_eq!(registry.build("first")?.rows()?.len(), 1);
        assert!(matches!(
            registry.build("missing"),
            Err(Error::UnknownReport(name)) if name == "missing"
        ));
        Ok(())
    }
}
