use crate::error::Result;
use crate::query::{Condition, Query};
use crate::signals::Signals;
use reportkit_types::{CollectionId, Entity, Schema, Value};
use std::fmt;
use std::sync::Arc;

/// A store of collections that can answer `Query`s.
///
/// Every top-level `execute` counts as exactly one query, however many
/// statements the backend needs internally to load related records.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make a collection known to the backend (creates storage if needed).
    fn register(&self, schema: Arc<Schema>) -> Result<()>;

    fn schema(&self, collection: &CollectionId) -> Option<Arc<Schema>>;

    fn execute(&self, query: &Query) -> Result<Vec<Arc<Entity>>>;

    /// Insert a record; assigns an id when the entity has none.
    fn insert(&self, entity: Entity) -> Result<i64>;

    fn update(&self, entity: &Entity) -> Result<()>;

    fn delete(&self, collection: &CollectionId, id: i64) -> Result<bool>;

    fn query_count(&self) -> usize;

    fn reset_query_count(&self);

    fn signals(&self) -> &Signals;
}

/// A lazily evaluated selection bound to a backend.
#[derive(Clone)]
pub struct QuerySet {
    backend: Arc<dyn Backend>,
    query: Query,
}

impl fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("backend", &self.backend.name())
            .field("query", &self.query.to_string())
            .finish()
    }
}

impl QuerySet {
    /// Every record of `schema`.
    pub fn all(backend: Arc<dyn Backend>, schema: Arc<Schema>) -> Self {
        Self {
            backend,
            query: Query::new(schema),
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.query.filters.push(condition);
        self
    }

    pub fn filter_kw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.kwfilters.insert(key.into(), value.into());
        self
    }

    /// Replaces any previous ordering.
    pub fn order_by<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.query.order_by = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    pub fn fetch(&self) -> Result<Vec<Arc<Entity>>> {
        self.backend.execute(&self.query)
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.query.schema
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn touched_collections(&self) -> Vec<CollectionId> {
        self.query.touched_collections()
    }
}
