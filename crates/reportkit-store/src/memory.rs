use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::query::{Condition, Query, parse_ordering};
use crate::signals::{ChangeEvent, ChangeKind, Signals};
use parking_lot::RwLock;
use reportkit_types::{Attr, CollectionId, Entity, FieldKind, Record, Schema, Value, split_path};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const MAX_RELATION_DEPTH: usize = 8;

struct Table {
    schema: Arc<Schema>,
    rows: Vec<Entity>,
    next_id: i64,
}

/// Process-local tables. Records are stored flat and joined on fetch.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<BTreeMap<CollectionId, Table>>,
    queries: AtomicUsize,
    signals: Signals,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, tables: &BTreeMap<CollectionId, Table>, query: &Query) -> Result<Vec<Entity>> {
        let table = tables
            .get(query.collection())
            .ok_or_else(|| Error::UnknownCollection(query.collection().to_string()))?;

        let conditions = query.conditions();
        let mut rows = Vec::new();
        for raw in &table.rows {
            let entity = hydrate(tables, raw, 0);
            if conditions
                .iter()
                .map(|c| self.eval(tables, c, &entity))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .all(|hit| hit)
            {
                rows.push(entity);
            }
        }

        rows.sort_by(|a, b| {
            for spec in &query.order_by {
                let (path, descending) = parse_ordering(spec);
                let ord = lookup_value(a, path).sort_cmp(&lookup_value(b, path));
                let ord = if descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            a.get("id").sort_cmp(b.get("id"))
        });
        Ok(rows)
    }

    fn eval(
        &self,
        tables: &BTreeMap<CollectionId, Table>,
        condition: &Condition,
        entity: &Entity,
    ) -> Result<bool> {
        Ok(match condition {
            Condition::Pred(pred) => pred
                .lookup
                .matches(&lookup_value(entity, &pred.path), &pred.value),
            Condition::And(items) => {
                for item in items {
                    if !self.eval(tables, item, entity)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Or(items) => {
                for item in items {
                    if self.eval(tables, item, entity)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::Not(inner) => !self.eval(tables, inner, entity)?,
            Condition::InQuery { path, query } => {
                let ids: Vec<Value> = self
                    .run(tables, query)?
                    .iter()
                    .map(|e| e.get("id").clone())
                    .collect();
                let lhs = lookup_value(entity, path);
                ids.iter().any(|id| lhs.loose_eq(id))
            }
        })
    }

    fn emit(&self, collection: &CollectionId, kind: ChangeKind, pk: Option<i64>) {
        self.signals.emit(&ChangeEvent {
            collection: collection.clone(),
            kind,
            pk,
        });
    }
}

/// Value compared by filters and ordering: a trailing relation yields the
/// related id and any null hop yields null.
pub(crate) fn lookup_value(record: &dyn Record, path: &str) -> Value {
    let segments = split_path(path);
    let last = segments.len() - 1;
    let mut current = record;
    for (idx, segment) in segments.iter().enumerate() {
        match current.attr(segment) {
            Some(Attr::Value(value)) if idx == last => return value,
            Some(Attr::Related(Some(related))) if idx == last => return related.pk(),
            Some(Attr::Related(Some(related))) => current = related,
            _ => return Value::Null,
        }
    }
    Value::Null
}

fn hydrate(tables: &BTreeMap<CollectionId, Table>, raw: &Entity, depth: usize) -> Entity {
    let mut entity = raw.clone();
    for field in &raw.schema().fields {
        let FieldKind::ForeignKey(related) = &field.kind else {
            continue;
        };
        let target = match raw.get(&field.name) {
            Value::Int(id) if depth < MAX_RELATION_DEPTH => tables
                .get(&related.id)
                .and_then(|t| t.rows.iter().find(|r| r.id() == Some(*id)))
                .map(|r| Arc::new(hydrate(tables, r, depth + 1))),
            _ => None,
        };
        entity.set_related(&field.name, target);
    }
    entity
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn register(&self, schema: Arc<Schema>) -> Result<()> {
        self.tables
            .write()
            .entry(schema.id.clone())
            .or_insert_with(|| Table {
                schema,
                rows: Vec::new(),
                next_id: 1,
            });
        Ok(())
    }

    fn schema(&self, collection: &CollectionId) -> Option<Arc<Schema>> {
        self.tables.read().get(collection).map(|t| t.schema.clone())
    }

    fn execute(&self, query: &Query) -> Result<Vec<Arc<Entity>>> {
        query.validate()?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(query = %query, "memory query");
        let tables = self.tables.read();
        Ok(self.run(&tables, query)?.into_iter().map(Arc::new).collect())
    }

    fn insert(&self, mut entity: Entity) -> Result<i64> {
        let collection = entity.collection().clone();
        let id = {
            let mut tables = self.tables.write();
            let table = tables
                .get_mut(&collection)
                .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
            let id = match entity.id() {
                Some(id) => id,
                None => table.next_id,
            };
            if table.rows.iter().any(|r| r.id() == Some(id)) {
                return Err(Error::Query(format!(
                    "UNIQUE constraint failed: {}.id = {}",
                    table.schema.table, id
                )));
            }
            table.next_id = table.next_id.max(id + 1);
            entity.set("id", id);
            table.rows.push(strip_relations(entity));
            id
        };
        self.emit(&collection, ChangeKind::Created, Some(id));
        Ok(id)
    }

    fn update(&self, entity: &Entity) -> Result<()> {
        let collection = entity.collection().clone();
        let id = entity
            .id()
            .ok_or_else(|| Error::Query("cannot update a record without id".to_string()))?;
        {
            let mut tables = self.tables.write();
            let table = tables
                .get_mut(&collection)
                .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
            let slot = table
                .rows
                .iter_mut()
                .find(|r| r.id() == Some(id))
                .ok_or_else(|| Error::Query(format!("{} {} does not exist", collection, id)))?;
            *slot = strip_relations(entity.clone());
        }
        self.emit(&collection, ChangeKind::Updated, Some(id));
        Ok(())
    }

    fn delete(&self, collection: &CollectionId, id: i64) -> Result<bool> {
        let removed = {
            let mut tables = self.tables.write();
            let table = tables
                .get_mut(collection)
                .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
            let before = table.rows.len();
            table.rows.retain(|r| r.id() != Some(id));
            table.rows.len() != before
        };
        if removed {
            self.emit(collection, ChangeKind::Deleted, Some(id));
        }
        Ok(removed)
    }

    fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    fn signals(&self) -> &Signals {
        &self.signals
    }
}

/// Keep only stored columns; relations are re-joined on every fetch.
fn strip_relations(entity: Entity) -> Entity {
    let schema = entity.schema().clone();
    let stored: BTreeSet<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
    let mut flat = Entity::new(schema.clone());
    for (name, value) in entity.values() {
        if stored.contains(name.as_str()) {
            flat.set(name, value.clone());
        }
    }
    flat
}
