use crate::path::format_template;
use crate::schema::{CollectionId, FieldKind, Schema};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A computed attribute: evaluated lazily against the record that owns it.
pub type Computed = Arc<dyn Fn(&dyn Record) -> std::result::Result<Value, String> + Send + Sync>;

pub fn computed<F>(func: F) -> Computed
where
    F: Fn(&dyn Record) -> std::result::Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(func)
}

/// What a single attribute lookup on a record yields.
pub enum Attr<'a> {
    Value(Value),
    /// A relation; `None` when the relation is null.
    Related(Option<&'a dyn Record>),
    /// Something invocable. Column extraction calls it with the owning record.
    Method(Computed),
}

impl fmt::Debug for Attr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Attr::Related(r) => f.debug_tuple("Related").field(r).finish(),
            Attr::Method(_) => f.write_str("Method(..)"),
        }
    }
}

/// A source record that column paths can be walked against.
pub trait Record: Send + Sync + fmt::Debug {
    fn collection(&self) -> &CollectionId;

    fn attr(&self, name: &str) -> Option<Attr<'_>>;

    /// Human readable form, used when a path ends on a relation.
    fn display(&self) -> String;

    fn pk(&self) -> Value {
        match self.attr("id") {
            Some(Attr::Value(v)) => v,
            _ => Value::Null,
        }
    }

    /// Data-only copy that can outlive the process, if the record has one.
    fn snapshot(&self) -> Option<EntitySnapshot> {
        None
    }
}

/// Field values and loaded relations of an entity, without its schema.
///
/// Computed attributes live on the schema, so they come back with
/// [`Entity::restore`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, Option<EntitySnapshot>>,
}

/// The concrete record produced by every backend.
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<Schema>,
    values: BTreeMap<String, Value>,
    relations: BTreeMap<String, Option<Arc<Entity>>>,
}

impl Entity {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Raw stored value; for relations this is the related id.
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn id(&self) -> Option<i64> {
        match self.get("id") {
            Value::Int(id) => Some(*id),
            _ => None,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Attach a loaded relation. The raw id is kept in sync.
    pub fn set_related(&mut self, name: &str, related: Option<Arc<Entity>>) {
        let id = related
            .as_ref()
            .and_then(|e| e.id())
            .map(Value::Int)
            .unwrap_or(Value::Null);
        self.values.insert(name.to_string(), id);
        self.relations.insert(name.to_string(), related);
    }

    pub fn related(&self, name: &str) -> Option<&Arc<Entity>> {
        self.relations.get(name).and_then(|r| r.as_ref())
    }

    /// Rebuild an entity from a snapshot. Relations the schema no longer
    /// declares are dropped.
    pub fn restore(schema: Arc<Schema>, snapshot: EntitySnapshot) -> Entity {
        let mut relations = BTreeMap::new();
        for (name, related) in snapshot.relations {
            let Some(target) = schema.get_field(&name).and_then(|f| f.kind.related()) else {
                continue;
            };
            let related = related.map(|snap| Arc::new(Entity::restore(target.clone(), snap)));
            relations.insert(name, related);
        }
        Entity {
            schema,
            values: snapshot.values,
            relations,
        }
    }
}

impl Record for Entity {
    fn collection(&self) -> &CollectionId {
        &self.schema.id
    }

    fn attr(&self, name: &str) -> Option<Attr<'_>> {
        if let Some(field) = self.schema.get_field(name) {
            if let FieldKind::ForeignKey(_) = field.kind {
                let related = self
                    .relations
                    .get(name)
                    .and_then(|r| r.as_deref())
                    .map(|e| e as &dyn Record);
                return Some(Attr::Related(related));
            }
            return Some(Attr::Value(self.get(name).clone()));
        }
        if let Some(fk) = name.strip_suffix("_id")
            && self
                .schema
                .get_field(fk)
                .is_some_and(|f| f.kind.is_relation())
        {
            return Some(Attr::Value(self.get(fk).clone()));
        }
        self.schema
            .get_method(name)
            .map(|func| Attr::Method(func.clone()))
    }

    fn display(&self) -> String {
        match &self.schema.display {
            Some(template) => format_template(template, self).unwrap_or_default(),
            None => format!("{} object ({})", self.schema.id.name(), self.get("id")),
        }
    }

    fn snapshot(&self) -> Option<EntitySnapshot> {
        Some(EntitySnapshot {
            values: self.values.clone(),
            relations: self
                .relations
                .iter()
                .map(|(name, related)| (name.clone(), related.as_ref().and_then(|e| e.snapshot())))
                .collect(),
        })
    }
}
