use crate::error::{Error, Result};
use crate::lookup::Lookup;
use reportkit_types::{CollectionId, Schema, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A single `path <lookup> value` constraint. `path` uses `__` separators.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub path: String,
    pub lookup: Lookup,
    pub value: Value,
}

impl Predicate {
    pub fn new(path: impl Into<String>, lookup: Lookup, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            lookup,
            value: value.into(),
        }
    }

    /// Build from a keyword-filter key such as `integer1__gt`.
    pub fn from_key(key: &str, value: impl Into<Value>) -> Self {
        let (path, lookup) = Lookup::split_key(key);
        Self::new(path, lookup, value)
    }

    pub fn key(&self) -> String {
        match self.lookup {
            Lookup::Exact => self.path.clone(),
            other => format!("{}__{}", self.path, other),
        }
    }

    fn validate(&self, schema: &Schema) -> Result<()> {
        if let Lookup::Range = self.lookup
            && !matches!(&self.value, Value::List(b) if b.len() == 2)
        {
            return Err(Error::InvalidLookup {
                key: self.key(),
                reason: "range needs exactly two bounds".to_string(),
            });
        }
        schema.require_field(&self.path)?;
        Ok(())
    }
}

/// Positional filter tree.
#[derive(Debug, Clone)]
pub enum Condition {
    Pred(Predicate),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// `path` is one of the ids selected by a sub-query.
    InQuery { path: String, query: Box<Query> },
}

impl Condition {
    pub fn kw(key: &str, value: impl Into<Value>) -> Self {
        Condition::Pred(Predicate::from_key(key, value))
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    fn validate(&self, schema: &Schema) -> Result<()> {
        match self {
            Condition::Pred(pred) => pred.validate(schema),
            Condition::And(items) | Condition::Or(items) => {
                items.iter().try_for_each(|c| c.validate(schema))
            }
            Condition::Not(inner) => inner.validate(schema),
            Condition::InQuery { path, query } => {
                schema.require_field(path)?;
                query.validate()
            }
        }
    }

    fn collect_touched(&self, schema: &Schema, out: &mut BTreeSet<CollectionId>) {
        match self {
            Condition::Pred(pred) => touch_path(schema, &pred.path, out),
            Condition::And(items) | Condition::Or(items) => {
                for item in items {
                    item.collect_touched(schema, out);
                }
            }
            Condition::Not(inner) => inner.collect_touched(schema, out),
            Condition::InQuery { path, query } => {
                touch_path(schema, path, out);
                out.extend(query.touched_collections());
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, items: &[Condition], op: &str| {
            let parts: Vec<String> = items.iter().map(|c| c.to_string()).collect();
            write!(f, "({})", parts.join(op))
        };
        match self {
            Condition::Pred(pred) => write!(f, "{}={}", pred.key(), pred.value.repr()),
            Condition::And(items) => join(f, items, " AND "),
            Condition::Or(items) => join(f, items, " OR "),
            Condition::Not(inner) => write!(f, "NOT {}", inner),
            Condition::InQuery { path, query } => write!(f, "{}__in=<{}>", path, query),
        }
    }
}

fn touch_path(schema: &Schema, path: &str, out: &mut BTreeSet<CollectionId>) {
    for related in schema.related_along(path) {
        out.insert(related.id.clone());
    }
}

/// Direction-tagged ordering path: `-name` sorts descending.
pub fn parse_ordering(spec: &str) -> (&str, bool) {
    match spec.strip_prefix('-') {
        Some(path) => (path, true),
        None => (spec, false),
    }
}

/// A filtered, ordered selection over one collection.
#[derive(Debug, Clone)]
pub struct Query {
    pub schema: Arc<Schema>,
    pub filters: Vec<Condition>,
    pub kwfilters: BTreeMap<String, Value>,
    pub order_by: Vec<String>,
}

impl Query {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            filters: Vec::new(),
            kwfilters: BTreeMap::new(),
            order_by: Vec::new(),
        }
    }

    pub fn collection(&self) -> &CollectionId {
        &self.schema.id
    }

    /// All constraints as predicates/conditions, keyword filters included.
    pub fn conditions(&self) -> Vec<Condition> {
        let mut all = self.filters.clone();
        all.extend(
            self.kwfilters
                .iter()
                .map(|(key, value)| Condition::kw(key, value.clone())),
        );
        all
    }

    /// Reject unknown paths before any backend sees the query.
    pub fn validate(&self) -> Result<()> {
        for condition in self.conditions() {
            condition.validate(&self.schema)?;
        }
        for spec in &self.order_by {
            let (path, _) = parse_ordering(spec);
            self.schema.require_field(path)?;
        }
        Ok(())
    }

    /// Every collection this query reads: the target, collections joined by
    /// filter and ordering paths, and those read by nested sub-queries.
    /// Sorted and deduplicated.
    pub fn touched_collections(&self) -> Vec<CollectionId> {
        let mut out = BTreeSet::new();
        out.insert(self.schema.id.clone());
        for condition in self.conditions() {
            condition.collect_touched(&self.schema, &mut out);
        }
        for spec in &self.order_by {
            let (path, _) = parse_ordering(spec);
            touch_path(&self.schema, path, &mut out);
        }
        out.into_iter().collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conditions: Vec<String> = self.conditions().iter().map(|c| c.to_string()).collect();
        write!(
            f,
            "{} WHERE [{}] ORDER BY [{}]",
            self.schema.id,
            conditions.join(", "),
            self.order_by.join(", ")
        )
    }
}
