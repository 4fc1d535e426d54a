use crate::columns::{Column, ColumnSpec};
use crate::error::{ConfigurationError, Error, Result};
use crate::row::DatasourceRow;
use once_cell::sync::OnceCell;
use reportkit_cache::{CacheManager, DummyCacheManager, KeyInput};
use reportkit_store::{Backend, Condition, Query, QuerySet};
use reportkit_types::{CollectionId, Entity, EntitySnapshot, Record, Schema, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Function of a record exposed as a datasource attribute.
pub type RecordFn = Arc<dyn Fn(&dyn Record) -> std::result::Result<Value, String> + Send + Sync>;

/// Runs before a row is built. `Err(Error::RecordFiltered)` skips the record
/// silently; any other error skips it with a warning.
pub type RecordHook = Arc<dyn Fn(&dyn Record, &Datasource) -> Result<()> + Send + Sync>;

/// Runs on each built row, with the same skip semantics as `RecordHook`.
pub type RowHook = Arc<dyn Fn(&DatasourceRow) -> Result<()> + Send + Sync>;

/// Named value on the datasource itself, consulted when a column path is
/// not found on the record.
#[derive(Clone)]
pub enum DatasourceAttr {
    Value(Value),
    Callable(RecordFn),
}

impl fmt::Debug for DatasourceAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasourceAttr::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DatasourceAttr::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

/// Cache payload entry: the row plus a snapshot of its source record.
#[derive(Serialize)]
struct CachedRowRef<'a> {
    row: &'a DatasourceRow,
    original: Option<EntitySnapshot>,
}

#[derive(Deserialize)]
struct CachedRow {
    row: DatasourceRow,
    #[serde(default)]
    original: Option<EntitySnapshot>,
}

/// Everything a datasource can be built from.
#[derive(Default, Clone)]
pub struct DatasourceOptions {
    pub backend: Option<Arc<dyn Backend>>,
    pub schema: Option<Arc<Schema>>,
    /// Base selection; wins over `schema`/`backend` when set.
    pub queryset: Option<QuerySet>,
    /// `None` means one column per schema field.
    pub columns: Option<Vec<ColumnSpec>>,
    pub filters: Vec<Condition>,
    pub kwfilters: BTreeMap<String, Value>,
    pub order_by: Option<Vec<String>>,
    pub extras: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, DatasourceAttr>,
    /// Collections whose mutation must also invalidate cached results.
    pub dependent_models: Vec<CollectionId>,
    pub use_cache: bool,
    pub cache_manager: Option<Arc<dyn CacheManager>>,
    pub record_filter: Option<RecordHook>,
    pub custom_filters: Vec<RowHook>,
}

impl DatasourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_schema(backend: Arc<dyn Backend>, schema: Arc<Schema>) -> Self {
        Self {
            backend: Some(backend),
            schema: Some(schema),
            ..Self::default()
        }
    }

    pub fn for_queryset(queryset: QuerySet) -> Self {
        Self {
            queryset: Some(queryset),
            ..Self::default()
        }
    }

    pub fn columns<S: Into<ColumnSpec>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filters.push(condition);
        self
    }

    pub fn filter_kw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwfilters.insert(key.into(), value.into());
        self
    }

    pub fn order_by<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.order_by = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, attr: DatasourceAttr) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    pub fn depends_on(mut self, collection: impl Into<CollectionId>) -> Self {
        self.dependent_models.push(collection.into());
        self
    }

    pub fn cached(mut self, manager: Arc<dyn CacheManager>) -> Self {
        self.use_cache = true;
        self.cache_manager = Some(manager);
        self
    }

    pub fn record_filter(mut self, hook: RecordHook) -> Self {
        self.record_filter = Some(hook);
        self
    }

    pub fn custom_filter(mut self, hook: RowHook) -> Self {
        self.custom_filters.push(hook);
        self
    }
}

/// Binds columns to a queryable collection and materializes rows once.
pub struct Datasource {
    schema: Arc<Schema>,
    base: QuerySet,
    columns: Vec<Arc<Column>>,
    filters: Vec<Condition>,
    kwfilters: BTreeMap<String, Value>,
    order_by: Option<Vec<String>>,
    extras: BTreeMap<String, Value>,
    attributes: BTreeMap<String, DatasourceAttr>,
    dependent_models: Vec<CollectionId>,
    cache: Arc<dyn CacheManager>,
    use_cache: bool,
    record_filter: Option<RecordHook>,
    custom_filters: Vec<RowHook>,
    result: OnceCell<Vec<DatasourceRow>>,
}

impl fmt::Debug for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datasource")
            .field("collection", &self.schema.id)
            .field(
                "columns",
                &self.columns.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("kwfilters", &self.kwfilters)
            .field("order_by", &self.order_by)
            .field("use_cache", &self.use_cache)
            .field("materialized", &self.result.get().map(Vec::len))
            .finish()
    }
}

impl Datasource {
    /// Validate options and bind columns to the target schema.
    pub fn as_datasource(options: DatasourceOptions) -> Result<Self> {
        let base = match (options.queryset, options.schema, options.backend) {
            (Some(queryset), _, _) => queryset,
            (None, Some(schema), Some(backend)) => QuerySet::all(backend, schema),
            (None, Some(_), None) => return Err(ConfigurationError::MissingBackend.into()),
            (None, None, _) => return Err(ConfigurationError::MissingCollection.into()),
        };
        let schema = base.schema().clone();

        let specs = options.columns.unwrap_or_else(|| {
            schema
                .field_names()
                .into_iter()
                .map(|name| ColumnSpec::Name(name.to_string()))
                .collect()
        });
        let mut columns: Vec<Arc<Column>> = Vec::with_capacity(specs.len());
        for spec in specs {
            let column = spec.into_column(&schema);
            if column.name().is_empty() {
                return Err(ConfigurationError::InvalidColumn(format!(
                    "`{}` has an empty name",
                    column.attr()
                ))
                .into());
            }
            if columns.iter().any(|c| c.name() == column.name()) {
                return Err(ConfigurationError::InvalidColumn(format!(
                    "duplicate column name `{}`",
                    column.name()
                ))
                .into());
            }
            columns.push(Arc::new(column));
        }

        let cache: Arc<dyn CacheManager> = match (options.use_cache, options.cache_manager) {
            (true, Some(manager)) => manager,
            (true, None) => return Err(ConfigurationError::MissingCacheManager.into()),
            (false, _) => Arc::new(DummyCacheManager),
        };

        Ok(Self {
            schema,
            base,
            columns,
            filters: options.filters,
            kwfilters: options.kwfilters,
            order_by: options.order_by,
            extras: options.extras,
            attributes: options.attributes,
            dependent_models: options.dependent_models,
            cache,
            use_cache: options.use_cache,
            record_filter: options.record_filter,
            custom_filters: options.custom_filters,
            result: OnceCell::new(),
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn collection(&self) -> &CollectionId {
        &self.schema.id
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.base.backend()
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Arc<Column>> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn extras(&self) -> &BTreeMap<String, Value> {
        &self.extras
    }

    pub fn attribute(&self, name: &str) -> Option<&DatasourceAttr> {
        self.attributes.get(name)
    }

    pub fn kwfilters(&self) -> &BTreeMap<String, Value> {
        &self.kwfilters
    }

    pub fn filters(&self) -> &[Condition] {
        &self.filters
    }

    pub fn order_by(&self) -> Option<&[String]> {
        self.order_by.as_deref()
    }

    pub fn uses_cache(&self) -> bool {
        self.use_cache
    }

    pub fn dependent_models(&self) -> &[CollectionId] {
        &self.dependent_models
    }

    /// Add constraints. Has no effect on rows already materialized.
    pub fn add_filters(
        &mut self,
        filters: impl IntoIterator<Item = Condition>,
        kwfilters: impl IntoIterator<Item = (String, Value)>,
    ) {
        self.filters.extend(filters);
        self.kwfilters.extend(kwfilters);
    }

    /// Replace the ordering. Has no effect on rows already materialized.
    pub fn set_order_by(&mut self, order_by: Option<Vec<String>>) {
        self.order_by = order_by;
    }

    pub fn add_custom_filter(&mut self, hook: RowHook) {
        self.custom_filters.push(hook);
    }

    /// Effective selection: base queryset plus filters and ordering.
    pub fn queryset(&self) -> QuerySet {
        let mut qs = self.base.clone();
        for condition in &self.filters {
            qs = qs.filter(condition.clone());
        }
        for (key, value) in &self.kwfilters {
            qs = qs.filter_kw(key.clone(), value.clone());
        }
        if let Some(order_by) = &self.order_by {
            qs = qs.order_by(order_by.as_slice());
        }
        qs
    }

    pub fn query(&self) -> Query {
        self.queryset().query().clone()
    }

    /// Collections that invalidate this datasource: the ones the query
    /// touches plus the declared dependents. Excludes the target itself.
    pub fn dependencies(&self) -> Vec<CollectionId> {
        let mut out: BTreeSet<CollectionId> =
            self.queryset().touched_collections().into_iter().collect();
        out.extend(self.dependent_models.iter().cloned());
        out.remove(&self.schema.id);
        out.into_iter().collect()
    }

    /// Canonical text of columns, keyword filters, positional filters and ordering.
    pub fn fingerprint(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.fingerprint()).collect();
        let kwfilters: Vec<String> = self
            .kwfilters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.repr()))
            .collect();
        let filters: Vec<String> = self.filters.iter().map(|c| c.to_string()).collect();
        let order_by = self.order_by.as_deref().unwrap_or_default().join(",");
        format!(
            "[{}]-{{{}}}-[{}]-[{}]",
            columns.join(","),
            kwfilters.join(","),
            filters.join(","),
            order_by
        )
    }

    pub fn cache_key(&self) -> Result<String> {
        let dependents = self.dependencies();
        let fingerprint = self.fingerprint();
        Ok(self.cache.key(&KeyInput {
            target: &self.schema.id,
            dependents: &dependents,
            fingerprint: &fingerprint,
        })?)
    }

    /// Materialized rows, built at most once per instance.
    pub fn get_data(&self) -> Result<&[DatasourceRow]> {
        self.result
            .get_or_try_init(|| self.load())
            .map(Vec::as_slice)
    }

    pub fn is_materialized(&self) -> bool {
        self.result.get().is_some()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.get_data()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.get_data()?.is_empty())
    }

    pub fn get(&self, index: usize) -> Result<Option<&DatasourceRow>> {
        Ok(self.get_data()?.get(index))
    }

    /// Rows in `range`, clamped to the available rows.
    pub fn slice(&self, range: Range<usize>) -> Result<&[DatasourceRow]> {
        let rows = self.get_data()?;
        let end = range.end.min(rows.len());
        let start = range.start.min(end);
        Ok(&rows[start..end])
    }

    /// Independent copy with its own filter state and an empty result memo.
    pub fn clone_with(&self, extras: Option<BTreeMap<String, Value>>) -> Datasource {
        Datasource {
            schema: self.schema.clone(),
            base: self.base.clone(),
            columns: self.columns.clone(),
            filters: self.filters.clone(),
            kwfilters: self.kwfilters.clone(),
            order_by: self.order_by.clone(),
            extras: extras.unwrap_or_else(|| self.extras.clone()),
            attributes: self.attributes.clone(),
            dependent_models: self.dependent_models.clone(),
            cache: self.cache.clone(),
            use_cache: self.use_cache,
            record_filter: self.record_filter.clone(),
            custom_filters: self.custom_filters.clone(),
            result: OnceCell::new(),
        }
    }

    fn load(&self) -> Result<Vec<DatasourceRow>> {
        let key = self.cache_key()?;
        if self.cache.is_enabled() {
            if let Some(payload) = self.cache.retrieve(&key)? {
                match serde_json::from_slice::<Vec<CachedRow>>(&payload) {
                    Ok(entries) => {
                        tracing::debug!(collection = %self.schema.id, key = %key, rows = entries.len(), "cache hit");
                        return Ok(entries.into_iter().map(|entry| self.restore_row(entry)).collect());
                    }
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "discarding undecodable cache entry");
                    }
                }
            } else {
                tracing::debug!(collection = %self.schema.id, key = %key, "cache miss");
            }
        }

        let rows = self.create_result_cache()?;
        if self.cache.is_enabled() {
            let entries: Vec<CachedRowRef<'_>> = rows
                .iter()
                .map(|row| CachedRowRef {
                    row,
                    original: row.original().and_then(|record| record.snapshot()),
                })
                .collect();
            self.cache.store(&key, serde_json::to_vec(&entries)?)?;
        }
        Ok(rows)
    }

    fn restore_row(&self, entry: CachedRow) -> DatasourceRow {
        let mut row = entry.row;
        row.bind_columns(&self.columns);
        if let Some(snapshot) = entry.original {
            let record: Arc<dyn Record> = Arc::new(Entity::restore(self.schema.clone(), snapshot));
            row.set_original(Some(record));
        }
        row
    }

    fn create_result_cache(&self) -> Result<Vec<DatasourceRow>> {
        let records = self.queryset().fetch()?;
        let mut rows = Vec::with_capacity(records.len());
        for entity in records {
            let record: Arc<dyn Record> = entity;
            if let Some(hook) = &self.record_filter
                && !self.accepts(hook(record.as_ref(), self), record.as_ref())
            {
                continue;
            }
            let row = self.build_row(record.clone());
            if self
                .custom_filters
                .iter()
                .all(|hook| self.accepts(hook(&row), record.as_ref()))
            {
                rows.push(row);
            }
        }
        tracing::debug!(collection = %self.schema.id, rows = rows.len(), "materialized rows");
        Ok(rows)
    }

    fn accepts(&self, verdict: Result<()>, record: &dyn Record) -> bool {
        match verdict {
            Ok(()) => true,
            Err(Error::RecordFiltered) => false,
            Err(err) => {
                tracing::warn!(
                    collection = %self.schema.id,
                    pk = %record.pk(),
                    error = %err,
                    "dropping record"
                );
                false
            }
        }
    }

    fn build_row(&self, record: Arc<dyn Record>) -> DatasourceRow {
        let mut row = DatasourceRow::new(Some(record.clone()));
        for column in &self.columns {
            row.push(column.name(), column.cell(record.as_ref(), self));
        }
        row
    }
}
