mod codec;
mod compile;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::signals::{ChangeEvent, ChangeKind, Signals};
use codec::{from_sql, quote, to_sql};
use parking_lot::{Mutex, RwLock};
use reportkit_types::{CollectionId, Entity, FieldKind, Schema, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const MAX_RELATION_DEPTH: usize = 4;

/// Collections stored as SQLite tables, one table per schema.
///
/// Relations are stored as `<name>_id` columns and loaded eagerly after the
/// main select, batched per relation.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    schemas: RwLock<BTreeMap<CollectionId, Arc<Schema>>>,
    queries: AtomicUsize,
    signals: Signals,
}

impl SqliteBackend {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            schemas: RwLock::new(BTreeMap::new()),
            queries: AtomicUsize::new(0),
            signals: Signals::new(),
        }
    }

    fn create_table(conn: &Connection, schema: &Schema) -> Result<()> {
        let columns: Vec<String> = schema
            .fields
            .iter()
            .map(|f| format!("{} {}", quote(&f.column_name()), f.kind.sql_type()))
            .collect();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote(&schema.table),
            columns.join(", ")
        ))?;
        Ok(())
    }

    fn select(
        conn: &Connection,
        schema: &Arc<Schema>,
        where_sql: &str,
        params: &[SqlValue],
        order_sql: &str,
        depth: usize,
    ) -> Result<Vec<Entity>> {
        let columns: Vec<String> = schema
            .fields
            .iter()
            .map(|f| quote(&f.column_name()))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            columns.join(", "),
            quote(&schema.table),
            where_sql,
            order_sql
        );
        tracing::trace!(sql = %sql, "sqlite select");

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut entity = Entity::new(schema.clone());
            for (idx, field) in schema.fields.iter().enumerate() {
                let raw: SqlValue = row.get(idx)?;
                entity.set(&field.name, from_sql(&field.kind, raw));
            }
            out.push(entity);
        }

        Self::attach_relations(conn, schema, &mut out, depth)?;
        Ok(out)
    }

    fn attach_relations(
        conn: &Connection,
        schema: &Arc<Schema>,
        rows: &mut [Entity],
        depth: usize,
    ) -> Result<()> {
        if depth >= MAX_RELATION_DEPTH {
            return Ok(());
        }
        for field in &schema.fields {
            let FieldKind::ForeignKey(related) = &field.kind else {
                continue;
            };
            let ids: BTreeSet<i64> = rows
                .iter()
                .filter_map(|r| match r.get(&field.name) {
                    Value::Int(id) => Some(*id),
                    _ => None,
                })
                .collect();
            if ids.is_empty() {
                continue;
            }
            let marks = vec!["?"; ids.len()].join(", ");
            let params: Vec<SqlValue> = ids.iter().map(|id| SqlValue::Integer(*id)).collect();
            let loaded: BTreeMap<i64, Arc<Entity>> = Self::select(
                conn,
                related,
                &format!("\"id\" IN ({})", marks),
                &params,
                "\"id\" ASC",
                depth + 1,
            )?
            .into_iter()
            .filter_map(|e| e.id().map(|id| (id, Arc::new(e))))
            .collect();

            for row in rows.iter_mut() {
                if let Value::Int(id) = row.get(&field.name).clone() {
                    row.set_related(&field.name, loaded.get(&id).cloned());
                }
            }
        }
        Ok(())
    }

    fn table_of(&self, collection: &CollectionId) -> Result<Arc<Schema>> {
        self.schema(collection)
            .ok_or_else(|| Error::UnknownCollection(collection.to_string()))
    }

    fn emit(&self, collection: &CollectionId, kind: ChangeKind, pk: Option<i64>) {
        self.signals.emit(&ChangeEvent {
            collection: collection.clone(),
            kind,
            pk,
        });
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn register(&self, schema: Arc<Schema>) -> Result<()> {
        if self.schemas.read().contains_key(&schema.id) {
            return Ok(());
        }
        for field in &schema.fields {
            if let FieldKind::ForeignKey(related) = &field.kind
                && related.id != schema.id
            {
                self.register(related.clone())?;
            }
        }
        Self::create_table(&self.conn.lock(), &schema)?;
        tracing::debug!(collection = %schema.id, table = %schema.table, "registered collection");
        self.schemas.write().insert(schema.id.clone(), schema);
        Ok(())
    }

    fn schema(&self, collection: &CollectionId) -> Option<Arc<Schema>> {
        self.schemas.read().get(collection).cloned()
    }

    fn execute(&self, query: &Query) -> Result<Vec<Arc<Entity>>> {
        query.validate()?;
        let schema = self.table_of(query.collection())?;
        let mut params = Vec::new();
        let where_sql = compile::where_clause(query, &mut params)?;
        let order_sql = compile::order_clause(query)?;

        self.queries.fetch_add(1, Ordering::SeqCst);
        let conn = self.conn.lock();
        let rows = Self::select(&conn, &schema, &where_sql, &params, &order_sql, 0)?;
        Ok(rows.into_iter().map(Arc::new).collect())
    }

    fn insert(&self, entity: Entity) -> Result<i64> {
        let schema = self.table_of(&entity.schema().id)?;
        let fields: Vec<_> = schema
            .fields
            .iter()
            .filter(|f| f.name != "id" || entity.id().is_some())
            .collect();
        let columns: Vec<String> = fields.iter().map(|f| quote(&f.column_name())).collect();
        let values: Vec<SqlValue> = fields.iter().map(|f| to_sql(entity.get(&f.name))).collect();
        let id = {
            let conn = self.conn.lock();
            conn.execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote(&schema.table),
                    columns.join(", "),
                    vec!["?"; columns.len()].join(", ")
                ),
                params_from_iter(values.iter()),
            )?;
            conn.last_insert_rowid()
        };
        self.emit(&schema.id, ChangeKind::Created, Some(id));
        Ok(id)
    }

    fn update(&self, entity: &Entity) -> Result<()> {
        let schema = self.table_of(&entity.schema().id)?;
        let id = entity
            .id()
            .ok_or_else(|| Error::Query("cannot update a record without id".to_string()))?;
        let fields: Vec<_> = schema.fields.iter().filter(|f| f.name != "id").collect();
        let assignments: Vec<String> = fields
            .iter()
            .map(|f| format!("{} = ?", quote(&f.column_name())))
            .collect();
        let mut values: Vec<SqlValue> = fields.iter().map(|f| to_sql(entity.get(&f.name))).collect();
        values.push(SqlValue::Integer(id));

        let changed = self.conn.lock().execute(
            &format!(
                "UPDATE {} SET {} WHERE \"id\" = ?",
                quote(&schema.table),
                assignments.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;
        if changed == 0 {
            return Err(Error::Query(format!("{} {} does not exist", schema.id, id)));
        }
        self.emit(&schema.id, ChangeKind::Updated, Some(id));
        Ok(())
    }

    fn delete(&self, collection: &CollectionId, id: i64) -> Result<bool> {
        let schema = self.table_of(collection)?;
        let changed = self.conn.lock().execute(
            &format!("DELETE FROM {} WHERE \"id\" = ?1", quote(&schema.table)),
            [id],
        )?;
        if changed > 0 {
            self.emit(collection, ChangeKind::Deleted, Some(id));
        }
        Ok(changed > 0)
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
