//! Declarative collection and report definitions, as read from `reportkit.toml`.

use crate::{Error, Result};
use reportkit_cache::CacheManager;
use reportkit_engine::{
    Column, ColumnSpec, ColumnType, DatasourceOptions, GroupBy, Renderer, Report, ReportOptions,
    Widget,
};
use reportkit_store::Backend;
use reportkit_types::{CollectionId, FieldDef, FieldKind, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Target collection id of a `foreign_key` field.
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    pub id: String,
    /// Defaults to the id, lowercased, with `.` replaced by `_`.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl CollectionConfig {
    pub fn table_name(&self) -> String {
        match &self.table {
            Some(table) => table.clone(),
            None => self.id.to_lowercase().replace('.', "_"),
        }
    }

    fn targets(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|field| field.to.as_deref())
    }

    fn to_schema(&self, built: &BTreeMap<String, Arc<Schema>>) -> Result<Schema> {
        let mut schema = Schema::new(self.id.as_str(), self.table_name());
        for field in &self.fields {
            let related = match &field.to {
                Some(target) => Some(built.get(target).cloned().ok_or_else(|| {
                    Error::UnknownCollection(target.clone())
                })?),
                None => None,
            };
            let kind = parse_field_kind(&field.kind, related).ok_or_else(|| {
                Error::Config(format!(
                    "collection '{}': field '{}' has invalid kind '{}'",
                    self.id, field.name, field.kind
                ))
            })?;
            let mut def = FieldDef::new(field.name.as_str(), kind);
            if let Some(label) = &field.label {
                def = def.with_label(label.as_str());
            }
            schema = schema.field(def);
        }
        if let Some(display) = &self.display {
            schema = schema.display(display.as_str());
        }
        Ok(schema)
    }
}

fn parse_field_kind(kind: &str, related: Option<Arc<Schema>>) -> Option<FieldKind> {
    let kind = match kind.to_ascii_lowercase().as_str() {
        "auto" => FieldKind::Auto,
        "integer" => FieldKind::Integer,
        "big_integer" => FieldKind::BigInteger,
        "float" => FieldKind::Float,
        "decimal" => FieldKind::Decimal,
        "char" => FieldKind::Char,
        "text" => FieldKind::Text,
        "boolean" => FieldKind::Boolean,
        "date" => FieldKind::Date,
        "datetime" => FieldKind::DateTime,
        "time" => FieldKind::Time,
        "foreign_key" => return related.map(FieldKind::ForeignKey),
        _ => return None,
    };
    // A `to` on a plain field is a mistake.
    if related.is_some() { None } else { Some(kind) }
}

/// Schemas built from `[[collections]]`, with relations resolved.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    schemas: BTreeMap<String, Arc<Schema>>,
    order: Vec<String>,
}

impl Catalog {
    /// Build every collection; a relation may point at any collection
    /// declared in the same file, but not at itself through a cycle.
    pub fn from_config(collections: &[CollectionConfig]) -> Result<Self> {
        let mut catalog = Catalog::default();
        let mut pending: Vec<&CollectionConfig> = collections.iter().collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut remaining = Vec::new();
            for config in pending {
                if catalog.schemas.contains_key(&config.id) {
                    return Err(Error::Config(format!(
                        "collection '{}' is declared twice",
                        config.id
                    )));
                }
                let ready = config.targets().all(|target| {
                    catalog.schemas.contains_key(target)
                        || !collections.iter().any(|c| c.id == target)
                });
                if ready {
                    let schema = Arc::new(config.to_schema(&catalog.schemas)?);
                    catalog.order.push(config.id.clone());
                    catalog.schemas.insert(config.id.clone(), schema);
                } else {
                    remaining.push(config);
                }
            }
            if remaining.len() == before {
                let ids: Vec<&str> = remaining.iter().map(|c| c.id.as_str()).collect();
                return Err(Error::Config(format!(
                    "circular relations between collections: {}",
                    ids.join(", ")
                )));
            }
            pending = remaining;
        }
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Result<&Arc<Schema>> {
        self.schemas
            .get(id)
            .ok_or_else(|| Error::UnknownCollection(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.schemas.contains_key(id)
    }

    /// `id` followed by every collection reachable from it through relations.
    pub fn reachable(&self, id: &str) -> Result<Vec<CollectionId>> {
        let mut seen: Vec<CollectionId> = Vec::new();
        let mut pending = vec![self.get(id)?.clone()];
        while let Some(schema) = pending.pop() {
            if seen.contains(&schema.id) {
                continue;
            }
            seen.push(schema.id.clone());
            pending.extend(schema.fields.iter().filter_map(|f| f.kind.related().cloned()));
        }
        Ok(seen)
    }

    /// Schemas in declaration-resolution order (targets before relations).
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.order.iter().filter_map(|id| self.schemas.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// One entry of a report's `columns` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ColumnConfig {
    /// Attribute path, type inferred from the schema.
    Name(String),
    Calc(CalcColumn),
    Template(TemplateColumn),
    Attr(AttrColumn),
}

/// Sum of several attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CalcColumn {
    pub attrs: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateColumn {
    pub template: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct AttrColumn {
    pub attr: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sys_only: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub widget: Option<Widget>,
}

impl ColumnConfig {
    pub fn to_spec(&self, schema: &Arc<Schema>) -> Result<ColumnSpec> {
        let column = match self {
            ColumnConfig::Name(path) => return Ok(ColumnSpec::Name(path.clone())),
            ColumnConfig::Calc(calc) => {
                let mut column = Column::calc(calc.attrs.iter().map(String::as_str));
                if let Some(name) = &calc.name {
                    column = column.with_name(name.as_str());
                }
                if let Some(title) = &calc.title {
                    column = column.with_title(title.as_str());
                }
                column
            }
            ColumnConfig::Template(tpl) => {
                let mut column = Column::template(tpl.name.as_str(), tpl.template.as_str());
                if let Some(title) = &tpl.title {
                    column = column.with_title(title.as_str());
                }
                column
            }
            ColumnConfig::Attr(attr) => attr.to_column(schema)?,
        };
        Ok(ColumnSpec::Column(column))
    }
}

impl AttrColumn {
    fn to_column(&self, schema: &Arc<Schema>) -> Result<Column> {
        let ty = match &self.kind {
            Some(kind) => ColumnType::parse(kind).ok_or_else(|| {
                Error::Config(format!("column '{}': invalid kind '{}'", self.attr, kind))
            })?,
            None => schema
                .field_from_path(&self.attr)
                .map(|field| ColumnType::for_field(&field.kind))
                .unwrap_or_default(),
        };
        let mut column = if self.optional {
            Column::optional(self.attr.as_str())
        } else {
            Column::new(self.attr.as_str())
        }
        .with_type(ty);
        if let Some(title) = &self.title {
            column = column.with_title(title.as_str());
        }
        if let Some(format) = &self.format {
            column = column.with_format(format.as_str());
        }
        if let Some(name) = &self.name {
            column = column.with_name(name.as_str());
        }
        if let Some(widget) = self.widget {
            column = column.with_widget(widget);
        }
        if self.sys_only {
            column = column.sys_only();
        }
        Ok(column)
    }
}

fn default_true() -> bool {
    true
}

/// A `[[reports]]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReportDefinition {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub collection: String,
    /// `None` means one column per schema field.
    #[serde(default)]
    pub columns: Option<Vec<ColumnConfig>>,
    #[serde(default)]
    pub list_display: Option<Vec<String>>,
    #[serde(default)]
    pub list_filter: Vec<String>,
    #[serde(default)]
    pub order_by: Option<Vec<String>>,
    /// `"group,order"`.
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub column_totals: Vec<String>,
    #[serde(default)]
    pub dependent_models: Vec<String>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Format labels to offer; `None` offers every standard format.
    #[serde(default)]
    pub formats: Option<Vec<String>>,
}

impl ReportDefinition {
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            collection: collection.into(),
            columns: None,
            list_display: None,
            list_filter: Vec::new(),
            order_by: None,
            group_by: None,
            column_totals: Vec::new(),
            dependent_models: Vec::new(),
            use_cache: true,
            formats: None,
        }
    }

    /// Collections whose mutation invalidates this report's cached rows.
    pub fn dependencies(&self, catalog: &Catalog) -> Result<Vec<CollectionId>> {
        self.dependent_models
            .iter()
            .map(|id| Ok(catalog.get(id)?.id.clone()))
            .collect()
    }

    /// Every collection a cached result of this report can be keyed on: the
    /// target, whatever its relations reach, and the declared dependents.
    pub fn monitored_collections(&self, catalog: &Catalog) -> Result<Vec<CollectionId>> {
        let mut out = catalog.reachable(&self.collection)?;
        for id in self.dependencies(catalog)? {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        Ok(out)
    }

    pub fn parse_group_by(&self) -> Result<Option<GroupBy>> {
        let Some(spec) = &self.group_by else {
            return Ok(None);
        };
        match spec.split_once(',') {
            Some((group, order)) if !group.trim().is_empty() => {
                Ok(Some(GroupBy::column(group.trim(), order.trim())))
            }
            _ => Err(Error::Config(format!(
                "report '{}': group_by must look like \"group,order\", got '{}'",
                self.name, spec
            ))),
        }
    }

    fn formats(&self) -> Result<Vec<(String, Arc<dyn Renderer>)>> {
        let standard = reportkit_render::standard_formats();
        let Some(wanted) = &self.formats else {
            return Ok(standard);
        };
        wanted
            .iter()
            .map(|label| {
                standard
                    .iter()
                    .find(|(known, _)| known == label)
                    .cloned()
                    .ok_or_else(|| {
                        Error::Config(format!("report '{}': unknown format '{}'", self.name, label))
                    })
            })
            .collect()
    }

    pub fn build(
        &self,
        catalog: &Catalog,
        backend: Arc<dyn Backend>,
        cache_manager: Arc<dyn CacheManager>,
    ) -> Result<Report> {
        let schema = catalog.get(&self.collection)?;
        let mut options = DatasourceOptions::for_schema(backend, schema.clone());
        if let Some(columns) = &self.columns {
            options.columns = Some(
                columns
                    .iter()
                    .map(|column| column.to_spec(schema))
                    .collect::<Result<Vec<_>>>()?,
            );
        }
        options.dependent_models = self.dependencies(catalog)?;
        if self.use_cache {
            options = options.cached(cache_manager);
        }

        Ok(Report::as_report(ReportOptions {
            title: self.title.clone(),
            description: self.description.clone(),
            datasource_options: Some(options),
            list_display: self.list_display.clone(),
            list_filter: self.list_filter.clone(),
            order_by: self.order_by.clone(),
            group_by: self.parse_group_by()?,
            column_totals: self.column_totals.clone(),
            formats: self.formats()?,
            ..ReportOptions::default()
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, kind: &str, to: Option<&str>) -> FieldConfig {
        FieldConfig {
            name: name.to_string(),
            kind: kind.to_string(),
            label: None,
            to: to.map(str::to_string),
        }
    }

    fn collection(id: &str, fields: Vec<FieldConfig>) -> CollectionConfig {
        CollectionConfig {
            id: id.to_string(),
            table: None,
            display: None,
            fields,
        }
    }

    #[test]
    fn test_relations_resolve_regardless_of_order() -> Result<()> {
        let catalog = Catalog::from_config(&[
            collection(
                "auth.Permission",
                vec![
                    field("name", "char", None),
                    field("content_type", "foreign_key", Some("contenttypes.ContentType")),
                ],
            ),
            collection("contenttypes.ContentType", vec![field("model", "char", None)]),
        ])?;

        assert_eq!(catalog.len(), 2);
        let permission = catalog.get("auth.Permission")?;
        assert_eq!(permission.table, "auth_permission");
        assert!(permission.field_from_path("content_type.model").is_some());
        let order: Vec<&str> = catalog.schemas().map(|s| s.id.as_str()).collect();
        assert_eq!(order, ["contenttypes.ContentType", "auth.Permission"]);
        Ok(())
    }

    #[test]
    fn test_monitored_collections_follow_relations() -> Result<()> {
        let catalog = Catalog::from_config(&[
            collection("contenttypes.ContentType", vec![field("model", "char", None)]),
            collection(
                "auth.Permission",
                vec![field("content_type", "foreign_key", Some("contenttypes.ContentType"))],
            ),
            collection("auth.Group", vec![field("name", "char", None)]),
            collection("audit.Log", vec![]),
        ])?;

        let mut def = ReportDefinition::new("perms", "auth.Permission");
        let ids: Vec<String> = def
            .monitored_collections(&catalog)?
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, ["auth.Permission", "contenttypes.ContentType"]);
        assert!(def.dependencies(&catalog)?.is_empty());

        def.dependent_models = vec!["audit.Log".to_string()];
        assert_eq!(def.monitored_collections(&catalog)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_catalog_errors() {
        let unknown_target = Catalog::from_config(&[collection(
            "a.A",
            vec![field("b", "foreign_key", Some("b.B"))],
        )]);
        assert!(matches!(unknown_target, Err(Error::UnknownCollection(id)) if id == "b.B"));

        let cycle = Catalog::from_config(&[
            collection("a.A", vec![field("b", "foreign_key", Some("b.B"))]),
            collection("b.B", vec![field("a", "foreign_key", Some("a.A"))]),
        ]);
        assert!(matches!(cycle, Err(Error::Config(msg)) if msg.contains("circular")));

        let bad_kind = Catalog::from_config(&[collection("a.A", vec![field("x", "blob", None)])]);
        assert!(matches!(bad_kind, Err(Error::Config(_))));

        let duplicate = Catalog::from_config(&[collection("a.A", vec![]), collection("a.A", vec![])]);
        assert!(matches!(duplicate, Err(Error::Config(msg)) if msg.contains("twice")));
    }

    #[test]
    fn test_attr_column_infers_type_and_applies_options() -> Result<()> {
        let catalog = Catalog::from_config(&[collection(
            "app.Item",
            vec![field("price", "decimal", None), field("name", "char", None)],
        )])?;
        let schema = catalog.get("app.Item")?;

        let spec = ColumnConfig::Attr(AttrColumn {
            attr: "price".to_string(),
            title: Some("Price".to_string()),
            widget: Some(Widget::Currency),
            ..AttrColumn::default()
        })
        .to_spec(schema)?;
        let column = spec.into_column(schema);
        assert_eq!(column.column_type(), ColumnType::Decimal);
        assert_eq!(column.title(), "Price");
        assert_eq!(column.widget(), Widget::Currency);

        let bad = ColumnConfig::Attr(AttrColumn {
            attr: "price".to_string(),
            kind: Some("money".to_string()),
            ..AttrColumn::default()
        })
        .to_spec(schema);
        assert!(matches!(bad, Err(Error::Config(_))));
        Ok(())
    }

    #[test]
    fn test_group_by_parsing() -> Result<()> {
        let mut def = ReportDefinition::new("r", "app.Item");
        assert!(def.parse_group_by()?.is_none());

        def.group_by = Some("is_staff, username".to_string());
        let group_by = def.parse_group_by()?.expect("group by");
        assert_eq!(group_by.order, "username");

        def.group_by = Some("username".to_string());
        assert!(def.parse_group_by().is_err());
        def.group_by = Some(",username".to_string());
        assert!(def.parse_group_by().is_err());
        Ok(())
    }
}
