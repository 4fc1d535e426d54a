use crate::error::{Error, Result};
use crate::record::Computed;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Fully qualified collection identity, e.g. `auth.User`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The short name after the last `.`: `auth.User` -> `User`.
    pub fn name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Auto,
    Integer,
    BigInteger,
    Float,
    Decimal,
    Char,
    Text,
    Boolean,
    Date,
    DateTime,
    Time,
    ForeignKey(Arc<Schema>),
}

impl FieldKind {
    pub fn is_relation(&self) -> bool {
        matches!(self, FieldKind::ForeignKey(_))
    }

    pub fn related(&self) -> Option<&Arc<Schema>> {
        match self {
            FieldKind::ForeignKey(schema) => Some(schema),
            _ => None,
        }
    }

    /// SQLite column affinity for this kind.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Auto => "INTEGER PRIMARY KEY AUTOINCREMENT",
            FieldKind::Integer | FieldKind::BigInteger | FieldKind::Boolean => "INTEGER",
            FieldKind::ForeignKey(_) => "INTEGER",
            FieldKind::Float | FieldKind::Decimal => "REAL",
            FieldKind::Char
            | FieldKind::Text
            | FieldKind::Date
            | FieldKind::DateTime
            | FieldKind::Time => "TEXT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub label: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Explicit label, else the field name with underscores as spaces.
    pub fn verbose_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.name.replace('_', " "),
        }
    }

    /// Storage column name; relations store the related id under `<name>_id`.
    pub fn column_name(&self) -> String {
        if self.kind.is_relation() {
            format!("{}_id", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Declared shape of a collection.
///
/// Every schema carries an implicit `id` auto field as its first field.
#[derive(Clone)]
pub struct Schema {
    pub id: CollectionId,
    pub table: String,
    pub fields: Vec<FieldDef>,
    /// Template for `Record::display`, with `{field}` placeholders.
    pub display: Option<String>,
    pub methods: Vec<(String, Computed)>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("display", &self.display)
            .field(
                "methods",
                &self.methods.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Schema {
    pub fn new(id: impl Into<CollectionId>, table: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            table: table.into(),
            fields: vec![FieldDef::new("id", FieldKind::Auto)],
            display: None,
            methods: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn display(mut self, template: impl Into<String>) -> Self {
        self.display = Some(template.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>, func: Computed) -> Self {
        self.methods.push((name.into(), func));
        self
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_method(&self, name: &str) -> Option<&Computed> {
        self.methods
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, func)| func)
    }

    /// Resolve `fk.fk.field` (or `fk__fk__field`) to the field it names.
    ///
    /// A path that stops on a relation returns the relation field itself.
    /// Returns `None` when any segment is not a declared field.
    pub fn field_from_path(&self, path: &str) -> Option<&FieldDef> {
        let segments = crate::path::split_path(path);
        let (first, rest) = segments.split_first()?;
        let field = self.get_field(first)?;
        match (&field.kind, rest.is_empty()) {
            (FieldKind::ForeignKey(related), false) => related.field_from_path(&rest.join(".")),
            _ => Some(field),
        }
    }

    /// Like `field_from_path`, but an unknown path is an error.
    pub fn require_field(&self, path: &str) -> Result<&FieldDef> {
        self.field_from_path(path)
            .ok_or_else(|| Error::UnknownField {
                collection: self.id.to_string(),
                path: path.to_string(),
            })
    }

    /// Schemas reached when walking `path` across relations, excluding `self`.
    pub fn related_along(&self, path: &str) -> Vec<Arc<Schema>> {
        let mut out = Vec::new();
        let mut current = self;
        for segment in crate::path::split_path(path) {
            let Some(field) = current.get_field(segment) else {
                break;
            };
            match &field.kind {
                FieldKind::ForeignKey(related) => {
                    out.push(related.clone());
                    current = related.as_ref();
                }
                _ => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Arc<Schema> {
        Arc::new(
            Schema::new("auth.User", "auth_user")
                .field(FieldDef::new("username", FieldKind::Char))
                .field(FieldDef::new("date_joined", FieldKind::DateTime)),
        )
    }

    #[test]
    fn test_field_names_keep_declaration_order() {
        assert_eq!(user().field_names(), vec!["id", "username", "date_joined"]);
    }

    #[test]
    fn test_field_from_path_crosses_relations() {
        let log = Schema::new("admin.LogEntry", "admin_logentry")
            .field(FieldDef::new("user", FieldKind::ForeignKey(user())));

        let field = log.field_from_path("user.username").unwrap();
        assert_eq!(field.name, "username");
        let field = log.field_from_path("user__date_joined").unwrap();
        assert_eq!(field.verbose_name(), "date joined");
        assert!(log.field_from_path("user").unwrap().kind.is_relation());
        assert!(log.field_from_path("user.missing").is_none());
        assert!(log.require_field("nope").is_err());
    }

    #[test]
    fn test_related_along() {
        let log = Schema::new("admin.LogEntry", "admin_logentry")
            .field(FieldDef::new("user", FieldKind::ForeignKey(user())));
        let related = log.related_along("user__username");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id.as_str(), "auth.User");
        assert!(log.related_along("id").is_empty());
    }

    #[test]
    fn test_collection_short_name() {
        assert_eq!(CollectionId::new("auth.User").name(), "User");
        assert_eq!(CollectionId::new("plain").name(), "plain");
    }
}
