//! Demo collections and seed data.

use anyhow::Result;
use chrono::NaiveDate;
use reportkit_store::{Backend, MemoryBackend};
use reportkit_types::{Attr, Entity, FieldDef, FieldKind, Record, Schema, Value, computed};
use std::sync::Arc;

/// The demo collections used across the test suites.
#[derive(Debug, Clone)]
pub struct DemoSchemas {
    pub simple: Arc<Schema>,
    pub content_type: Arc<Schema>,
    pub permission: Arc<Schema>,
    pub user: Arc<Schema>,
    pub group: Arc<Schema>,
    pub optional: Arc<Schema>,
}

impl Default for DemoSchemas {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoSchemas {
    pub fn new() -> Self {
        let simple = Arc::new(
            Schema::new("app.SimpleDemoModel", "app_simpledemomodel")
                .field(FieldDef::new("char", FieldKind::Char).with_label("Character"))
                .field(FieldDef::new("integer1", FieldKind::Integer).with_label("Integer #1"))
                .field(FieldDef::new("integer2", FieldKind::Integer).with_label("Integer #2"))
                .field(FieldDef::new("boolean", FieldKind::Boolean).with_label("Boolean")),
        );
        let content_type = Arc::new(
            Schema::new("contenttypes.ContentType", "django_content_type")
                .field(FieldDef::new("app_label", FieldKind::Char))
                .field(FieldDef::new("model", FieldKind::Char))
                .display("{app_label} | {model}"),
        );
        let permission = Arc::new(
            Schema::new("auth.Permission", "auth_permission")
                .field(FieldDef::new("name", FieldKind::Char))
                .field(FieldDef::new(
                    "content_type",
                    FieldKind::ForeignKey(content_type.clone()),
                ))
                .field(FieldDef::new("codename", FieldKind::Char))
                .display("{content_type} | {name}"),
        );
        let user = Arc::new(
            Schema::new("auth.User", "auth_user")
                .field(FieldDef::new("username", FieldKind::Char))
                .field(FieldDef::new("first_name", FieldKind::Char))
                .field(FieldDef::new("last_name", FieldKind::Char))
                .field(FieldDef::new("is_staff", FieldKind::Boolean).with_label("staff status"))
                .field(FieldDef::new("date_joined", FieldKind::Date))
                .display("{username}")
                .method("get_full_name", computed(full_name)),
        );
        let group = Arc::new(
            Schema::new("app.DemoModelGroup", "app_demomodelgroup")
                .field(FieldDef::new("name", FieldKind::Char))
                .field(FieldDef::new("user", FieldKind::ForeignKey(user.clone())))
                .display("{name}"),
        );
        let optional = Arc::new(
            Schema::new("app.DemoOptionalModel", "app_demooptionalmodel")
                .field(FieldDef::new("name", FieldKind::Char))
                .field(FieldDef::new("user", FieldKind::ForeignKey(user.clone()))),
        );
        Self {
            simple,
            content_type,
            permission,
            user,
            group,
            optional,
        }
    }

    pub fn all(&self) -> Vec<Arc<Schema>> {
        vec![
            self.simple.clone(),
            self.content_type.clone(),
            self.permission.clone(),
            self.user.clone(),
            self.group.clone(),
            self.optional.clone(),
        ]
    }

    pub fn register(&self, backend: &dyn Backend) -> Result<()> {
        for schema in self.all() {
            backend.register(schema)?;
        }
        Ok(())
    }
}

fn full_name(record: &dyn Record) -> std::result::Result<Value, String> {
    let part = |name: &str| match record.attr(name) {
        Some(Attr::Value(value)) => Ok(value.to_string()),
        _ => Err(format!("missing {}", name)),
    };
    Ok(Value::Text(
        format!("{} {}", part("first_name")?, part("last_name")?)
            .trim()
            .to_string(),
    ))
}

/// A memory backend with every demo collection registered.
pub fn demo_backend() -> Result<(Arc<MemoryBackend>, DemoSchemas)> {
    let backend = Arc::new(MemoryBackend::new());
    let schemas = DemoSchemas::new();
    schemas.register(backend.as_ref())?;
    Ok((backend, schemas))
}

pub fn insert_simple(
    backend: &dyn Backend,
    schemas: &DemoSchemas,
    char: &str,
    integer1: i64,
    integer2: i64,
) -> Result<i64> {
    Ok(backend.insert(
        Entity::new(schemas.simple.clone())
            .with("char", char)
            .with("integer1", integer1)
            .with("integer2", integer2)
            .with("boolean", false),
    )?)
}

/// Usernames in insertion order; staff status alternates starting with `false`.
pub const DEMO_USERNAMES: [&str; 6] = ["fred", "alice", "eve", "bob", "dan", "carl"];

pub fn seed_users(backend: &dyn Backend, schemas: &DemoSchemas) -> Result<Vec<i64>> {
    let joined = NaiveDate::from_ymd_opt(2013, 1, 1).unwrap_or_default();
    DEMO_USERNAMES
        .iter()
        .enumerate()
        .map(|(idx, username)| {
            Ok(backend.insert(
                Entity::new(schemas.user.clone())
                    .with("username", *username)
                    .with("first_name", capitalized(username))
                    .with("last_name", "Demo")
                    .with("is_staff", idx % 2 == 1)
                    .with("date_joined", joined + chrono::Days::new(idx as u64)),
            )?)
        })
        .collect()
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Two content types and three permissions on each.
pub fn seed_permissions(backend: &dyn Backend, schemas: &DemoSchemas) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    for (app_label, model) in [("auth", "user"), ("auth", "group")] {
        let content_type = backend.insert(
            Entity::new(schemas.content_type.clone())
                .with("app_label", app_label)
                .with("model", model),
        )?;
        for action in ["add", "change", "delete"] {
            ids.push(
                backend.insert(
                    Entity::new(schemas.permission.clone())
                        .with("name", format!("Can {} {}", action, model))
                        .with("codename", format!("{}_{}", action, model))
                        .with("content_type", content_type),
                )?,
            );
        }
    }
    Ok(ids)
}

/// One group per user in `user_ids`, named `group-<n>`.
pub fn seed_groups(
    backend: &dyn Backend,
    schemas: &DemoSchemas,
    user_ids: &[i64],
) -> Result<Vec<i64>> {
    user_ids
        .iter()
        .enumerate()
        .map(|(idx, user_id)| {
            Ok(backend.insert(
                Entity::new(schemas.group.clone())
                    .with("name", format!("group-{}", idx))
                    .with("user", *user_id),
            )?)
        })
        .collect()
}
