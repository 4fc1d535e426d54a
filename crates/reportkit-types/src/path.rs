use crate::error::{Error, Result};
use crate::record::{Attr, Computed, Record};
use crate::value::Value;
use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.]*)\}").unwrap());

/// Split an attribute path. Query style (`a__b`) wins over dotted (`a.b`).
pub fn split_path(path: &str) -> Vec<&str> {
    if path.contains("__") {
        path.split("__").collect()
    } else {
        path.split('.').collect()
    }
}

/// Outcome of walking a path: either a plain value or something to invoke.
pub enum Resolved<'a> {
    Value(Value),
    Callable {
        func: Computed,
        owner: &'a dyn Record,
    },
}

impl Resolved<'_> {
    pub fn is_callable(&self) -> bool {
        matches!(self, Resolved::Callable { .. })
    }

    /// Invoke a callable with its owner, or return the plain value.
    pub fn into_value(self, path: &str) -> Result<Value> {
        match self {
            Resolved::Value(value) => Ok(value),
            Resolved::Callable { func, owner } => func(owner).map_err(|cause| Error::Call {
                path: path.to_string(),
                cause,
            }),
        }
    }
}

/// Walk `a.b.c` across relations.
///
/// Any absent segment, or a null relation in the middle of the path, is
/// `NotFound`; this never panics on missing intermediates. A path ending on a
/// relation resolves to the related record's display text (null stays null).
pub fn resolve_path<'a>(record: &'a dyn Record, path: &str) -> Result<Resolved<'a>> {
    let segments = split_path(path);
    let last = segments.len() - 1;
    let mut current = record;

    for (idx, segment) in segments.iter().enumerate() {
        let attr = current
            .attr(segment)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        if idx == last {
            return Ok(match attr {
                Attr::Value(value) => Resolved::Value(value),
                Attr::Related(Some(related)) => Resolved::Value(Value::Text(related.display())),
                Attr::Related(None) => Resolved::Value(Value::Null),
                Attr::Method(func) => Resolved::Callable {
                    func,
                    owner: current,
                },
            });
        }

        match attr {
            Attr::Related(Some(related)) => current = related,
            _ => return Err(Error::NotFound(path.to_string())),
        }
    }

    Err(Error::NotFound(path.to_string()))
}

/// `resolve_path` followed by invocation of a trailing callable.
pub fn resolve_value(record: &dyn Record, path: &str) -> Result<Value> {
    resolve_path(record, path)?.into_value(path)
}

/// Expand `{path}` placeholders against a record.
pub fn format_template(template: &str, record: &dyn Record) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&resolve_value(record, path.as_str())?.to_string());
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Entity, computed};
    use crate::schema::{FieldDef, FieldKind, Schema};
    use std::sync::Arc;

    fn log_entry(with_user: bool) -> Entity {
        let user = Arc::new(
            Schema::new("auth.User", "auth_user")
                .field(FieldDef::new("username", FieldKind::Char))
                .display("{username}")
                .method(
                    "get_full_name",
                    computed(|_| Ok(Value::from("Full Name"))),
                ),
        );
        let log = Arc::new(
            Schema::new("admin.LogEntry", "admin_logentry")
                .field(FieldDef::new("action", FieldKind::Char))
                .field(FieldDef::new("user", FieldKind::ForeignKey(user.clone()))),
        );
        let mut entry = Entity::new(log).with("id", 1).with("action", "add");
        let related = with_user
            .then(|| Arc::new(Entity::new(user).with("id", 9).with("username", "sax")));
        entry.set_related("user", related);
        entry
    }

    #[test]
    fn test_resolve_nested_value() {
        let entry = log_entry(true);
        assert_eq!(resolve_value(&entry, "user.username").unwrap(), "sax");
        assert_eq!(resolve_value(&entry, "user__username").unwrap(), "sax");
        assert_eq!(resolve_value(&entry, "user").unwrap(), "sax");
    }

    #[test]
    fn test_trailing_method_is_callable() {
        let entry = log_entry(true);
        let resolved = resolve_path(&entry, "user.get_full_name").unwrap();
        assert!(resolved.is_callable());
        assert_eq!(
            resolved.into_value("user.get_full_name").unwrap(),
            "Full Name"
        );
    }

    #[test]
    fn test_missing_segments_are_not_found() {
        let entry = log_entry(false);
        assert_eq!(
            resolve_value(&entry, "user.username"),
            Err(Error::NotFound("user.username".to_string()))
        );
        assert!(resolve_value(&entry, "action.length").is_err());
        assert!(resolve_value(&entry, "nothing").is_err());
        assert!(resolve_value(&entry, "").is_err());
        assert_eq!(resolve_value(&entry, "user").unwrap(), Value::Null);
    }

    #[test]
    fn test_format_template() {
        let entry = log_entry(true);
        assert_eq!(
            format_template("{action} by {user.username}", &entry).unwrap(),
            "add by sax"
        );
        assert!(format_template("{missing}", &entry).is_err());
    }
}
