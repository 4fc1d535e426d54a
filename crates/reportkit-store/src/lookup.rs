use reportkit_types::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Field lookups accepted as the `__suffix` of a keyword filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    IsNull,
    Range,
}

impl Lookup {
    pub const ALL: [Lookup; 15] = [
        Lookup::Exact,
        Lookup::IExact,
        Lookup::Contains,
        Lookup::IContains,
        Lookup::In,
        Lookup::Gt,
        Lookup::Gte,
        Lookup::Lt,
        Lookup::Lte,
        Lookup::StartsWith,
        Lookup::IStartsWith,
        Lookup::EndsWith,
        Lookup::IEndsWith,
        Lookup::IsNull,
        Lookup::Range,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::IExact => "iexact",
            Lookup::Contains => "contains",
            Lookup::IContains => "icontains",
            Lookup::In => "in",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::StartsWith => "startswith",
            Lookup::IStartsWith => "istartswith",
            Lookup::EndsWith => "endswith",
            Lookup::IEndsWith => "iendswith",
            Lookup::IsNull => "isnull",
            Lookup::Range => "range",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == s)
    }

    /// Split `path__lookup` into its field path and lookup. A key without a
    /// recognised suffix is an `exact` match on the whole key.
    pub fn split_key(key: &str) -> (&str, Lookup) {
        if let Some((path, suffix)) = key.rsplit_once("__")
            && let Some(lookup) = Lookup::parse(suffix)
        {
            return (path, lookup);
        }
        (key, Lookup::Exact)
    }

    /// Evaluate the lookup against an already resolved left-hand value.
    pub fn matches(&self, lhs: &Value, rhs: &Value) -> bool {
        let text = |v: &Value| v.to_string();
        let lower = |v: &Value| v.to_string().to_lowercase();

        match self {
            Lookup::IsNull => lhs.is_null() == rhs.is_truthy(),
            Lookup::Exact if rhs.is_null() => lhs.is_null(),
            _ if lhs.is_null() => false,
            Lookup::Exact => lhs.loose_eq(rhs),
            Lookup::IExact => lower(lhs) == lower(rhs),
            Lookup::Contains => text(lhs).contains(&text(rhs)),
            Lookup::IContains => lower(lhs).contains(&lower(rhs)),
            Lookup::StartsWith => text(lhs).starts_with(&text(rhs)),
            Lookup::IStartsWith => lower(lhs).starts_with(&lower(rhs)),
            Lookup::EndsWith => text(lhs).ends_with(&text(rhs)),
            Lookup::IEndsWith => lower(lhs).ends_with(&lower(rhs)),
            Lookup::In => match rhs {
                Value::List(items) => items.iter().any(|item| lhs.loose_eq(item)),
                other => lhs.loose_eq(other),
            },
            Lookup::Gt => lhs.compare(rhs) == Some(Ordering::Greater),
            Lookup::Gte => matches!(
                lhs.compare(rhs),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Lookup::Lt => lhs.compare(rhs) == Some(Ordering::Less),
            Lookup::Lte => matches!(lhs.compare(rhs), Some(Ordering::Less | Ordering::Equal)),
            Lookup::Range => match rhs {
                Value::List(bounds) if bounds.len() == 2 => {
                    Lookup::Gte.matches(lhs, &bounds[0]) && Lookup::Lte.matches(lhs, &bounds[1])
                }
                _ => false,
            },
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_key() {
        assert_eq!(Lookup::split_key("integer1__gt"), ("integer1", Lookup::Gt));
        assert_eq!(
            Lookup::split_key("content_type__app_label"),
            ("content_type__app_label", Lookup::Exact)
        );
        assert_eq!(
            Lookup::split_key("user__username__istartswith"),
            ("user__username", Lookup::IStartsWith)
        );
        assert_eq!(Lookup::split_key("char"), ("char", Lookup::Exact));
    }

    #[test]
    fn test_text_lookups() {
        let lhs = Value::from("Can add user");
        assert!(Lookup::Contains.matches(&lhs, &Value::from("add")));
        assert!(!Lookup::Contains.matches(&lhs, &Value::from("ADD")));
        assert!(Lookup::IContains.matches(&lhs, &Value::from("ADD")));
        assert!(Lookup::IStartsWith.matches(&lhs, &Value::from("can")));
        assert!(Lookup::EndsWith.matches(&lhs, &Value::from("user")));
        assert!(Lookup::IExact.matches(&lhs, &Value::from("CAN ADD USER")));
    }

    #[test]
    fn test_numeric_and_set_lookups() {
        let lhs = Value::Int(10);
        assert!(Lookup::Gt.matches(&lhs, &Value::Int(5)));
        assert!(Lookup::Gte.matches(&lhs, &Value::Float(10.0)));
        assert!(!Lookup::Lt.matches(&lhs, &Value::Int(10)));
        assert!(Lookup::In.matches(&lhs, &Value::from(vec![1, 10])));
        assert!(Lookup::Range.matches(&lhs, &Value::from(vec![10, 20])));
        assert!(!Lookup::Range.matches(&lhs, &Value::from(vec![11, 20])));
        assert!(Lookup::Exact.matches(&lhs, &Value::Float(10.0)));
    }

    #[test]
    fn test_null_handling() {
        assert!(Lookup::IsNull.matches(&Value::Null, &Value::Bool(true)));
        assert!(!Lookup::IsNull.matches(&Value::Int(1), &Value::Bool(true)));
        assert!(Lookup::Exact.matches(&Value::Null, &Value::Null));
        assert!(!Lookup::Gt.matches(&Value::Null, &Value::Int(0)));
        assert!(!Lookup::Contains.matches(&Value::Null, &Value::from("")));
    }
}
