use reportkit_types::Value;
use std::collections::BTreeMap;

const LOOKUPS: &[&str] = &[
    "exact",
    "iexact",
    "contains",
    "icontains",
    "in",
    "gt",
    "gte",
    "lt",
    "lte",
    "startswith",
    "istartswith",
    "endswith",
    "iendswith",
    "range",
    "year",
    "month",
    "day",
    "week_day",
    "isnull",
    "search",
    "regex",
    "iregex",
];

/// Keys that carry session context rather than a user filter.
const HIDDEN: &[&str] = &["office"];

/// `("Label", "value")` pairs for display, sorted.
///
/// The label is the last path segment, keeping a trailing lookup:
/// `integer1__gt` reads `Integer1 Gt`.
pub fn humanize_filters(filters: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = filters
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .filter_map(|(key, value)| {
            let lowered = key.to_lowercase();
            let parts: Vec<&str> = lowered.split("__").collect();
            let last = *parts.last()?;
            if HIDDEN.contains(&last) {
                return None;
            }
            let label = if LOOKUPS.contains(&last) && parts.len() > 1 {
                parts[parts.len() - 2..].join(" ")
            } else {
                last.to_string()
            };
            Some((title_case(&label.replace('_', " ")), value.to_string()))
        })
        .collect();
    out.sort();
    out
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_suffix_kept_in_label() {
        let mut filters = BTreeMap::new();
        filters.insert("integer1__gt".to_string(), Value::Int(5));
        filters.insert("user__first_name".to_string(), Value::from("sax"));
        filters.insert("char".to_string(), Value::from("abc"));
        assert_eq!(
            humanize_filters(&filters),
            vec![
                ("Char".to_string(), "abc".to_string()),
                ("First Name".to_string(), "sax".to_string()),
                ("Integer1 Gt".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_office_is_hidden() {
        let mut filters = BTreeMap::new();
        filters.insert("user__office".to_string(), Value::Int(1));
        filters.insert("office".to_string(), Value::Int(1));
        assert!(humanize_filters(&filters).is_empty());
    }
}
