use super::codec::{quote, to_sql};
use crate::error::{Error, Result};
use crate::lookup::Lookup;
use crate::query::{Condition, Query, parse_ordering};
use reportkit_types::{FieldKind, Schema, Value, split_path};
use rusqlite::types::Value as SqlValue;

/// `WHERE` body for a query (without the keyword). Empty filters compile to `1`.
pub fn where_clause(query: &Query, params: &mut Vec<SqlValue>) -> Result<String> {
    let parts = query
        .conditions()
        .iter()
        .map(|c| condition(&query.schema, c, params))
        .collect::<Result<Vec<_>>>()?;
    Ok(join(parts, " AND ", "1"))
}

/// `ORDER BY` body. The primary key is always the final tie-breaker.
pub fn order_clause(query: &Query) -> Result<String> {
    let table = quote(&query.schema.table);
    let mut parts = Vec::new();
    for spec in &query.order_by {
        let (path, descending) = parse_ordering(spec);
        let expr = order_expr(&query.schema, &table, &split_path(path), 0)?;
        parts.push(format!("{} {}", expr, if descending { "DESC" } else { "ASC" }));
    }
    parts.push(format!("{}.\"id\" ASC", table));
    Ok(parts.join(", "))
}

fn join(parts: Vec<String>, op: &str, empty: &str) -> String {
    if parts.is_empty() {
        empty.to_string()
    } else {
        format!("({})", parts.join(op))
    }
}

fn unknown(schema: &Schema, path: &[&str]) -> Error {
    Error::UnknownField {
        collection: schema.id.to_string(),
        path: path.join("__"),
    }
}

fn condition(schema: &Schema, cond: &Condition, params: &mut Vec<SqlValue>) -> Result<String> {
    match cond {
        Condition::Pred(pred) => {
            let segments = split_path(&pred.path);
            let null_passes = pred.lookup == Lookup::IsNull && pred.value.is_truthy();
            column_test(schema, &segments, null_passes, params, &mut |col, params| {
                Ok(leaf(col, pred.lookup, &pred.value, params))
            })
        }
        Condition::And(items) => {
            let parts = items
                .iter()
                .map(|c| condition(schema, c, params))
                .collect::<Result<Vec<_>>>()?;
            Ok(join(parts, " AND ", "1"))
        }
        Condition::Or(items) => {
            let parts = items
                .iter()
                .map(|c| condition(schema, c, params))
                .collect::<Result<Vec<_>>>()?;
            Ok(join(parts, " OR ", "0"))
        }
        Condition::Not(inner) => Ok(format!("NOT {}", condition(schema, inner, params)?)),
        Condition::InQuery { path, query } => {
            let segments = split_path(path);
            column_test(schema, &segments, false, params, &mut |col, params| {
                let inner = where_clause(query, params)?;
                Ok(format!(
                    "{} IN (SELECT \"id\" FROM {} WHERE {})",
                    col,
                    quote(&query.schema.table),
                    inner
                ))
            })
        }
    }
}

type LeafFn<'a> = dyn FnMut(&str, &mut Vec<SqlValue>) -> Result<String> + 'a;

/// Walk `segments` across foreign keys, nesting `IN (SELECT ...)` sub-selects,
/// and apply `leaf` to the final column.
fn column_test(
    schema: &Schema,
    segments: &[&str],
    null_passes: bool,
    params: &mut Vec<SqlValue>,
    leaf: &mut LeafFn<'_>,
) -> Result<String> {
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| unknown(schema, segments))?;
    let field = schema
        .get_field(first)
        .ok_or_else(|| unknown(schema, segments))?;
    let column = quote(&field.column_name());

    if rest.is_empty() {
        return leaf(&column, params);
    }
    let FieldKind::ForeignKey(related) = &field.kind else {
        return Err(unknown(schema, segments));
    };
    let inner = column_test(related, rest, null_passes, params, leaf)?;
    let sub = format!(
        "{} IN (SELECT \"id\" FROM {} WHERE {})",
        column,
        quote(&related.table),
        inner
    );
    if null_passes {
        Ok(format!("({} IS NULL OR {})", column, sub))
    } else {
        Ok(sub)
    }
}

fn leaf(col: &str, lookup: Lookup, value: &Value, params: &mut Vec<SqlValue>) -> String {
    let text = SqlValue::Text(value.to_string());
    match lookup {
        Lookup::Exact if value.is_null() => format!("{} IS NULL", col),
        Lookup::Exact => {
            params.push(to_sql(value));
            format!("{} = ?", col)
        }
        Lookup::IExact => {
            params.push(text);
            format!("LOWER({}) = LOWER(?)", col)
        }
        Lookup::Contains => {
            params.push(text);
            format!("INSTR({}, ?) > 0", col)
        }
        Lookup::IContains => {
            params.push(text);
            format!("INSTR(LOWER({}), LOWER(?)) > 0", col)
        }
        Lookup::StartsWith => {
            params.push(text.clone());
            params.push(text);
            format!("SUBSTR({}, 1, LENGTH(?)) = ?", col)
        }
        Lookup::IStartsWith => {
            params.push(text.clone());
            params.push(text);
            format!("LOWER(SUBSTR({}, 1, LENGTH(?))) = LOWER(?)", col)
        }
        Lookup::EndsWith => {
            params.push(text.clone());
            params.push(text);
            format!("SUBSTR({}, -LENGTH(?)) = ?", col)
        }
        Lookup::IEndsWith => {
            params.push(text.clone());
            params.push(text);
            format!("LOWER(SUBSTR({}, -LENGTH(?))) = LOWER(?)", col)
        }
        Lookup::In => {
            let items: Vec<&Value> = match value {
                Value::List(items) => items.iter().collect(),
                other => vec![other],
            };
            if items.is_empty() {
                return "0".to_string();
            }
            let marks = vec!["?"; items.len()].join(", ");
            params.extend(items.into_iter().map(to_sql));
            format!("{} IN ({})", col, marks)
        }
        Lookup::Gt | Lookup::Gte | Lookup::Lt | Lookup::Lte => {
            let op = match lookup {
                Lookup::Gt => ">",
                Lookup::Gte => ">=",
                Lookup::Lt => "<",
                _ => "<=",
            };
            params.push(to_sql(value));
            format!("{} {} ?", col, op)
        }
        Lookup::IsNull if value.is_truthy() => format!("{} IS NULL", col),
        Lookup::IsNull => format!("{} IS NOT NULL", col),
        Lookup::Range => match value {
            Value::List(bounds) if bounds.len() == 2 => {
                params.push(to_sql(&bounds[0]));
                params.push(to_sql(&bounds[1]));
                format!("{} BETWEEN ? AND ?", col)
            }
            _ => "0".to_string(),
        },
    }
}

fn order_expr(schema: &Schema, owner: &str, segments: &[&str], depth: usize) -> Result<String> {
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| unknown(schema, segments))?;
    let field = schema
        .get_field(first)
        .ok_or_else(|| unknown(schema, segments))?;
    let column = format!("{}.{}", owner, quote(&field.column_name()));
    if rest.is_empty() {
        return Ok(column);
    }
    let FieldKind::ForeignKey(related) = &field.kind else {
        return Err(unknown(schema, segments));
    };
    let alias = format!("t{}", depth);
    let inner = order_expr(related, &alias, rest, depth + 1)?;
    Ok(format!(
        "(SELECT {} FROM {} AS {} WHERE {}.\"id\" = {})",
        inner,
        quote(&related.table),
        alias,
        alias,
        column
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportkit_types::FieldDef;
    use std::sync::Arc;

    fn perm() -> Arc<Schema> {
        let ct = Arc::new(
            Schema::new("contenttypes.ContentType", "django_content_type")
                .field(FieldDef::new("app_label", FieldKind::Char)),
        );
        Arc::new(
            Schema::new("auth.Permission", "auth_permission")
                .field(FieldDef::new("name", FieldKind::Char))
                .field(FieldDef::new("content_type", FieldKind::ForeignKey(ct))),
        )
    }

    #[test]
    fn test_relation_filter_becomes_subselect() {
        let mut query = Query::new(perm());
        query
            .kwfilters
            .insert("content_type__app_label".to_string(), Value::from("auth"));
        let mut params = Vec::new();
        let sql = where_clause(&query, &mut params).unwrap();
        assert_eq!(
            sql,
            "(\"content_type_id\" IN (SELECT \"id\" FROM \"django_content_type\" WHERE \"app_label\" = ?))"
        );
        assert_eq!(params, vec![SqlValue::Text("auth".to_string())]);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let mut query = Query::new(perm());
        query
            .kwfilters
            .insert("id__in".to_string(), Value::List(vec![]));
        let mut params = Vec::new();
        assert_eq!(where_clause(&query, &mut params).unwrap(), "(0)");
    }

    #[test]
    fn test_order_clause_with_relation() {
        let mut query = Query::new(perm());
        query.order_by = vec!["-content_type__app_label".to_string(), "name".to_string()];
        assert_eq!(
            order_clause(&query).unwrap(),
            "(SELECT t0.\"app_label\" FROM \"django_content_type\" AS t0 WHERE t0.\"id\" = \"auth_permission\".\"content_type_id\") DESC, \
             \"auth_permission\".\"name\" ASC, \"auth_permission\".\"id\" ASC"
        );
    }
}
