use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reportkit_types::{FieldKind, Value};
use rusqlite::types::Value as SqlValue;

const DATE_FMT: &str = "%Y-%m-%d";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const TIME_FMT: &str = "%H:%M:%S";

pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) | Value::Decimal(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(d.format(DATE_FMT).to_string()),
        Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FMT).to_string()),
        Value::Time(t) => SqlValue::Text(t.format(TIME_FMT).to_string()),
        Value::List(_) => SqlValue::Text(serde_json::to_string(value).unwrap_or_default()),
    }
}

/// Decode a stored column according to the field kind that declared it.
pub fn from_sql(kind: &FieldKind, raw: SqlValue) -> Value {
    match (kind, raw) {
        (_, SqlValue::Null) => Value::Null,
        (FieldKind::Boolean, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (FieldKind::Decimal, SqlValue::Real(f)) => Value::Decimal(f),
        (FieldKind::Decimal, SqlValue::Integer(i)) => Value::Decimal(i as f64),
        (FieldKind::Float, SqlValue::Integer(i)) => Value::Float(i as f64),
        (FieldKind::Date, SqlValue::Text(s)) => NaiveDate::parse_from_str(&s, DATE_FMT)
            .map(Value::Date)
            .unwrap_or(Value::Text(s)),
        (FieldKind::DateTime, SqlValue::Text(s)) => {
            NaiveDateTime::parse_from_str(&s, DATETIME_FMT)
                .map(Value::DateTime)
                .unwrap_or(Value::Text(s))
        }
        (FieldKind::Time, SqlValue::Text(s)) => NaiveTime::parse_from_str(&s, TIME_FMT)
            .map(Value::Time)
            .unwrap_or(Value::Text(s)),
        (_, SqlValue::Integer(i)) => Value::Int(i),
        (_, SqlValue::Real(f)) => Value::Float(f),
        (_, SqlValue::Text(s)) => Value::Text(s),
        (_, SqlValue::Blob(bytes)) => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_directed_decoding() {
        assert_eq!(
            from_sql(&FieldKind::Boolean, SqlValue::Integer(1)),
            Value::Bool(true)
        );
        assert_eq!(
            from_sql(&FieldKind::Decimal, SqlValue::Integer(3)),
            Value::Decimal(3.0)
        );
        let date = NaiveDate::from_ymd_opt(2013, 1, 5).unwrap();
        assert_eq!(
            from_sql(&FieldKind::Date, to_sql(&Value::Date(date))),
            Value::Date(date)
        );
        assert_eq!(from_sql(&FieldKind::Char, SqlValue::Null), Value::Null);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("auth_user"), "\"auth_user\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }
}
