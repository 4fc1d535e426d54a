use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reportkit_types::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Write};

/// Formatting strategy bound to a column.
///
/// Widgets are pure functions of (value, format) and accept `Null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    #[default]
    Plain,
    YesNo,
    Currency,
    Percent,
    Date,
    Time,
}

/// A cell as a spreadsheet writer wants it: native numbers and dates.
#[derive(Debug, Clone, PartialEq)]
pub enum SpreadsheetCell {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl Widget {
    /// Text (or HTML-ready, unescaped) form of a value.
    pub fn render_text(&self, value: &Value, format: Option<&str>) -> String {
        match self {
            Widget::Plain => value.to_string(),
            Widget::YesNo => if value.is_truthy() { "Yes" } else { "No" }.to_string(),
            Widget::Currency => match value.as_f64() {
                Some(number) if value.is_numeric() => currency_format(number),
                _ => value.to_string(),
            },
            Widget::Percent => format!("{} %", value),
            Widget::Date => match value {
                Value::Date(d) => strftime(d.format(format.unwrap_or("%d %b %Y")), value),
                Value::DateTime(dt) => strftime(dt.format(format.unwrap_or("%d %b %Y")), value),
                _ => value.to_string(),
            },
            Widget::Time => match value {
                Value::Time(t) => strftime(t.format(format.unwrap_or("%H %M")), value),
                Value::DateTime(dt) => strftime(dt.format(format.unwrap_or("%H %M")), value),
                _ => value.to_string(),
            },
        }
    }

    /// Spreadsheet form: dates and numbers stay native, the rest is text.
    pub fn render_spreadsheet(&self, value: &Value, format: Option<&str>) -> SpreadsheetCell {
        match (self, value) {
            (_, Value::Null) => SpreadsheetCell::Empty,
            (Widget::YesNo | Widget::Percent, _) => {
                SpreadsheetCell::Text(self.render_text(value, format))
            }
            (_, Value::Int(i)) => SpreadsheetCell::Number(*i as f64),
            (_, Value::Float(f) | Value::Decimal(f)) => SpreadsheetCell::Number(*f),
            (_, Value::Bool(b)) => SpreadsheetCell::Bool(*b),
            (_, Value::Date(d)) => SpreadsheetCell::Date(*d),
            (_, Value::DateTime(dt)) => SpreadsheetCell::DateTime(*dt),
            (_, Value::Time(t)) => SpreadsheetCell::Time(*t),
            (_, Value::Text(_) | Value::List(_)) => {
                SpreadsheetCell::Text(self.render_text(value, format))
            }
        }
    }
}

// chrono reports a bad format string as a fmt error; fall back to the plain form.
fn strftime(formatted: impl Display, value: &Value) -> String {
    let mut out = String::new();
    match write!(out, "{}", formatted) {
        Ok(()) => out,
        Err(_) => value.to_string(),
    }
}

/// `1234567.891` -> `1,234,567.89`; negatives carry a leading `-`.
pub fn currency_format(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, grouped, cents % 100)
}
