//! Translation of submitted filter-form values into datasource filters and
//! report attributes.
//!
//! A `FilterForm` describes the fields a report accepts. Field names that
//! start with `_` are report controls (`_report_order_by`, `_report_group_by`,
//! `_report_list_display`, `_format`) or passthrough extras (`_extras_*`);
//! every other field is a lookup on the report's collection.

use crate::error::{ConfigurationError, Result};
use crate::report::{GroupBy, Report};
use chrono::NaiveDate;
use reportkit_store::Condition;
use reportkit_types::{CollectionId, FieldKind, Value, capitalize, humanize};
use std::collections::BTreeMap;

const REPORT_PREFIX: &str = "_report_";
const EXTRAS_PREFIX: &str = "_extras_";
const FORMAT_FIELD: &str = "_format";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    /// Primary key of a related record.
    Relation(CollectionId),
    Choice(Vec<(String, String)>),
    MultiChoice(Vec<(String, String)>),
    Passthrough,
}

impl FieldInput {
    fn for_kind(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Auto | FieldKind::Integer | FieldKind::BigInteger => FieldInput::Integer,
            FieldKind::Float | FieldKind::Decimal => FieldInput::Decimal,
            FieldKind::Boolean => FieldInput::Boolean,
            FieldKind::Date | FieldKind::DateTime => FieldInput::Date,
            FieldKind::ForeignKey(related) => FieldInput::Relation(related.id.clone()),
            FieldKind::Char | FieldKind::Text | FieldKind::Time => FieldInput::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub input: FieldInput,
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, input: FieldInput) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            input,
        }
    }

    /// Parse raw text the way this field's input would clean it.
    ///
    /// Date fields accept `start..end` for a range; either bound may be empty.
    pub fn parse(&self, raw: &str) -> std::result::Result<Submitted, String> {
        let raw = raw.trim();
        let invalid = || format!("Enter a valid value for {}: {:?}", self.label, raw);
        Ok(match &self.input {
            FieldInput::Integer | FieldInput::Relation(_) => {
                Submitted::Value(Value::Int(raw.parse().map_err(|_| invalid())?))
            }
            FieldInput::Decimal => {
                Submitted::Value(Value::Decimal(raw.parse().map_err(|_| invalid())?))
            }
            FieldInput::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Submitted::Value(Value::Bool(true)),
                "false" | "no" | "0" | "off" | "" => Submitted::Value(Value::Bool(false)),
                _ => return Err(invalid()),
            },
            FieldInput::Date => match raw.split_once("..") {
                Some((start, end)) => Submitted::DateRange(
                    parse_optional_date(start).ok_or_else(invalid)?,
                    parse_optional_date(end).ok_or_else(invalid)?,
                ),
                None => Submitted::Value(Value::Date(parse_date(raw).ok_or_else(invalid)?)),
            },
            FieldInput::MultiChoice(_) => Submitted::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Value::from)
                    .collect(),
            ),
            FieldInput::Text | FieldInput::Choice(_) | FieldInput::Passthrough => {
                Submitted::Value(Value::from(raw))
            }
        })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

// Outer None is a parse failure, inner None an open bound.
fn parse_optional_date(raw: &str) -> Option<Option<NaiveDate>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(None);
    }
    parse_date(raw).map(Some)
}

/// A pre-built filter contributed by a custom field.
#[derive(Debug, Clone)]
pub enum FilterSpec {
    Keywords(BTreeMap<String, Value>),
    Condition(Condition),
}

impl FilterSpec {
    fn is_empty(&self) -> bool {
        match self {
            FilterSpec::Keywords(map) => map.is_empty(),
            FilterSpec::Condition(_) => false,
        }
    }

    pub fn description(&self) -> String {
        match self {
            FilterSpec::Keywords(map) => map
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", "),
            FilterSpec::Condition(condition) => condition.to_string(),
        }
    }
}

/// A cleaned value as submitted for one field.
#[derive(Debug, Clone)]
pub enum Submitted {
    Value(Value),
    List(Vec<Value>),
    DateRange(Option<NaiveDate>, Option<NaiveDate>),
    Spec(FilterSpec),
}

impl Submitted {
    fn is_truthy(&self) -> bool {
        match self {
            Submitted::Value(v) => v.is_truthy(),
            Submitted::List(items) => !items.is_empty(),
            Submitted::DateRange(start, end) => start.is_some() || end.is_some(),
            Submitted::Spec(spec) => !spec.is_empty(),
        }
    }

    fn description(&self) -> String {
        match self {
            Submitted::Value(v) => v.to_string(),
            Submitted::List(items) => Value::List(items.clone()).to_string(),
            Submitted::DateRange(start, end) => {
                let show = |d: &Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
                format!("{} - {}", show(start), show(end))
            }
            Submitted::Spec(spec) => spec.description(),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Submitted::Value(v) => v,
            Submitted::List(items) => Value::List(items),
            Submitted::DateRange(start, end) => {
                Value::List(vec![Value::from(start), Value::from(end)])
            }
            Submitted::Spec(spec) => Value::Text(spec.description()),
        }
    }
}

impl From<Value> for Submitted {
    fn from(value: Value) -> Self {
        Submitted::Value(value)
    }
}

impl From<&str> for Submitted {
    fn from(value: &str) -> Self {
        Submitted::Value(Value::from(value))
    }
}

impl From<FilterSpec> for Submitted {
    fn from(spec: FilterSpec) -> Self {
        Submitted::Spec(spec)
    }
}

/// Submitted values keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    values: BTreeMap<String, Submitted>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Submitted>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Submitted>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Submitted> {
        self.values.get(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormOptions {
    /// Filter paths; `None` uses the report's `list_filter`.
    pub filtering: Option<Vec<String>>,
    /// `(value, label)` choices for `_report_order_by`.
    pub order_by: Vec<(String, String)>,
    /// `(value, label)` choices for `_report_group_by`, values as `group,order`.
    pub group_by: Vec<(String, String)>,
    pub configure_columns: bool,
}

/// Report attributes carried by `_report_*`, `_format` and `_extras_*` fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportAttributes {
    pub order_by: Option<Vec<String>>,
    pub group_by: Option<(String, String)>,
    pub list_display: Option<Vec<String>>,
    pub format: Option<String>,
    pub extras: BTreeMap<String, Value>,
    /// `_report_*` keys no report understands.
    pub unknown: Vec<String>,
}

/// Outcome of translating a submission.
#[derive(Debug, Clone, Default)]
pub struct Translated {
    pub filters: Vec<Condition>,
    pub kwfilters: BTreeMap<String, Value>,
    /// `(field label, human readable value)` in field order.
    pub summary: Vec<(String, String)>,
    pub attributes: ReportAttributes,
}

impl Translated {
    /// A copy of `report` with these filters and attributes applied.
    pub fn apply(&self, report: &Report) -> Result<Report> {
        if let Some(key) = self.attributes.unknown.first() {
            return Err(
                ConfigurationError::UnknownOption(format!("{}{}", REPORT_PREFIX, key)).into(),
            );
        }

        let mut options = report.to_options();
        if let Some(datasource) = options.datasource.as_mut() {
            datasource.add_filters(self.filters.iter().cloned(), self.kwfilters.clone());
        }
        if !self.attributes.extras.is_empty() {
            options.extras = Some(self.attributes.extras.clone());
        }
        if let Some(order_by) = &self.attributes.order_by {
            options.order_by = Some(order_by.clone());
        }
        if let Some((group, order)) = &self.attributes.group_by {
            options.group_by = Some(GroupBy::column(group.as_str(), order.as_str()));
        }
        if let Some(list_display) = &self.attributes.list_display {
            options.list_display = Some(list_display.clone());
        }
        options.filters_summary = self.summary.clone();
        Report::as_report(options)
    }
}

/// Field set accepted for one report.
#[derive(Debug, Clone)]
pub struct FilterForm {
    name: String,
    fields: Vec<FormField>,
}

impl FilterForm {
    pub fn for_report(report: &Report, options: FormOptions) -> Self {
        let schema = report.datasource().schema();
        let mut fields = Vec::new();

        let paths = options
            .filtering
            .clone()
            .unwrap_or_else(|| report.list_filter().to_vec());
        for path in paths.iter().filter(|p| !p.contains('=')) {
            if let Some(field) = schema.field_from_path(path) {
                fields.push(FormField::new(
                    path.replace('.', "__"),
                    capitalize(&field.verbose_name()),
                    FieldInput::for_kind(&field.kind),
                ));
            } else if let Some(key) = path.strip_prefix(EXTRAS_PREFIX) {
                fields.push(FormField::new(
                    path.as_str(),
                    humanize(key),
                    FieldInput::Passthrough,
                ));
            } else {
                tracing::debug!(collection = %schema.id, path = %path, "ignoring unknown filter path");
            }
        }

        if !options.order_by.is_empty() {
            fields.push(FormField::new(
                "_report_order_by",
                "Order by",
                FieldInput::Choice(options.order_by),
            ));
        }
        if !options.group_by.is_empty() {
            fields.push(FormField::new(
                "_report_group_by",
                "Group by",
                FieldInput::Choice(options.group_by),
            ));
        }
        let formats = report.format_labels();
        if !formats.is_empty() {
            fields.push(FormField::new(
                FORMAT_FIELD,
                "Format",
                FieldInput::Choice(
                    formats
                        .into_iter()
                        .map(|f| (f.to_string(), f.to_string()))
                        .collect(),
                ),
            ));
        }
        if options.configure_columns {
            let choices = report
                .display_order()
                .into_iter()
                .filter_map(|name| {
                    let title = report.get_column_by_name(&name).ok()?.title();
                    Some((name, title))
                })
                .collect();
            fields.push(FormField::new(
                "_report_list_display",
                "Columns",
                FieldInput::MultiChoice(choices),
            ));
        }

        Self {
            name: format!("{}FilterForm", schema.id.name()),
            fields,
        }
    }

    /// Add a custom field, replacing one of the same name.
    pub fn with_field(mut self, field: FormField) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that become query lookups.
    pub fn lookup_fields(&self) -> impl Iterator<Item = &FormField> {
        self.fields.iter().filter(|f| !f.name.starts_with('_'))
    }

    pub fn translate(&self, submission: &Submission) -> Translated {
        let mut out = Translated::default();

        for field in self.lookup_fields() {
            let Some(value) = submission.get(&field.name) else {
                continue;
            };
            if !value.is_truthy() {
                continue;
            }
            match value {
                Submitted::Spec(FilterSpec::Keywords(map)) => out.kwfilters.extend(map.clone()),
                Submitted::Spec(FilterSpec::Condition(condition)) => {
                    out.filters.push(condition.clone())
                }
                Submitted::DateRange(start, end) => {
                    if let Some(start) = start {
                        out.kwfilters
                            .insert(format!("{}__gt", field.name), Value::Date(*start));
                    }
                    if let Some(end) = end {
                        out.kwfilters
                            .insert(format!("{}__lt", field.name), Value::Date(*end));
                    }
                }
                Submitted::List(items) => {
                    out.kwfilters
                        .insert(format!("{}__in", field.name), Value::List(items.clone()));
                }
                Submitted::Value(v) => {
                    out.kwfilters.insert(field.name.clone(), v.clone());
                }
            }
            out.summary.push((field.label.clone(), value.description()));
        }

        for field in self.fields.iter().filter(|f| f.name.starts_with('_')) {
            let Some(value) = submission.get(&field.name) else {
                continue;
            };
            if let Some(key) = field.name.strip_prefix(EXTRAS_PREFIX) {
                out.attributes
                    .extras
                    .insert(key.to_string(), value.clone().into_value());
            } else if field.name == FORMAT_FIELD {
                out.attributes.format = Some(value.description()).filter(|f| !f.is_empty());
            } else if let Some(key) = field.name.strip_prefix(REPORT_PREFIX) {
                let text = value.description();
                match key {
                    "order_by" => out.attributes.order_by = clean_order_by(&text),
                    "group_by" => out.attributes.group_by = clean_group_by(&text),
                    "list_display" => {
                        if let Submitted::List(items) = value {
                            out.attributes.list_display =
                                Some(items.iter().map(|v| v.to_string()).collect());
                        }
                    }
                    other => out.attributes.unknown.push(other.to_string()),
                }
            }
        }

        out
    }
}

/// `"a, b.c"` -> `["a", "b__c"]`
fn clean_order_by(text: &str) -> Option<Vec<String>> {
    if text.trim().is_empty() {
        return None;
    }
    Some(
        text.split(',')
            .map(|part| part.trim().replace('.', "__"))
            .collect(),
    )
}

/// `"group,order"` -> `("group", "order")`; anything else is ignored.
fn clean_group_by(text: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [group, order] if !group.is_empty() => Some((group.to_string(), order.to_string())),
        _ => None,
    }
}
