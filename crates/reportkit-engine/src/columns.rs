use crate::datasource::{Datasource, DatasourceAttr};
use crate::error::ValueExtractionError;
use crate::row::{Cell, RowValue, RowValueError};
use crate::widgets::Widget;
use reportkit_types::{
    Error as TypesError, FieldKind, Record, Schema, Value, format_template, humanize, last_segment,
    normalize_name, resolve_path,
};
use std::fmt;
use std::sync::Arc;

/// Callable column body: receives the record and the datasource.
pub type ColumnFn =
    Arc<dyn Fn(&dyn Record, &Datasource) -> std::result::Result<Value, String> + Send + Sync>;

/// Post-extraction transform.
pub type Manipulator = Arc<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Fold step of a calculated column: `op(value, accumulator)`.
pub type FoldOp = Arc<dyn Fn(&Value, &Value) -> Option<Value> + Send + Sync>;

/// Declared value type of a column; drives widget, format and spreadsheet style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    #[default]
    Any,
    Char,
    Text,
    Integer,
    Decimal,
    Date,
    DateTime,
    Time,
    Boolean,
    Currency,
}

impl ColumnType {
    /// Most specific type for a schema field.
    ///
    /// Only integer, decimal, date, character and boolean fields get a
    /// dedicated type; everything else (ids, datetimes, relations) is `Any`.
    pub fn for_field(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Integer => ColumnType::Integer,
            FieldKind::Decimal => ColumnType::Decimal,
            FieldKind::Date => ColumnType::Date,
            FieldKind::Char => ColumnType::Char,
            FieldKind::Boolean => ColumnType::Boolean,
            _ => ColumnType::Any,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "any" => ColumnType::Any,
            "char" => ColumnType::Char,
            "text" => ColumnType::Text,
            "integer" => ColumnType::Integer,
            "decimal" => ColumnType::Decimal,
            "date" => ColumnType::Date,
            "datetime" => ColumnType::DateTime,
            "time" => ColumnType::Time,
            "boolean" => ColumnType::Boolean,
            "currency" => ColumnType::Currency,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Any => "any",
            ColumnType::Char => "char",
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Time => "time",
            ColumnType::Boolean => "boolean",
            ColumnType::Currency => "currency",
        }
    }

    pub fn default_widget(&self) -> Widget {
        match self {
            ColumnType::Date => Widget::Date,
            ColumnType::Time => Widget::Time,
            ColumnType::Boolean => Widget::YesNo,
            ColumnType::Currency => Widget::Currency,
            _ => Widget::Plain,
        }
    }

    pub fn default_format(&self) -> Option<&'static str> {
        match self {
            ColumnType::Date => Some("%d %b %Y"),
            ColumnType::Time => Some("%H %M"),
            _ => None,
        }
    }

    /// Spreadsheet number-format code.
    pub fn number_format(&self) -> &'static str {
        match self {
            ColumnType::Date => "DD-MMM-YYYY",
            ColumnType::DateTime => "DD MMM YY hh:mm",
            ColumnType::Time => "hh:mm",
            ColumnType::Integer => "#,##0",
            ColumnType::Decimal => "#,##0.00",
            ColumnType::Currency => "\"$\"#,##0.00_);[Red](\"$\"#,##0.00)",
            _ => "General",
        }
    }

    pub fn css_class(&self) -> String {
        format!("reportkit_column_{}", self.as_str())
    }
}

/// Where a column's value comes from.
#[derive(Clone)]
pub enum Source {
    /// Dotted path on the record, falling back to a datasource attribute.
    Attr(String),
    /// Several paths folded with `op`, starting from `initial`.
    Calc {
        attrs: Vec<String>,
        op: FoldOp,
        initial: Value,
    },
    Callable(ColumnFn),
    /// `{path}` template formatted against the whole record.
    Template(String),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Attr(path) => f.debug_tuple("Attr").field(path).finish(),
            Source::Calc { attrs, initial, .. } => f
                .debug_struct("Calc")
                .field("attrs", attrs)
                .field("initial", initial)
                .finish(),
            Source::Callable(_) => f.write_str("Callable(..)"),
            Source::Template(template) => f.debug_tuple("Template").field(template).finish(),
        }
    }
}

/// A named rule for extracting and typing one value from a record.
#[derive(Clone)]
pub struct Column {
    attr: String,
    source: Source,
    ty: ColumnType,
    name: String,
    title: Option<String>,
    format: Option<String>,
    widget: Option<Widget>,
    manipulator: Option<Manipulator>,
    sys_only: bool,
    optional: bool,
    model: Option<Arc<Schema>>,
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("type", &self.ty)
            .field("sys_only", &self.sys_only)
            .field("optional", &self.optional)
            .finish()
    }
}

impl Column {
    fn with_source(attr: String, source: Source) -> Self {
        Self {
            name: normalize_name(&attr),
            attr,
            source,
            ty: ColumnType::Any,
            title: None,
            format: None,
            widget: None,
            manipulator: None,
            sys_only: false,
            optional: false,
            model: None,
        }
    }

    /// Plain column over an attribute path.
    pub fn new(attr: impl Into<String>) -> Self {
        let attr = attr.into();
        Self::with_source(attr.clone(), Source::Attr(attr))
    }

    pub fn typed(attr: impl Into<String>, ty: ColumnType) -> Self {
        Self::new(attr).with_type(ty)
    }

    /// Sums `attrs` (numbers add, text concatenates) starting from 0.
    pub fn calc<S: Into<String>>(attrs: impl IntoIterator<Item = S>) -> Self {
        let attrs: Vec<String> = attrs.into_iter().map(Into::into).collect();
        let op: FoldOp = Arc::new(|value: &Value, acc: &Value| value.checked_add(acc));
        Self::with_source(
            attrs.concat(),
            Source::Calc {
                attrs,
                op,
                initial: Value::Int(0),
            },
        )
        .with_type(ColumnType::Integer)
    }

    /// Wraps a function of (record, datasource). Title defaults to the name.
    pub fn callable<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&dyn Record, &Datasource) -> std::result::Result<Value, String>
            + Send
            + Sync
            + 'static,
    {
        let name = normalize_name(&name.into());
        let mut column = Self::with_source(name.clone(), Source::Callable(Arc::new(func)));
        column.title = Some(name);
        column
    }

    /// Formats the whole record through `template`; named after `attr`.
    pub fn template(attr: impl Into<String>, template: impl Into<String>) -> Self {
        Self::with_source(attr.into(), Source::Template(template.into()))
    }

    /// Like `new`, but a failed extraction yields an empty value.
    pub fn optional(attr: impl Into<String>) -> Self {
        let mut column = Self::new(attr);
        column.optional = true;
        column
    }

    pub fn with_type(mut self, ty: ColumnType) -> Self {
        self.ty = ty;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widget = Some(widget);
        self
    }

    pub fn with_manipulator<F>(mut self, func: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.manipulator = Some(Arc::new(func));
        self
    }

    /// Replace the fold of a calculated column.
    pub fn with_op(mut self, op: FoldOp, initial: Value) -> Self {
        if let Source::Calc { attrs, .. } = &self.source {
            self.source = Source::Calc {
                attrs: attrs.clone(),
                op,
                initial,
            };
        }
        self
    }

    pub fn sys_only(mut self) -> Self {
        self.sys_only = true;
        self
    }

    pub fn bind(mut self, model: Arc<Schema>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    pub fn is_sys_only(&self) -> bool {
        self.sys_only
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn model(&self) -> Option<&Arc<Schema>> {
        self.model.as_ref()
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref().or(self.ty.default_format())
    }

    pub fn widget(&self) -> Widget {
        self.widget.unwrap_or(self.ty.default_widget())
    }

    /// Explicit title, else the bound schema's field label, else the
    /// humanized last path segment.
    pub fn title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if let Some(field) = self
            .model
            .as_ref()
            .and_then(|model| model.field_from_path(&self.attr))
        {
            return field.verbose_name();
        }
        humanize(last_segment(&self.attr))
    }

    /// Canonical form used in cache fingerprints.
    pub fn fingerprint(&self) -> String {
        let source = match &self.source {
            Source::Attr(path) => path.clone(),
            Source::Calc { attrs, .. } => attrs.join("+"),
            Source::Callable(_) => "<callable>".to_string(),
            Source::Template(template) => template.clone(),
        };
        format!("{}:{}:{}", self.name, self.ty.as_str(), source)
    }

    /// Extract the raw value for `record`.
    pub fn get_value(
        &self,
        record: &dyn Record,
        datasource: &Datasource,
    ) -> std::result::Result<Value, ValueExtractionError> {
        let result = match &self.source {
            Source::Attr(path) => value_from_attr(record, path, datasource),
            Source::Calc { attrs, op, initial } => {
                let mut acc = initial.clone();
                for path in attrs {
                    let value = value_from_attr(record, path, datasource)?;
                    acc = op(&value, &acc).ok_or_else(|| {
                        ValueExtractionError::new(
                            path.as_str(),
                            format!("cannot combine {} with {}", value.repr(), acc.repr()),
                        )
                    })?;
                }
                Ok(acc)
            }
            Source::Callable(func) => func(record, datasource)
                .map_err(|cause| ValueExtractionError::new(self.name.as_str(), cause)),
            Source::Template(template) => format_template(template, record)
                .map(Value::Text)
                .map_err(|err| ValueExtractionError::new(self.attr.as_str(), err.to_string())),
        };

        let result = result.and_then(|value| match self.ty {
            ColumnType::Decimal => to_decimal(&self.attr, value),
            _ => Ok(value),
        });

        match result {
            Err(err) if self.optional => {
                tracing::debug!(column = %self.name, error = %err, "optional column left empty");
                Ok(Value::Text(String::new()))
            }
            other => other,
        }
    }

    pub fn apply_manipulator(&self, value: Value) -> std::result::Result<Value, ValueExtractionError> {
        match &self.manipulator {
            Some(func) => func(value).map_err(|cause| ValueExtractionError::new(self.name.as_str(), cause)),
            None => Ok(value),
        }
    }

    /// Extract, manipulate and wrap one cell; failures become error cells.
    pub fn cell(self: &Arc<Self>, record: &dyn Record, datasource: &Datasource) -> Cell {
        match self
            .get_value(record, datasource)
            .and_then(|value| self.apply_manipulator(value))
        {
            Ok(value) => Cell::Value(RowValue::new(value, self)),
            Err(err) => {
                tracing::debug!(column = %self.name, error = %err, "cell extraction failed");
                Cell::Error(RowValueError::from(err))
            }
        }
    }
}

/// Resolve `path` on the record, then on the datasource.
///
/// A datasource value counts only when truthy; a datasource callable is
/// invoked with the record.
fn value_from_attr(
    record: &dyn Record,
    path: &str,
    datasource: &Datasource,
) -> std::result::Result<Value, ValueExtractionError> {
    match resolve_path(record, path) {
        Ok(resolved) => resolved
            .into_value(path)
            .map_err(|err| ValueExtractionError::new(path, err.to_string())),
        Err(TypesError::NotFound(_)) => match datasource.attribute(path) {
            Some(DatasourceAttr::Value(value)) if value.is_truthy() => Ok(value.clone()),
            Some(DatasourceAttr::Callable(func)) => {
                func(record).map_err(|cause| ValueExtractionError::new(path, cause))
            }
            _ => Err(ValueExtractionError::new(path, "attribute not found")),
        },
        Err(err) => Err(ValueExtractionError::new(path, err.to_string())),
    }
}

fn to_decimal(attr: &str, value: Value) -> std::result::Result<Value, ValueExtractionError> {
    match &value {
        Value::Decimal(_) => Ok(value),
        Value::Int(_) | Value::Float(_) => Ok(Value::Decimal(value.as_f64().unwrap_or_default())),
        Value::Text(text) => text
            .trim()
            .parse::<f64>()
            .map(Value::Decimal)
            .map_err(|_| ValueExtractionError::new(attr, format!("invalid decimal {:?}", text))),
        other => Err(ValueExtractionError::new(
            attr,
            format!("cannot convert {} to decimal", other.repr()),
        )),
    }
}

/// Column spec as accepted by datasource construction.
#[derive(Debug, Clone)]
pub enum ColumnSpec {
    /// Attribute path; the column type is inferred from the schema.
    Name(String),
    Column(Column),
    /// Attribute path with an explicit column type.
    Typed(String, ColumnType),
}

impl From<&str> for ColumnSpec {
    fn from(name: &str) -> Self {
        ColumnSpec::Name(name.to_string())
    }
}

impl From<String> for ColumnSpec {
    fn from(name: String) -> Self {
        ColumnSpec::Name(name)
    }
}

impl From<Column> for ColumnSpec {
    fn from(column: Column) -> Self {
        ColumnSpec::Column(column)
    }
}

impl ColumnSpec {
    /// Normalize to a column bound to `schema`.
    pub fn into_column(self, schema: &Arc<Schema>) -> Column {
        match self {
            ColumnSpec::Name(path) => column_for_attribute(schema, &path),
            ColumnSpec::Column(column) => column.bind(schema.clone()),
            ColumnSpec::Typed(path, ty) => Column::typed(path, ty).bind(schema.clone()),
        }
    }
}

/// Most suitable column for `path` on `schema`.
pub fn column_for_attribute(schema: &Arc<Schema>, path: &str) -> Column {
    let ty = schema
        .field_from_path(path)
        .map(|field| ColumnType::for_field(&field.kind))
        .unwrap_or_default();
    Column::typed(path, ty).bind(schema.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportkit_types::{FieldDef, computed};

    fn user() -> Arc<Schema> {
        Arc::new(
            Schema::new("auth.User", "auth_user")
                .field(FieldDef::new("username", FieldKind::Char))
                .field(FieldDef::new("is_staff", FieldKind::Boolean).with_label("staff status"))
                .field(FieldDef::new("date_joined", FieldKind::DateTime))
                .field(FieldDef::new("balance", FieldKind::Decimal))
                .method("get_full_name", computed(|_| Ok(Value::from("Full")))),
        )
    }

    #[test]
    fn test_names_are_normalized() {
        assert_eq!(Column::new("user.username").name(), "user_username");
        assert_eq!(Column::new("_1field").name(), "field");
        assert_eq!(Column::new("a").with_name("b").name(), "b");
        assert_eq!(Column::calc(["integer1", "integer2"]).name(), "integer1integer2");
    }

    #[test]
    fn test_type_inference_is_exact() {
        let schema = user();
        let ty = |path: &str| column_for_attribute(&schema, path).column_type();
        assert_eq!(ty("username"), ColumnType::Char);
        assert_eq!(ty("is_staff"), ColumnType::Boolean);
        assert_eq!(ty("balance"), ColumnType::Decimal);
        assert_eq!(ty("date_joined"), ColumnType::Any);
        assert_eq!(ty("id"), ColumnType::Any);
        assert_eq!(ty("get_full_name"), ColumnType::Any);
    }

    #[test]
    fn test_title_derivation() {
        let schema = user();
        assert_eq!(column_for_attribute(&schema, "is_staff").title(), "staff status");
        assert_eq!(column_for_attribute(&schema, "date_joined").title(), "date joined");
        assert_eq!(
            column_for_attribute(&schema, "get_full_name").title(),
            "Get Full Name"
        );
        assert_eq!(Column::new("x").with_title("Explicit").title(), "Explicit");
        assert_eq!(Column::callable("custom", |_, _| Ok(Value::Null)).title(), "custom");
    }

    #[test]
    fn test_widget_and_format_follow_type() {
        let date = Column::typed("d", ColumnType::Date);
        assert_eq!(date.widget(), Widget::Date);
        assert_eq!(date.format(), Some("%d %b %Y"));
        assert_eq!(date.clone().with_format("%Y").format(), Some("%Y"));
        assert_eq!(Column::typed("b", ColumnType::Boolean).widget(), Widget::YesNo);
        assert_eq!(
            Column::typed("b", ColumnType::Boolean)
                .with_widget(Widget::Plain)
                .widget(),
            Widget::Plain
        );
        assert_eq!(ColumnType::Currency.css_class(), "reportkit_column_currency");
        assert_eq!(ColumnType::parse("DateTime"), Some(ColumnType::DateTime));
    }
}
