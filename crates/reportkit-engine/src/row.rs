use crate::columns::Column;
use crate::error::ValueExtractionError;
use crate::widgets::SpreadsheetCell;
use reportkit_types::{Record, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// One extracted cell: the raw value plus a non-owning link to its column.
///
/// The column link is not serialized; equality and display only look at
/// the value, so rows read back from the cache behave like fresh ones.
#[derive(Clone, Serialize, Deserialize)]
pub struct RowValue {
    pub value: Value,
    #[serde(skip)]
    column: Weak<Column>,
}

impl RowValue {
    pub fn new(value: Value, column: &Arc<Column>) -> Self {
        Self {
            value,
            column: Arc::downgrade(column),
        }
    }

    /// A value with no column, as produced by deserialization.
    pub fn detached(value: Value) -> Self {
        Self {
            value,
            column: Weak::new(),
        }
    }

    pub fn column(&self) -> Option<Arc<Column>> {
        self.column.upgrade()
    }

    pub fn bind(&mut self, column: &Arc<Column>) {
        self.column = Arc::downgrade(column);
    }

    /// Text through the column's widget, or the plain form without a column.
    pub fn render_text(&self) -> String {
        match self.column() {
            Some(column) => column.widget().render_text(&self.value, column.format()),
            None => self.value.to_string(),
        }
    }

    pub fn render_spreadsheet(&self) -> SpreadsheetCell {
        match self.column() {
            Some(column) => column
                .widget()
                .render_spreadsheet(&self.value, column.format()),
            None => crate::widgets::Widget::Plain.render_spreadsheet(&self.value, None),
        }
    }
}

impl fmt::Debug for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value.repr())
    }
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl PartialEq for RowValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialEq<Value> for RowValue {
    fn eq(&self, other: &Value) -> bool {
        &self.value == other
    }
}

/// Error sentinel stored in place of a cell that failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowValueError {
    pub attr: String,
    pub message: String,
}

impl From<ValueExtractionError> for RowValueError {
    fn from(err: ValueExtractionError) -> Self {
        Self {
            message: err.to_string(),
            attr: err.attr,
        }
    }
}

impl fmt::Display for RowValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Value(RowValue),
    Error(RowValueError),
}

impl Cell {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Cell::Value(v) => Some(&v.value),
            Cell::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Cell::Error(_))
    }

    pub fn column(&self) -> Option<Arc<Column>> {
        match self {
            Cell::Value(v) => v.column(),
            Cell::Error(_) => None,
        }
    }

    /// Widget-rendered text; an error cell renders its message.
    pub fn render_text(&self) -> String {
        match self {
            Cell::Value(v) => v.render_text(),
            Cell::Error(err) => err.to_string(),
        }
    }

    pub fn render_spreadsheet(&self) -> SpreadsheetCell {
        match self {
            Cell::Value(v) => v.render_spreadsheet(),
            Cell::Error(err) => SpreadsheetCell::Text(err.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Value(v) => write!(f, "{}", v),
            Cell::Error(err) => write!(f, "{}", err),
        }
    }
}

/// Ordered column-name to cell mapping, plus the record it came from.
///
/// The source record is kept for grouping and ordering by fields outside
/// the column set. It is not serialized with the row; the cache stores a
/// snapshot of it alongside.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasourceRow {
    cells: Vec<(String, Cell)>,
    #[serde(skip)]
    original: Option<Arc<dyn Record>>,
}

impl DatasourceRow {
    pub fn new(original: Option<Arc<dyn Record>>) -> Self {
        Self {
            cells: Vec::new(),
            original,
        }
    }

    pub fn push(&mut self, name: impl Into<String>, cell: Cell) {
        self.cells.push((name.into(), cell));
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.cells.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(n, _)| n.as_str())
    }

    pub fn cells(&self) -> &[(String, Cell)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn original(&self) -> Option<&Arc<dyn Record>> {
        self.original.as_ref()
    }

    pub fn set_original(&mut self, original: Option<Arc<dyn Record>>) {
        self.original = original;
    }

    /// Raw values in cell order; error cells read as `Null`.
    pub fn raw_values(&self) -> Vec<Value> {
        self.cells
            .iter()
            .map(|(_, cell)| cell.value().cloned().unwrap_or_default())
            .collect()
    }

    /// The cells named in `names`, in that order. Unknown names are skipped.
    pub fn project(&self, names: &[String]) -> DatasourceRow {
        let cells = names
            .iter()
            .filter_map(|name| self.get(name).map(|cell| (name.clone(), cell.clone())))
            .collect();
        DatasourceRow {
            cells,
            original: self.original.clone(),
        }
    }

    /// Re-attach column links after deserialization.
    pub fn bind_columns(&mut self, columns: &[Arc<Column>]) {
        for (name, cell) in &mut self.cells {
            if let Cell::Value(value) = cell
                && let Some(column) = columns.iter().find(|c| c.name() == name)
            {
                value.bind(column);
            }
        }
    }
}

impl PartialEq for DatasourceRow {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl PartialEq<[Value]> for DatasourceRow {
    fn eq(&self, other: &[Value]) -> bool {
        self.cells.len() == other.len()
            && self
                .cells
                .iter()
                .zip(other)
                .all(|((_, cell), value)| cell.value() == Some(value))
    }
}
