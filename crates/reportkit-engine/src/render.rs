use crate::columns::Column;
use crate::error::Result;
use crate::report::Report;
use crate::row::DatasourceRow;
use reportkit_types::Value;
use std::sync::Arc;

/// Output backend for a report.
pub trait Renderer: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;

    fn render(&self, context: &RenderContext<'_>) -> Result<Vec<u8>>;
}

/// One group as handed to renderers, with its subtotals.
#[derive(Debug, Clone)]
pub struct RenderGroup {
    pub key: Value,
    pub rows: Vec<DatasourceRow>,
    pub subtotals: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub enum RenderBody {
    Flat(Vec<DatasourceRow>),
    Grouped(Vec<RenderGroup>),
}

impl RenderBody {
    /// All rows in output order, groups flattened.
    pub fn rows(&self) -> Vec<&DatasourceRow> {
        match self {
            RenderBody::Flat(rows) => rows.iter().collect(),
            RenderBody::Grouped(groups) => groups.iter().flat_map(|g| g.rows.iter()).collect(),
        }
    }
}

/// Everything a renderer needs, computed once by the report.
pub struct RenderContext<'a> {
    pub report: &'a Report,
    pub title: String,
    pub description: Option<String>,
    pub headers: Vec<String>,
    pub display_order: Vec<String>,
    /// Columns in display order.
    pub columns: Vec<Arc<Column>>,
    pub body: RenderBody,
    /// Column totals restricted to the display order.
    pub summary_fields: Vec<String>,
    pub totals: Vec<(String, Value)>,
    pub filters_summary: Vec<(String, String)>,
}

impl RenderContext<'_> {
    pub fn total_columns_num(&self) -> usize {
        self.headers.len()
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self.body, RenderBody::Grouped(_))
    }
}
