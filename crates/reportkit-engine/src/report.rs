use crate::columns::Column;
use crate::datasource::{Datasource, DatasourceOptions};
use crate::error::{ConfigurationError, Result};
use crate::grouper::{Group, Grouper};
use crate::render::{RenderBody, RenderContext, RenderGroup, Renderer};
use crate::row::{Cell, DatasourceRow};
use crate::widgets::currency_format;
use reportkit_types::{Record, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

pub type GroupFn = Arc<dyn Fn(&dyn Record) -> Value + Send + Sync>;

/// What a row is grouped by.
#[derive(Clone)]
pub enum GroupKey {
    /// A column name; falls back to a raw record attribute of that name.
    Column(String),
    Callable(GroupFn),
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Column(name) => f.debug_tuple("Column").field(name).finish(),
            GroupKey::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

/// Group selector plus the record attribute that orders rows inside a group.
#[derive(Debug, Clone)]
pub struct GroupBy {
    pub key: GroupKey,
    pub order: String,
}

impl GroupBy {
    pub fn column(name: impl Into<String>, order: impl Into<String>) -> Self {
        Self {
            key: GroupKey::Column(name.into()),
            order: order.into(),
        }
    }

    pub fn callable<F>(func: F, order: impl Into<String>) -> Self
    where
        F: Fn(&dyn Record) -> Value + Send + Sync + 'static,
    {
        Self {
            key: GroupKey::Callable(Arc::new(func)),
            order: order.into(),
        }
    }
}

/// Report construction options.
///
/// Either `datasource` (cloned, so the prototype stays untouched) or
/// `datasource_options` must be given.
#[derive(Default)]
pub struct ReportOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub datasource: Option<Datasource>,
    pub datasource_options: Option<DatasourceOptions>,
    /// Replaces the datasource extras when set.
    pub extras: Option<BTreeMap<String, Value>>,
    pub list_display: Option<Vec<String>>,
    pub list_filter: Vec<String>,
    pub order_by: Option<Vec<String>>,
    pub group_by: Option<GroupBy>,
    pub column_totals: Vec<String>,
    pub formats: Vec<(String, Arc<dyn Renderer>)>,
    pub filters_summary: Vec<(String, String)>,
}

/// Presentation policy over one datasource.
pub struct Report {
    title: String,
    description: Option<String>,
    datasource: Datasource,
    list_display: Option<Vec<String>>,
    list_filter: Vec<String>,
    order_by: Option<Vec<String>>,
    group_by: Option<GroupBy>,
    column_totals: Vec<String>,
    formats: Vec<(String, Arc<dyn Renderer>)>,
    filters_summary: Vec<(String, String)>,
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Report: on `{}`>", self.datasource.collection().name())
    }
}

impl Report {
    pub fn as_report(options: ReportOptions) -> Result<Self> {
        let mut datasource = match (options.datasource, options.datasource_options) {
            (Some(prototype), _) => prototype.clone_with(options.extras),
            (None, Some(mut ds_options)) => {
                if let Some(extras) = options.extras {
                    ds_options.extras = extras;
                }
                Datasource::as_datasource(ds_options)?
            }
            (None, None) => return Err(ConfigurationError::MissingCollection.into()),
        };
        if options.order_by.is_some() {
            datasource.set_order_by(options.order_by.clone());
        }

        if let Some(missing) = options
            .list_display
            .iter()
            .flatten()
            .chain(options.column_totals.iter())
            .find(|name| datasource.column(name.as_str()).is_none())
        {
            return Err(ConfigurationError::UnknownColumn(missing.clone()).into());
        }

        Ok(Self {
            title: options
                .title
                .unwrap_or_else(|| datasource.collection().to_string()),
            description: options.description,
            datasource,
            list_display: options.list_display,
            list_filter: options.list_filter,
            order_by: options.order_by,
            group_by: options.group_by,
            column_totals: options.column_totals,
            formats: options.formats,
            filters_summary: options.filters_summary,
        })
    }

    /// Options reproducing this report over a fresh copy of its datasource.
    pub fn to_options(&self) -> ReportOptions {
        ReportOptions {
            title: Some(self.title.clone()),
            description: self.description.clone(),
            datasource: Some(self.datasource.clone_with(None)),
            datasource_options: None,
            extras: None,
            list_display: self.list_display.clone(),
            list_filter: self.list_filter.clone(),
            order_by: self.order_by.clone(),
            group_by: self.group_by.clone(),
            column_totals: self.column_totals.clone(),
            formats: self.formats.clone(),
            filters_summary: self.filters_summary.clone(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn datasource(&self) -> &Datasource {
        &self.datasource
    }

    pub fn list_filter(&self) -> &[String] {
        &self.list_filter
    }

    pub fn group_by(&self) -> Option<&GroupBy> {
        self.group_by.as_ref()
    }

    pub fn order_by(&self) -> Option<&[String]> {
        self.order_by.as_deref()
    }

    pub fn filters_summary(&self) -> &[(String, String)] {
        &self.filters_summary
    }

    /// Explicit display list, else every non-system column in datasource order.
    pub fn display_order(&self) -> Vec<String> {
        match &self.list_display {
            Some(names) => names.clone(),
            None => self
                .datasource
                .columns()
                .iter()
                .filter(|c| !c.is_sys_only())
                .map(|c| c.name().to_string())
                .collect(),
        }
    }

    /// Titles matching `display_order`.
    pub fn headers(&self) -> Vec<String> {
        self.display_order()
            .iter()
            .filter_map(|name| self.datasource.column(name))
            .map(|c| c.title())
            .collect()
    }

    pub fn get_column_by_name(&self, name: &str) -> Result<&Arc<Column>> {
        self.datasource
            .column(name)
            .ok_or_else(|| ConfigurationError::UnknownColumn(name.to_string()).into())
    }

    /// Raw values of one column across all rows; error cells read as `Null`.
    pub fn get_column_values(&self, name: &str) -> Result<Vec<Value>> {
        self.get_column_by_name(name)?;
        Ok(self
            .datasource
            .get_data()?
            .iter()
            .map(|row| row.get(name).and_then(Cell::value).cloned().unwrap_or_default())
            .collect())
    }

    /// Rows in display order; grouped reports yield group by group.
    pub fn rows(&self) -> Result<Vec<DatasourceRow>> {
        if self.group_by.is_some() {
            return Ok(self
                .get_groups()?
                .into_iter()
                .flat_map(|g| g.rows)
                .collect());
        }
        let order = self.display_order();
        Ok(self
            .datasource
            .get_data()?
            .iter()
            .map(|row| row.project(&order))
            .collect())
    }

    pub fn get(&self, index: usize) -> Result<Option<DatasourceRow>> {
        let order = self.display_order();
        Ok(self.datasource.get(index)?.map(|row| row.project(&order)))
    }

    pub fn slice(&self, range: Range<usize>) -> Result<Vec<DatasourceRow>> {
        let order = self.display_order();
        Ok(self
            .datasource
            .slice(range)?
            .iter()
            .map(|row| row.project(&order))
            .collect())
    }

    pub fn grouper(&self) -> Result<Grouper<'_>> {
        let group_by = self
            .group_by
            .as_ref()
            .ok_or(ConfigurationError::GroupingNotSet)?;
        Ok(Grouper::new(self, group_by))
    }

    pub fn get_groups(&self) -> Result<Vec<Group>> {
        Ok(self.grouper()?.items()?.to_vec())
    }

    pub fn has_subtotals(&self) -> bool {
        !self.column_totals.is_empty()
    }

    /// Column totals that are part of the display order.
    pub fn summary_fields(&self) -> Vec<String> {
        let order = self.display_order();
        self.column_totals
            .iter()
            .filter(|name| order.contains(name))
            .cloned()
            .collect()
    }

    /// Totals of the summary fields over every row.
    pub fn totals(&self) -> Result<Vec<(String, Value)>> {
        let rows = self.datasource.get_data()?;
        Ok(self
            .summary_fields()
            .into_iter()
            .map(|name| {
                let total = column_total(&name, rows);
                (name, total)
            })
            .collect())
    }

    pub fn subtotals(&self, rows: &[DatasourceRow]) -> Vec<(String, Value)> {
        self.summary_fields()
            .into_iter()
            .map(|name| {
                let total = column_total(&name, rows);
                (name, total)
            })
            .collect()
    }

    pub fn format_labels(&self) -> Vec<&str> {
        self.formats.iter().map(|(label, _)| label.as_str()).collect()
    }

    pub fn renderer_for(&self, label: &str) -> Result<Arc<dyn Renderer>> {
        self.formats
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, renderer)| renderer.clone())
            .ok_or_else(|| ConfigurationError::UnknownFormat(label.to_string()).into())
    }

    pub fn render_context(&self) -> Result<RenderContext<'_>> {
        let display_order = self.display_order();
        let columns = display_order
            .iter()
            .map(|name| self.get_column_by_name(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        let body = match &self.group_by {
            Some(_) => RenderBody::Grouped(
                self.get_groups()?
                    .into_iter()
                    .map(|group| RenderGroup {
                        subtotals: self.subtotals(&group.rows),
                        key: group.key,
                        rows: group.rows,
                    })
                    .collect(),
            ),
            None => RenderBody::Flat(self.rows()?),
        };
        Ok(RenderContext {
            report: self,
            title: self.title.clone(),
            description: self.description.clone(),
            headers: self.headers(),
            display_order,
            columns,
            body,
            summary_fields: self.summary_fields(),
            totals: self.totals()?,
            filters_summary: self.filters_summary.clone(),
        })
    }

    pub fn render(&self, label: &str) -> Result<Vec<u8>> {
        let renderer = self.renderer_for(label)?;
        renderer.render(&self.render_context()?)
    }
}

/// Sum of a column's values; anything non-summable makes the total 0.
pub fn column_total<'r>(name: &str, rows: impl IntoIterator<Item = &'r DatasourceRow>) -> Value {
    let mut total = Value::Int(0);
    for row in rows {
        let value = match row.get(name) {
            Some(Cell::Value(v)) if v.value.is_truthy() => v.value.clone(),
            Some(Cell::Error(_)) => return Value::Int(0),
            _ => Value::Int(0),
        };
        match total.checked_add(&value) {
            Some(sum) if sum.is_numeric() => total = sum,
            _ => return Value::Int(0),
        }
    }
    total
}

/// Totals print decimals as currency and everything else as-is.
pub fn format_total(value: &Value) -> String {
    match value {
        Value::Decimal(d) => currency_format(*d),
        other => other.to_string(),
    }
}
