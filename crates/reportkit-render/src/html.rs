use crate::error::Result;
use minijinja::{Environment, context};
use reportkit_engine::{DatasourceRow, RenderBody, RenderContext, Renderer, format_total};
use reportkit_types::Value;
use serde::Serialize;

const REPORT_TEMPLATE: &str = include_str!("../templates/report.html");
const GROUPED_TEMPLATE: &str = include_str!("../templates/grouped.html");

#[derive(Debug, Serialize)]
struct HtmlCell {
    text: String,
    css: String,
    error: bool,
}

#[derive(Debug, Serialize)]
struct HtmlGroup {
    key: String,
    rows: Vec<Vec<HtmlCell>>,
    subtotals: Vec<Option<String>>,
}

/// Renders a report as an HTML table; grouped reports get one header row per group.
pub struct HtmlRenderer {
    env: Environment<'static>,
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_loader(|name| {
            Ok(match name {
                "report.html" => Some(REPORT_TEMPLATE.to_string()),
                "grouped.html" => Some(GROUPED_TEMPLATE.to_string()),
                _ => None,
            })
        });
        Self { env }
    }

    fn render_html(&self, ctx: &RenderContext<'_>) -> Result<String> {
        let totals = if !ctx.totals.is_empty() {
            aligned(&ctx.display_order, &ctx.totals)
        } else {
            Vec::new()
        };

        let html = match &ctx.body {
            RenderBody::Flat(rows) => {
                let rows: Vec<Vec<HtmlCell>> = rows.iter().map(|row| cells(row, ctx)).collect();
                self.env.get_template("report.html")?.render(context! {
                    title => &ctx.title,
                    description => &ctx.description,
                    filters => &ctx.filters_summary,
                    headers => &ctx.headers,
                    rows => rows,
                    totals => totals,
                })?
            }
            RenderBody::Grouped(groups) => {
                let groups: Vec<HtmlGroup> = groups
                    .iter()
                    .map(|group| HtmlGroup {
                        key: group.key.to_string(),
                        rows: group.rows.iter().map(|row| cells(row, ctx)).collect(),
                        subtotals: if group.subtotals.is_empty() {
                            Vec::new()
                        } else {
                            aligned(&ctx.display_order, &group.subtotals)
                        },
                    })
                    .collect();
                self.env.get_template("grouped.html")?.render(context! {
                    title => &ctx.title,
                    description => &ctx.description,
                    filters => &ctx.filters_summary,
                    headers => &ctx.headers,
                    columns => ctx.total_columns_num(),
                    groups => groups,
                    totals => totals,
                })?
            }
        };
        Ok(html)
    }
}

fn cells(row: &DatasourceRow, ctx: &RenderContext<'_>) -> Vec<HtmlCell> {
    ctx.display_order
        .iter()
        .zip(&ctx.columns)
        .map(|(name, column)| match row.get(name) {
            Some(cell) => HtmlCell {
                text: cell.render_text(),
                css: column.column_type().css_class(),
                error: cell.is_error(),
            },
            None => HtmlCell {
                text: String::new(),
                css: column.column_type().css_class(),
                error: false,
            },
        })
        .collect()
}

/// One slot per displayed column, filled where a total exists.
fn aligned(display_order: &[String], totals: &[(String, Value)]) -> Vec<Option<String>> {
    display_order
        .iter()
        .map(|name| {
            totals
                .iter()
                .find(|(total_name, _)| total_name == name)
                .map(|(_, value)| format_total(value))
        })
        .collect()
}

impl Renderer for HtmlRenderer {
    fn content_type(&self) -> &'static str {
        "text/html; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "html"
    }

    fn render(&self, context: &RenderContext<'_>) -> reportkit_engine::Result<Vec<u8>> {
        Ok(self.render_html(context)?.into_bytes())
    }
}
