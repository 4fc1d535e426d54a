use crate::error::Result;
use reportkit_engine::{RenderContext, Renderer};

/// Spreadsheet-as-text: a `#` column, the headers, then widget-rendered rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvRenderer;

impl CsvRenderer {
    fn render_csv(&self, ctx: &RenderContext<'_>) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["#".to_string()];
        header.extend(ctx.headers.iter().cloned());
        writer.write_record(&header)?;

        for (idx, row) in ctx.body.rows().into_iter().enumerate() {
            let mut record = vec![(idx + 1).to_string()];
            record.extend(ctx.display_order.iter().map(|name| {
                row.get(name)
                    .map(|cell| cell.render_text())
                    .unwrap_or_default()
            }));
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|err| crate::error::Error::Csv(err.into_error().into()))
    }
}

impl Renderer for CsvRenderer {
    fn content_type(&self) -> &'static str {
        "text/csv; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }

    fn render(&self, context: &RenderContext<'_>) -> reportkit_engine::Result<Vec<u8>> {
        Ok(self.render_csv(context)?)
    }
}
