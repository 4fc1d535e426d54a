use crate::error::Result;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use reportkit_engine::{RenderContext, Renderer, SpreadsheetCell};
use rust_xlsxwriter::{ExcelDateTime, Format, FormatAlign, Workbook, Worksheet};

const SHEET_NAME: &str = "Report";

/// Excel workbook with one `Report` sheet.
///
/// Column 0 holds the 1-based row number; every report column gets the
/// number format of its column type and dates are written as real dates.
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxRenderer;

impl XlsxRenderer {
    fn render_xlsx(&self, ctx: &RenderContext<'_>) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        let heading = Format::new().set_bold().set_align(FormatAlign::Center);
        worksheet.write_string_with_format(0, 0, "#", &heading)?;
        for (idx, header) in ctx.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, column_index(idx), header, &heading)?;
        }

        let formats: Vec<Format> = ctx
            .columns
            .iter()
            .map(|column| Format::new().set_num_format(column.column_type().number_format()))
            .collect();

        for (idx, row) in ctx.body.rows().into_iter().enumerate() {
            let row_num = (idx + 1) as u32;
            worksheet.write_number(row_num, 0, (idx + 1) as f64)?;
            for (col, (name, format)) in ctx.display_order.iter().zip(&formats).enumerate() {
                let Some(cell) = row.get(name) else {
                    continue;
                };
                write_cell(
                    worksheet,
                    row_num,
                    column_index(col),
                    cell.render_spreadsheet(),
                    format,
                )?;
            }
        }

        Ok(workbook.save_to_buffer()?)
    }
}

fn column_index(idx: usize) -> u16 {
    (idx + 1) as u16
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: SpreadsheetCell,
    format: &Format,
) -> Result<()> {
    match cell {
        SpreadsheetCell::Empty => {}
        SpreadsheetCell::Number(n) => {
            worksheet.write_number_with_format(row, col, n, format)?;
        }
        SpreadsheetCell::Bool(b) => {
            worksheet.write_boolean_with_format(row, col, b, format)?;
        }
        SpreadsheetCell::Text(text) => {
            worksheet.write_string_with_format(row, col, &text, format)?;
        }
        SpreadsheetCell::Date(date) => {
            worksheet.write_datetime_with_format(row, col, &excel_date(date)?, format)?;
        }
        SpreadsheetCell::DateTime(dt) => {
            let value = excel_date(dt.date())?.and_hms(
                dt.hour() as u16,
                dt.minute() as u8,
                dt.second() as f64,
            )?;
            worksheet.write_datetime_with_format(row, col, &value, format)?;
        }
        SpreadsheetCell::Time(time) => {
            worksheet.write_datetime_with_format(row, col, &excel_time(time)?, format)?;
        }
    }
    Ok(())
}

fn excel_date(date: NaiveDate) -> Result<ExcelDateTime> {
    Ok(ExcelDateTime::from_ymd(
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
    )?)
}

fn excel_time(time: NaiveTime) -> Result<ExcelDateTime> {
    Ok(ExcelDateTime::from_hms(
        time.hour() as u16,
        time.minute() as u8,
        time.second() as f64,
    )?)
}

impl Renderer for XlsxRenderer {
    fn content_type(&self) -> &'static str {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    }

    fn file_extension(&self) -> &'static str {
        "xlsx"
    }

    fn render(&self, context: &RenderContext<'_>) -> reportkit_engine::Result<Vec<u8>> {
        Ok(self.render_xlsx(context)?)
    }
}
