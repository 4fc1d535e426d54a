//! Report engine.
//!
//! A `Datasource` turns the records of one collection into typed
//! `DatasourceRow`s through its `Column`s, consulting a cache manager so a
//! result is recomputed only after one of the collections it reads changes.
//! A `Report` is the presentation policy on top: display order, grouping,
//! totals and output formats.

pub mod columns;
pub mod datasource;
pub mod error;
pub mod filtering;
pub mod grouper;
pub mod render;
pub mod report;
pub mod row;
pub mod widgets;

pub use columns::{Column, ColumnSpec, ColumnType, Source, column_for_attribute};
pub use datasource::{Datasource, DatasourceAttr, DatasourceOptions};
pub use error::{ConfigurationError, Error, Result, ValueExtractionError};
pub use filtering::{FilterForm, FilterSpec, FormOptions, Submission, Submitted, Translated};
pub use grouper::{Group, Grouper};
pub use render::{RenderBody, RenderContext, RenderGroup, Renderer};
pub use report::{GroupBy, GroupKey, Report, ReportOptions, column_total, format_total};
pub use row::{Cell, DatasourceRow, RowValue, RowValueError};
pub use widgets::{SpreadsheetCell, Widget};
