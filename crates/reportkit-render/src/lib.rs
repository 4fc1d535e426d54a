//! Output formats for reportkit reports.
//!
//! Every renderer consumes the `RenderContext` a `Report` builds and returns
//! the encoded document.

mod delimited;
pub mod error;
mod filters;
mod html;
mod xlsx;

pub use delimited::CsvRenderer;
pub use error::{Error, Result};
pub use filters::humanize_filters;
pub use html::HtmlRenderer;
pub use xlsx::XlsxRenderer;

use reportkit_engine::Renderer;
use std::sync::Arc;

/// The `(label, renderer)` list every report offers by default.
pub fn standard_formats() -> Vec<(String, Arc<dyn Renderer>)> {
    vec![
        ("html".to_string(), Arc::new(HtmlRenderer::new()) as Arc<dyn Renderer>),
        ("csv".to_string(), Arc::new(CsvRenderer) as Arc<dyn Renderer>),
        ("xlsx".to_string(), Arc::new(XlsxRenderer) as Arc<dyn Renderer>),
    ]
}
