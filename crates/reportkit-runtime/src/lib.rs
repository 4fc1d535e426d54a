//! Workspace wiring for reportkit.
//!
//! Loads `reportkit.toml`, builds the declared collections and reports,
//! and opens the SQLite backend and cache store they run against.

pub mod config;
pub mod definition;
pub mod error;
pub mod registry;
pub mod runtime;

pub use config::{CacheBackend, CacheConfig, Config, resolve_workspace_path};
pub use definition::{
    AttrColumn, CalcColumn, Catalog, CollectionConfig, ColumnConfig, FieldConfig,
    ReportDefinition, TemplateColumn,
};
pub use error::{Error, Result};
pub use registry::{ReportFactory, ReportRegistry};
pub use runtime::Runtime;
