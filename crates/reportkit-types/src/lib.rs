pub mod error;
pub mod path;
pub mod record;
pub mod schema;
mod util;
pub mod value;

pub use error::{Error, Result};
pub use path::{Resolved, format_template, resolve_path, resolve_value, split_path};
pub use record::{Attr, Computed, Entity, EntitySnapshot, Record, computed};
pub use schema::{CollectionId, FieldDef, FieldKind, Schema};
pub use util::*;
pub use value::Value;
