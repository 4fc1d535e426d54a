//! Queryable collections.
//!
//! A `Query` is a filtered, ordered selection over one collection. Backends
//! execute it and hand back `Entity` records with their relations joined.
//! Mutations go through the backend so that change hooks registered on its
//! `Signals` see every create, update and delete.

mod backend;
pub mod error;
mod lookup;
mod memory;
mod query;
mod signals;
mod sqlite;

pub use backend::{Backend, QuerySet};
pub use error::{Error, Result};
pub use lookup::Lookup;
pub use memory::MemoryBackend;
pub use query::{Condition, Predicate, Query, parse_ordering};
pub use signals::{ChangeEvent, ChangeKind, Hook, Signals};
pub use sqlite::SqliteBackend;
