use std::fmt;

/// Result type for reportkit-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the query layer
#[derive(Debug)]
pub enum Error {
    /// SQLite operation failed
    Database(rusqlite::Error),

    /// A filter or ordering path does not name a field
    UnknownField { collection: String, path: String },

    /// The backend has no table for this collection
    UnknownCollection(String),

    /// A lookup was given a value it cannot use (e.g. `range` without two bounds)
    InvalidLookup { key: String, reason: String },

    /// Anything else the query layer rejects
    Query(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "Database error: {}", err),
            Error::UnknownField { collection, path } => {
                write!(f, "Cannot resolve keyword '{}' into field of {}", path, collection)
            }
            Error::UnknownCollection(name) => write!(f, "Unknown collection: {}", name),
            Error::InvalidLookup { key, reason } => {
                write!(f, "Invalid lookup '{}': {}", key, reason)
            }
            Error::Query(msg) => write!(f, "Query error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}

impl From<reportkit_types::Error> for Error {
    fn from(err: reportkit_types::Error) -> Self {
        match err {
            reportkit_types::Error::UnknownField { collection, path } => {
                Error::UnknownField { collection, path }
            }
            other => Error::Query(other.to_string()),
        }
    }
}
