use std::fmt;

/// Result type for reportkit-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised while walking record attributes and schemas
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A path segment is absent, or traversal hit a null relation
    NotFound(String),

    /// A computed attribute failed while being evaluated
    Call { path: String, cause: String },

    /// A field path does not exist on a schema
    UnknownField { collection: String, path: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(path) => write!(f, "attribute not found: {}", path),
            Error::Call { path, cause } => write!(f, "{}: {}", path, cause),
            Error::UnknownField { collection, path } => {
                write!(f, "{} has no field named '{}'", collection, path)
            }
        }
    }
}

impl std::error::Error for Error {}
