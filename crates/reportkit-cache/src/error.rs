use std::fmt;

/// Result type for reportkit-cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised by cache stores
#[derive(Debug)]
pub enum Error {
    /// `incr` on a key that holds nothing
    Missing(String),

    /// `incr` on a key that holds something other than an integer
    NotNumeric(String),

    /// The SQLite-backed store failed
    Database(rusqlite::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Missing(key) => write!(f, "Key '{}' not found", key),
            Error::NotNumeric(key) => write!(f, "Key '{}' does not hold an integer", key),
            Error::Database(err) => write!(f, "Cache database error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Missing(_) | Error::NotNumeric(_) => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}
