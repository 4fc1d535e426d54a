use std::fmt;

/// Result type for reportkit-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Report engine error
    Engine(reportkit_engine::Error),

    /// Storage backend error
    Store(reportkit_store::Error),

    /// Cache store error
    Cache(reportkit_cache::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// No report registered under this name
    UnknownReport(String),

    /// No collection declared under this id
    UnknownCollection(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Engine(err) => write!(f, "Report error: {}", err),
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::Cache(err) => write!(f, "Cache error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::UnknownReport(name) => write!(f, "Unknown report: {}", name),
            Error::UnknownCollection(id) => write!(f, "Unknown collection: {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Engine(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Cache(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Config(_) | Error::UnknownReport(_) | Error::UnknownCollection(_) => None,
        }
    }
}

impl From<reportkit_engine::Error> for Error {
    fn from(err: reportkit_engine::Error) -> Self {
        Error::Engine(err)
    }
}

impl From<reportkit_store::Error> for Error {
    fn from(err: reportkit_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<reportkit_cache::Error> for Error {
    fn from(err: reportkit_cache::Error) -> Self {
        Error::Cache(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
