use std::fmt;

/// Result type for reportkit-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed datasource or report construction.
///
/// Fatal to the construction call; never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// An option key that no datasource or report knows
    UnknownOption(String),

    /// Neither a queryset nor a schema was supplied
    MissingCollection,

    /// A schema was supplied without a backend to query it
    MissingBackend,

    /// Caching was requested without a cache manager
    MissingCacheManager,

    /// A display, total or group name that is not a column
    UnknownColumn(String),

    /// A column whose name is empty after normalization, or a duplicate
    InvalidColumn(String),

    /// Group access on a report without a grouping spec
    GroupingNotSet,

    /// A render format label the report does not offer
    UnknownFormat(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::UnknownOption(key) => {
                write!(f, "received an invalid option {:?}", key)
            }
            ConfigurationError::MissingCollection => {
                write!(f, "missing a datasource: define a schema or a queryset")
            }
            ConfigurationError::MissingBackend => {
                write!(f, "a schema was given without a backend to query it")
            }
            ConfigurationError::MissingCacheManager => {
                write!(f, "use_cache is set but no cache manager was given")
            }
            ConfigurationError::UnknownColumn(name) => write!(f, "unknown column {:?}", name),
            ConfigurationError::InvalidColumn(reason) => write!(f, "invalid column: {}", reason),
            ConfigurationError::GroupingNotSet => {
                write!(f, "cannot group rows without a group_by setting")
            }
            ConfigurationError::UnknownFormat(label) => {
                write!(f, "unknown render format {:?}", label)
            }
        }
    }
}

/// A single cell that failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueExtractionError {
    pub attr: String,
    pub cause: String,
}

impl ValueExtractionError {
    pub fn new(attr: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            cause: cause.into(),
        }
    }
}

impl fmt::Display for ValueExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unable to get value from `{}`: {}", self.attr, self.cause)
    }
}

impl std::error::Error for ValueExtractionError {}

/// Error types raised by the report engine
#[derive(Debug)]
pub enum Error {
    Configuration(ConfigurationError),

    Extraction(ValueExtractionError),

    /// Returned by record and row filters to drop a record silently
    RecordFiltered,

    /// Returned by record and row filters to drop a record with a warning
    InvalidRecord(String),

    Store(reportkit_store::Error),

    Cache(reportkit_cache::Error),

    /// A cached payload could not be encoded
    Serialization(serde_json::Error),

    Render(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(err) => write!(f, "Configuration error: {}", err),
            Error::Extraction(err) => write!(f, "{}", err),
            Error::RecordFiltered => write!(f, "Record filtered"),
            Error::InvalidRecord(reason) => write!(f, "Invalid record: {}", reason),
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::Cache(err) => write!(f, "Cache error: {}", err),
            Error::Serialization(err) => write!(f, "Serialization error: {}", err),
            Error::Render(msg) => write!(f, "Render error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Extraction(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Cache(err) => Some(err),
            Error::Serialization(err) => Some(err),
            Error::Configuration(_)
            | Error::RecordFiltered
            | Error::InvalidRecord(_)
            | Error::Render(_) => None,
        }
    }
}

impl From<ConfigurationError> for Error {
    fn from(err: ConfigurationError) -> Self {
        Error::Configuration(err)
    }
}

impl From<ValueExtractionError> for Error {
    fn from(err: ValueExtractionError) -> Self {
        Error::Extraction(err)
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

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}
