use std::fmt;

/// Result type for reportkit-render operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised while producing an output document
#[derive(Debug)]
pub enum Error {
    /// Template lookup or evaluation failed
    Template(minijinja::Error),

    /// CSV serialization failed
    Csv(csv::Error),

    /// Spreadsheet generation failed
    Xlsx(rust_xlsxwriter::XlsxError),

    /// The report could not produce its render context
    Engine(reportkit_engine::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Template(err) => write!(f, "Template error: {}", err),
            Error::Csv(err) => write!(f, "CSV error: {}", err),
            Error::Xlsx(err) => write!(f, "XLSX error: {}", err),
            Error::Engine(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Template(err) => Some(err),
            Error::Csv(err) => Some(err),
            Error::Xlsx(err) => Some(err),
            Error::Engine(err) => Some(err),
        }
    }
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Self {
        Error::Template(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err)
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Error::Xlsx(err)
    }
}

impl From<reportkit_engine::Error> for Error {
    fn from(err: reportkit_engine::Error) -> Self {
        Error::Engine(err)
    }
}

impl From<Error> for reportkit_engine::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Engine(inner) => inner,
            other => reportkit_engine::Error::Render(other.to_string()),
        }
    }
}
