//! Error types for blob sources

use std::fmt;

#[derive(Debug)]
pub enum SourceError {
    /// No row matches the requested key
    NotFound(String),
    /// The backing store could not be reached; safe to retry
    Unavailable(String),
    /// Transport-level failure
    Http(Box<reqwest::Error>),
    /// The named column is not part of the source schema
    MissingColumn(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotFound(key) => write!(f, "No row with key: {}", key),
            SourceError::Unavailable(msg) => write!(f, "Source unavailable: {}", msg),
            SourceError::Http(err) => write!(f, "HTTP error: {}", err),
            SourceError::MissingColumn(name) => write!(f, "No such column: {}", name),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            SourceError::Unavailable(err.to_string())
        } else {
            SourceError::Http(Box::new(err))
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
