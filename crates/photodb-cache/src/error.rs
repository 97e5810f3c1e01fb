//! Error types for the photo disk cache

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CacheError {
    Io(Box<std::io::Error>),
    /// A delete hit a file something still holds open. Kill-before-delete
    /// ordering prevents this by construction; seeing it is a bug signal.
    TeardownConflict(PathBuf, Box<std::io::Error>),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::TeardownConflict(path, err) => {
                write!(f, "Teardown conflict at {}: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::TeardownConflict(_, err) => Some(err.as_ref()),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
