//! Error types for photo retrieval

use photodb_cache::CacheError;
use photodb_source::SourceError;
use std::fmt;

#[derive(Debug)]
pub enum RetrievalError {
    Source(SourceError),
    Cache(CacheError),
    Decode(Box<image::ImageError>),
    /// The source schema has no binary column for full-size images
    NoImageColumn,
    /// The source schema has no binary column naming a thumbnail
    NoThumbnailColumn,
    /// Bulk retrieval aborted; the index names the row that failed
    BulkRow(usize, Box<RetrievalError>),
}

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalError::Source(err) => write!(f, "Source error: {}", err),
            RetrievalError::Cache(err) => write!(f, "Cache error: {}", err),
            RetrievalError::Decode(err) => write!(f, "Decode error: {}", err),
            RetrievalError::NoImageColumn => write!(f, "Schema has no image column"),
            RetrievalError::NoThumbnailColumn => write!(f, "Schema has no thumbnail column"),
            RetrievalError::BulkRow(index, err) => {
                write!(f, "Bulk retrieval failed at row {}: {}", index, err)
            }
        }
    }
}

impl std::error::Error for RetrievalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetrievalError::Source(err) => Some(err),
            RetrievalError::Cache(err) => Some(err),
            RetrievalError::Decode(err) => Some(err.as_ref()),
            RetrievalError::BulkRow(_, err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<SourceError> for RetrievalError {
    fn from(err: SourceError) -> Self {
        RetrievalError::Source(err)
    }
}

impl From<CacheError> for RetrievalError {
    fn from(err: CacheError) -> Self {
        RetrievalError::Cache(err)
    }
}

impl From<image::ImageError> for RetrievalError {
    fn from(err: image::ImageError) -> Self {
        RetrievalError::Decode(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
