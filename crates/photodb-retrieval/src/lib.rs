//! Cached photo retrieval
//!
//! Ties a [`BlobSource`](photodb_source::BlobSource) to the session-scoped
//! disk cache: lazy single-photo retrieval backed by a background writer,
//! eager bulk materialization, and stateless thumbnail listing.

pub mod codec;
pub mod config;
pub mod error;
pub mod session;
pub mod thumbs;

pub use codec::{Codec, ImageCodec, PixelBuffer};
pub use config::SessionConfig;
pub use error::{Result, RetrievalError};
pub use session::{BulkPhoto, PhotoSession};
pub use thumbs::ThumbnailLister;
