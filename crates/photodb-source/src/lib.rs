//! Photo row store access
//!
//! Defines the `BlobSource` seam between a photo session and the remote
//! store that holds its rows, with an HTTP client implementation and an
//! in-memory implementation for tests and embedding.

pub mod error;
pub mod http;
pub mod memory;
pub mod source;
pub mod types;

pub use error::{Result, SourceError};
pub use http::HttpRowSource;
pub use memory::MemoryRowSource;
pub use source::BlobSource;
pub use types::{
    collect_stream, image_column, thumbnail_column, ByteStream, ColumnKind, ColumnSpec, PhotoRow,
    RowData,
};
