//! The blob source seam
//!
//! A `BlobSource` is the remote (or in-memory) table of photo rows that a
//! session retrieves from. It is a collaborator, not part of the cache: the
//! cache layer only ever sees keys, filenames, properties and byte streams.

use crate::error::Result;
use crate::types::{ByteStream, ColumnSpec, PhotoRow, RowData};
use async_trait::async_trait;

/// Row and blob provider backing a photo session.
///
/// Binary streams are independently re-fetchable: every call to
/// [`open_binary`](Self::open_binary) yields a fresh stream over the same
/// bytes, so one consumer can decode while another persists without sharing
/// a stream.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Column schema of the backing table, in table order.
    fn columns(&self) -> &[ColumnSpec];

    /// Fetch the row whose unique-key column matches `key`.
    ///
    /// Returns [`SourceError::NotFound`](crate::SourceError::NotFound) if no
    /// row matches.
    async fn fetch_by_key(&self, key: &str) -> Result<PhotoRow>;

    /// All rows, in insertion order.
    async fn fetch_all_rows(&self) -> Result<Vec<PhotoRow>>;

    /// Open a fresh stream over one binary column of one row.
    async fn open_binary(&self, key: &str, column: &str) -> Result<ByteStream>;

    /// Insert a prepared row.
    async fn insert_row(&self, row: RowData) -> Result<()>;
}
