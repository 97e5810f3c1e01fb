//! Row and column types shared by every blob source

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;

/// A chunked binary stream, the currency between sources, writers and decoders
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Kind of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Scalar column, stringified into row properties
    Value,
    /// Binary blob column (image or thumbnail payload)
    Binary,
}

/// One column of the backing table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn value(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Value,
        }
    }

    pub fn binary(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Binary,
        }
    }
}

/// One row of the photo table. Scalar columns arrive stringified in
/// `properties`; binary columns are opened separately via
/// [`BlobSource::open_binary`](crate::BlobSource::open_binary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRow {
    pub key: String,
    pub filename: String,
    pub properties: HashMap<String, String>,
}

/// A row prepared for insertion, binary payloads inline
#[derive(Debug, Clone)]
pub struct RowData {
    pub key: String,
    pub filename: String,
    pub properties: HashMap<String, String>,
    pub binaries: Vec<(String, Vec<u8>)>,
}

/// The column holding the full-size image: the first binary column whose
/// name does not contain "thumb" in any case.
pub fn image_column(columns: &[ColumnSpec]) -> Option<&ColumnSpec> {
    columns
        .iter()
        .find(|c| c.kind == ColumnKind::Binary && !c.name.to_lowercase().contains("thumb"))
}

/// The thumbnail column: the first binary column whose name contains
/// "thumb" in any case.
pub fn thumbnail_column(columns: &[ColumnSpec]) -> Option<&ColumnSpec> {
    columns
        .iter()
        .find(|c| c.kind == ColumnKind::Binary && c.name.to_lowercase().contains("thumb"))
}

/// Drain a byte stream into memory.
pub async fn collect_stream(mut stream: ByteStream) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}
