//! In-memory blob source
//!
//! Backs tests and embedders that have no remote store. Rows live in a
//! mutex-guarded table; binary reads clone the stored bytes, so streams are
//! repeatable the same way the HTTP source's are.

use crate::error::{Result, SourceError};
use crate::source::BlobSource;
use crate::types::{ByteStream, ColumnKind, ColumnSpec, PhotoRow, RowData};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;

/// Chunk size for streams served out of memory. Small enough that writer
/// pause/kill points are exercised even on test-sized payloads.
const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

struct StoredRow {
    row: PhotoRow,
    binaries: HashMap<String, Vec<u8>>,
}

/// Mutex-guarded row table implementing [`BlobSource`]
pub struct MemoryRowSource {
    columns: Vec<ColumnSpec>,
    chunk_size: usize,
    rows: Mutex<Vec<StoredRow>>,
}

impl MemoryRowSource {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            chunk_size: DEFAULT_CHUNK_SIZE,
            rows: Mutex::new(Vec::new()),
        }
    }

    /// The photo table schema the original client shipped with: scalar
    /// metadata columns plus an image and a thumbnail blob per row.
    pub fn with_default_schema() -> Self {
        Self::new(vec![
            ColumnSpec::value("index"),
            ColumnSpec::value("filename"),
            ColumnSpec::value("format"),
            ColumnSpec::value("description"),
            ColumnSpec::value("size"),
            ColumnSpec::value("date"),
            ColumnSpec::binary("image"),
            ColumnSpec::binary("thumb"),
        ])
    }

    /// Override the stream chunk size (tests use small chunks to force
    /// multi-chunk writes).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_column(&self, name: &str, kind: ColumnKind) -> bool {
        self.columns.iter().any(|c| c.name == name && c.kind == kind)
    }
}

#[async_trait]
impl BlobSource for MemoryRowSource {
    fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    async fn fetch_by_key(&self, key: &str) -> Result<PhotoRow> {
        let rows = self.rows.lock().unwrap();
        rows.iter()
            .find(|r| r.row.key == key)
            .map(|r| r.row.clone())
            .ok_or_else(|| SourceError::NotFound(key.to_string()))
    }

    async fn fetch_all_rows(&self) -> Result<Vec<PhotoRow>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().map(|r| r.row.clone()).collect())
    }

    async fn open_binary(&self, key: &str, column: &str) -> Result<ByteStream> {
        if !self.has_column(column, ColumnKind::Binary) {
            return Err(SourceError::MissingColumn(column.to_string()));
        }

        let data = {
            let rows = self.rows.lock().unwrap();
            let stored = rows
                .iter()
                .find(|r| r.row.key == key)
                .ok_or_else(|| SourceError::NotFound(key.to_string()))?;
            stored
                .binaries
                .get(column)
                .cloned()
                .ok_or_else(|| SourceError::MissingColumn(column.to_string()))?
        };

        let chunks: Vec<std::io::Result<Bytes>> = data
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    async fn insert_row(&self, row: RowData) -> Result<()> {
        let mut binaries = HashMap::new();
        for (column, data) in row.binaries {
            if !self.has_column(&column, ColumnKind::Binary) {
                return Err(SourceError::MissingColumn(column));
            }
            binaries.insert(column, data);
        }

        let mut rows = self.rows.lock().unwrap();
        rows.push(StoredRow {
            row: PhotoRow {
                key: row.key,
                filename: row.filename,
                properties: row.properties,
            },
            binaries,
        });
        Ok(())
    }
}
