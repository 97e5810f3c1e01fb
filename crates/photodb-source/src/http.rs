//! HTTP client for remote photo row stores

use crate::error::{Result, SourceError};
use crate::source::BlobSource;
use crate::types::{ByteStream, ColumnKind, ColumnSpec, PhotoRow, RowData};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::io;
use tracing::{debug, warn};

/// HTTP client for fetching photo rows and blobs from a row-store service.
///
/// The service exposes rows at `{base}/rows`, a single row at
/// `{base}/rows/{key}` and a binary column body at
/// `{base}/rows/{key}/{column}`. Every binary GET returns a fresh body, so
/// re-reading a row is a second request rather than a shared stream.
pub struct HttpRowSource {
    base_url: String,
    columns: Vec<ColumnSpec>,
    client: Client,
}

impl HttpRowSource {
    pub fn new(base_url: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            columns,
            client: Client::new(),
        }
    }

    fn check_status(response: Response, key: Option<&str>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(key) = key {
                return Err(SourceError::NotFound(key.to_string()));
            }
        }
        warn!(status = %status, url = %response.url(), "Row store request failed");
        Err(SourceError::Unavailable(format!(
            "row store returned status {}",
            status
        )))
    }

    fn ensure_binary_column(&self, column: &str) -> Result<()> {
        let known = self
            .columns
            .iter()
            .any(|c| c.name == column && c.kind == ColumnKind::Binary);
        if known {
            Ok(())
        } else {
            Err(SourceError::MissingColumn(column.to_string()))
        }
    }
}

#[async_trait]
impl BlobSource for HttpRowSource {
    fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    async fn fetch_by_key(&self, key: &str) -> Result<PhotoRow> {
        let url = format!("{}/rows/{}", self.base_url, key);
        debug!(key, url = %url, "Fetching row");

        let response = self.client.get(&url).send().await?;
        let response = Self::check_status(response, Some(key))?;
        Ok(response.json::<PhotoRow>().await?)
    }

    async fn fetch_all_rows(&self) -> Result<Vec<PhotoRow>> {
        let url = format!("{}/rows", self.base_url);
        debug!(url = %url, "Fetching all rows");

        let response = self.client.get(&url).send().await?;
        let response = Self::check_status(response, None)?;
        Ok(response.json::<Vec<PhotoRow>>().await?)
    }

    async fn open_binary(&self, key: &str, column: &str) -> Result<ByteStream> {
        self.ensure_binary_column(column)?;

        let url = format!("{}/rows/{}/{}", self.base_url, key, column);
        debug!(key, column, url = %url, "Opening binary stream");

        let response = self.client.get(&url).send().await?;
        let response = Self::check_status(response, Some(key))?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        Ok(Box::pin(stream))
    }

    async fn insert_row(&self, row: RowData) -> Result<()> {
        for (column, _) in &row.binaries {
            self.ensure_binary_column(column)?;
        }

        let url = format!("{}/rows", self.base_url);
        let meta = PhotoRow {
            key: row.key.clone(),
            filename: row.filename.clone(),
            properties: row.properties.clone(),
        };
        debug!(key = %row.key, url = %url, "Inserting row");

        let response = self.client.post(&url).json(&meta).send().await?;
        Self::check_status(response, None)?;

        for (column, data) in row.binaries {
            let url = format!("{}/rows/{}/{}", self.base_url, row.key, column);
            debug!(key = %row.key, column = %column, size = data.len(), "Uploading binary column");
            let response = self.client.put(&url).body(data).send().await?;
            Self::check_status(response, Some(&row.key))?;
        }
        Ok(())
    }
}
