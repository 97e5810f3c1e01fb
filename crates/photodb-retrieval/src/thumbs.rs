//! Thumbnail enumeration
//!
//! Stateless: reads only the designated thumbnail column, decodes in
//! memory, and never touches the disk cache. Thumbnails are cheap enough to
//! recompute per call.

use crate::codec::{Codec, PixelBuffer};
use crate::error::{Result, RetrievalError};
use photodb_cache::CacheError;
use photodb_source::{collect_stream, thumbnail_column, BlobSource};
use tracing::debug;

/// Lists every row's thumbnail in row order
pub struct ThumbnailLister<'a, S> {
    source: &'a S,
    codec: &'a dyn Codec,
}

impl<'a, S: BlobSource> ThumbnailLister<'a, S> {
    pub fn new(source: &'a S, codec: &'a dyn Codec) -> Self {
        Self { source, codec }
    }

    /// Decode all thumbnails, ordered the way the rows were inserted.
    ///
    /// The thumbnail column is the first binary column whose name contains
    /// "thumb" in any case.
    pub async fn list(&self) -> Result<Vec<PixelBuffer>> {
        let column = thumbnail_column(self.source.columns())
            .ok_or(RetrievalError::NoThumbnailColumn)?
            .name
            .clone();

        let rows = self.source.fetch_all_rows().await?;
        let mut thumbs = Vec::with_capacity(rows.len());
        for row in &rows {
            let stream = self.source.open_binary(&row.key, &column).await?;
            let bytes = collect_stream(stream).await.map_err(CacheError::from)?;
            thumbs.push(self.codec.decode(&bytes)?);
        }

        debug!(count = thumbs.len(), column = %column, "Thumbnails decoded");
        Ok(thumbs)
    }
}
