//! Photo retrieval sessions
//!
//! A `PhotoSession` owns a cache directory, its cache store, and the
//! background writers filling it, for exactly as long as the logical
//! connection it represents. Closing the session kills the writers and
//! deletes the directory; nothing here is process-global.

use crate::codec::{Codec, ImageCodec, PixelBuffer};
use crate::config::SessionConfig;
use crate::error::{Result, RetrievalError};
use crate::thumbs::ThumbnailLister;
use chrono::{DateTime, Utc};
use photodb_cache::{
    spawn_writer, tee, teardown_directory, CacheError, CacheStats, CacheStore, WriteFault,
    WriterHandle, WriterState,
};
use photodb_source::{collect_stream, image_column, thumbnail_column, BlobSource, RowData};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One entry of the bulk-retrieved set: a fully materialized file and the
/// row's scalar properties
#[derive(Debug, Clone)]
pub struct BulkPhoto {
    pub path: PathBuf,
    pub properties: HashMap<String, String>,
}

/// Cached retrieval session over one blob source
pub struct PhotoSession<S> {
    source: S,
    codec: Box<dyn Codec>,
    config: SessionConfig,
    store: Arc<CacheStore>,
    writers: Mutex<Vec<Arc<WriterHandle>>>,
    bulk: Mutex<Vec<BulkPhoto>>,
    faults_tx: mpsc::UnboundedSender<WriteFault>,
    faults_rx: Mutex<mpsc::UnboundedReceiver<WriteFault>>,
}

impl<S: BlobSource> PhotoSession<S> {
    /// Open a session: create the cache directory and a fresh, empty store.
    pub async fn connect(source: S, config: SessionConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.cache_dir)
            .await
            .map_err(CacheError::from)?;
        info!(cache_dir = %config.cache_dir.display(), "Photo session connected");

        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        Ok(Self {
            source,
            codec: Box::new(ImageCodec),
            config,
            store: Arc::new(CacheStore::new()),
            writers: Mutex::new(Vec::new()),
            bulk: Mutex::new(Vec::new()),
            faults_tx,
            faults_rx: Mutex::new(faults_rx),
        })
    }

    /// Swap in a different codec implementation.
    pub fn with_codec(mut self, codec: Box<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Retrieve and decode one photo by its unique key.
    ///
    /// Lookup is three-tiered: the bulk-retrieved set first, then the cache
    /// store, then a fresh fetch. A fresh fetch that wins the store's
    /// insert-if-absent spawns a background writer over a tee of the stream
    /// and returns without waiting for the copy; a fetch that loses never
    /// spawns a second writer for the same destination.
    pub async fn photo(&self, key: &str) -> Result<PixelBuffer> {
        let row = self.source.fetch_by_key(key).await?;
        let path = self.config.cache_dir.join(&row.filename);

        // Tier 1: fully materialized by a bulk retrieval this session
        if self.bulk_contains(&path) {
            debug!(key, path = %path.display(), "Serving from bulk-retrieved set");
            self.store.record_hit();
            let bytes = tokio::fs::read(&path).await.map_err(CacheError::from)?;
            return self.codec.decode(&bytes);
        }

        let column = self.image_column_name()?;
        let stream = self.source.open_binary(key, &column).await?;

        // Tiers 2/3: the atomic insert decides which caller owns the write
        if self.store.try_begin(key, &path) {
            self.store.record_miss();
            let (for_writer, for_decode) = tee(stream);
            let handle = Arc::new(spawn_writer(
                key,
                path.clone(),
                for_writer,
                Arc::clone(&self.store),
                self.faults_tx.clone(),
            ));
            self.store.record_writer_spawned();
            self.writers.lock().unwrap().push(handle);
            debug!(key, path = %path.display(), "Spawned background writer");

            let bytes = collect_stream(for_decode).await.map_err(CacheError::from)?;
            self.codec.decode(&bytes)
        } else {
            // An entry exists (Writing or Done): never a second writer for
            // the same destination. Decode this fetch directly.
            debug!(key, "Entry already tracked, decoding without caching");
            self.store.record_hit();
            let bytes = collect_stream(stream).await.map_err(CacheError::from)?;
            self.codec.decode(&bytes)
        }
    }

    /// Eagerly materialize every row's image on disk, in row order.
    ///
    /// Deliberately serialized: each row's write is awaited before the next
    /// row starts, so on return every file exists complete. Aborts on the
    /// first failing row, naming its index.
    pub async fn retrieve_photos(&self) -> Result<()> {
        let rows = self.source.fetch_all_rows().await?;
        let column = self.image_column_name()?;
        info!(rows = rows.len(), "Bulk retrieval started");

        let mut set = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let path = self.config.cache_dir.join(&row.filename);
            self.materialize_row(&row.key, &path, &column)
                .await
                .map_err(|err| RetrievalError::BulkRow(index, Box::new(err)))?;
            set.push(BulkPhoto {
                path,
                properties: row.properties,
            });
        }

        *self.bulk.lock().unwrap() = set;
        info!("Bulk retrieval complete");
        Ok(())
    }

    async fn materialize_row(&self, key: &str, path: &Path, column: &str) -> Result<()> {
        let stream = self.source.open_binary(key, column).await?;
        let handle = Arc::new(spawn_writer(
            key,
            path.to_path_buf(),
            stream,
            Arc::clone(&self.store),
            self.faults_tx.clone(),
        ));
        self.store.record_writer_spawned();
        self.writers.lock().unwrap().push(Arc::clone(&handle));

        handle.wait_terminal().await;
        if handle.completed() {
            return Ok(());
        }
        let error = self
            .take_faults()
            .into_iter()
            .rev()
            .find(|fault| fault.key == key)
            .map(|fault| fault.error)
            .unwrap_or_else(|| io::Error::other("write interrupted"));
        Err(CacheError::from(error).into())
    }

    /// Scalar properties of every row, without touching the disk.
    pub async fn photo_properties(&self) -> Result<Vec<HashMap<String, String>>> {
        let rows = self.source.fetch_all_rows().await?;
        Ok(rows.into_iter().map(|row| row.properties).collect())
    }

    /// Paths materialized by the last bulk retrieval, in row order.
    pub fn retrieved_photo_paths(&self) -> Vec<PathBuf> {
        self.bulk
            .lock()
            .unwrap()
            .iter()
            .map(|photo| photo.path.clone())
            .collect()
    }

    /// Decode every file materialized by the last bulk retrieval, in order.
    pub async fn retrieved_photos(&self) -> Result<Vec<PixelBuffer>> {
        let paths = self.retrieved_photo_paths();
        let mut photos = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = tokio::fs::read(&path).await.map_err(CacheError::from)?;
            photos.push(self.codec.decode(&bytes)?);
        }
        Ok(photos)
    }

    /// Properties captured by the last bulk retrieval, in row order.
    pub fn retrieved_photo_properties(&self) -> Vec<HashMap<String, String>> {
        self.bulk
            .lock()
            .unwrap()
            .iter()
            .map(|photo| photo.properties.clone())
            .collect()
    }

    /// Every row key, in insertion order.
    pub async fn all_keys(&self) -> Result<Vec<String>> {
        let rows = self.source.fetch_all_rows().await?;
        Ok(rows.into_iter().map(|row| row.key).collect())
    }

    /// All thumbnails, in row order. No caching.
    pub async fn photo_thumbnails(&self) -> Result<Vec<PixelBuffer>> {
        ThumbnailLister::new(&self.source, self.codec.as_ref())
            .list()
            .await
    }

    /// Insert one photo row, generating its thumbnail column by resizing to
    /// the configured short side and re-encoding as JPEG.
    pub async fn insert_photo(
        &self,
        key: &str,
        filename: &str,
        bytes: Vec<u8>,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        let image_col = self.image_column_name()?;
        let thumb_col = thumbnail_column(self.source.columns())
            .ok_or(RetrievalError::NoThumbnailColumn)?
            .name
            .clone();

        let image = self.codec.decode(&bytes)?;
        let thumb = self.codec.resize(&image, self.config.thumb_short_side);
        let thumb_bytes = self.codec.encode_jpeg(&thumb)?;

        debug!(key, filename, size = bytes.len(), "Inserting photo row");
        self.source
            .insert_row(RowData {
                key: key.to_string(),
                filename: filename.to_string(),
                properties,
                binaries: vec![(image_col, bytes), (thumb_col, thumb_bytes)],
            })
            .await?;
        Ok(())
    }

    /// Insert every regular file in `dir` as a photo row. Not recursive.
    pub async fn load_folder(&self, dir: &Path) -> Result<usize> {
        let start = self.source.fetch_all_rows().await?.len();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(CacheError::from)?;
        let mut inserted = 0;

        while let Some(entry) = entries.next_entry().await.map_err(CacheError::from)? {
            let meta = entry.metadata().await.map_err(CacheError::from)?;
            if !meta.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let format = entry
                .path()
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default();
            let modified: DateTime<Utc> = meta
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());

            let mut properties = HashMap::new();
            properties.insert("filename".to_string(), filename.clone());
            properties.insert("format".to_string(), format);
            properties.insert("description".to_string(), "[none]".to_string());
            properties.insert("size".to_string(), meta.len().to_string());
            properties.insert("date".to_string(), modified.to_rfc3339());

            let bytes = tokio::fs::read(entry.path())
                .await
                .map_err(CacheError::from)?;
            let key = (start + inserted).to_string();
            self.insert_photo(&key, &filename, bytes, properties).await?;
            inserted += 1;
        }

        info!(dir = %dir.display(), inserted, "Folder loaded");
        Ok(inserted)
    }

    /// Current state of every writer this session has spawned.
    pub fn writer_states(&self) -> Vec<WriterState> {
        self.writers
            .lock()
            .unwrap()
            .iter()
            .map(|handle| handle.state())
            .collect()
    }

    /// Wait for every background writer to settle.
    pub async fn wait_for_writers(&self) {
        let writers: Vec<_> = self.writers.lock().unwrap().clone();
        for handle in writers {
            handle.wait_terminal().await;
        }
    }

    /// Drain the background write fault channel.
    pub fn take_faults(&self) -> Vec<WriteFault> {
        let mut rx = self.faults_rx.lock().unwrap();
        let mut faults = Vec::new();
        while let Ok(fault) = rx.try_recv() {
            faults.push(fault);
        }
        faults
    }

    /// Disconnect: kill every writer, delete the cached files and the
    /// directory. Safe to call mid-write.
    pub async fn close(&self) -> Result<()> {
        let writers: Vec<_> = self.writers.lock().unwrap().clone();
        let bulk_paths: Vec<_> = {
            let mut bulk = self.bulk.lock().unwrap();
            let paths = bulk.iter().map(|photo| photo.path.clone()).collect();
            bulk.clear();
            paths
        };

        teardown_directory(&self.config.cache_dir, &self.store, &writers, bulk_paths).await?;
        info!("Photo session closed");
        Ok(())
    }

    fn image_column_name(&self) -> Result<String> {
        image_column(self.source.columns())
            .map(|column| column.name.clone())
            .ok_or(RetrievalError::NoImageColumn)
    }

    fn bulk_contains(&self, path: &Path) -> bool {
        self.bulk
            .lock()
            .unwrap()
            .iter()
            .any(|photo| photo.path == path)
    }
}
