//! Cancellable background stream writer
//!
//! Copies one byte stream into one destination file. Pause and resume are
//! cooperative: the writer checks its gate between chunks and is never
//! preempted. Kill is terminal and only returns once the task has exited
//! and its file handle is released, so a delete that follows a kill cannot
//! hit a lingering open handle.
//!
//! The copy lands in a `<name>.partial` sibling and is renamed into place on
//! completion, so no reader ever observes a truncated destination file.

use crate::store::CacheStore;
use crate::stream::ByteStream;
use futures_util::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a background writer.
///
/// `Running` and `Paused` alternate until the copy finishes, fails, or is
/// killed. A successful copy is observable as `Completed` before the writer
/// settles in `Killed` with its handles released, the same terminal an
/// explicit kill produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Running,
    Paused,
    Completed,
    Killed,
}

/// A background write failure, surfaced on the session fault channel
#[derive(Debug)]
pub struct WriteFault {
    pub key: String,
    pub path: PathBuf,
    pub error: io::Error,
}

/// Control handle for one background writer
pub struct WriterHandle {
    key: String,
    path: PathBuf,
    pause: watch::Sender<bool>,
    cancel: CancellationToken,
    state: watch::Receiver<WriterState>,
    completed: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WriterHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WriterState {
        *self.state.borrow()
    }

    /// True once the destination file is fully on disk (either copied by
    /// this writer or already present when it started).
    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Cooperatively suspend copying. Resources stay open; the writer parks
    /// between chunks until [`resume`](Self::resume) or [`kill`](Self::kill).
    pub fn stop(&self) {
        self.pause.send_replace(true);
    }

    pub fn resume(&self) {
        self.pause.send_replace(false);
    }

    /// Terminal and idempotent. Returns only after the writer task has
    /// exited, which is what guarantees the file handle is closed and the
    /// partial file is gone before any caller deletes the destination.
    pub async fn kill(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        match task {
            Some(task) => {
                if let Err(err) = task.await {
                    warn!(key = %self.key, error = %err, "Writer task failed during kill");
                }
            }
            // A concurrent kill already took the task; wait for it to settle.
            None => {
                self.wait_terminal().await;
            }
        }
    }

    /// Await the writer's terminal state.
    pub async fn wait_terminal(&self) -> WriterState {
        let mut rx = self.state.clone();
        loop {
            let current = *rx.borrow_and_update();
            if current == WriterState::Killed {
                return current;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}

/// Spawn a background writer copying `stream` to `path`.
///
/// The writer holds a back-reference to the store to flip the entry for
/// `key` to `Done` or `Failed`; it never removes entries.
pub fn spawn_writer(
    key: impl Into<String>,
    path: PathBuf,
    stream: ByteStream,
    store: Arc<CacheStore>,
    faults: mpsc::UnboundedSender<WriteFault>,
) -> WriterHandle {
    let key = key.into();
    let (pause_tx, pause_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(WriterState::Idle);
    let cancel = CancellationToken::new();
    let completed = Arc::new(AtomicBool::new(false));

    let task = tokio::spawn(run(
        key.clone(),
        path.clone(),
        stream,
        store,
        faults,
        cancel.clone(),
        pause_rx,
        state_tx,
        Arc::clone(&completed),
    ));

    WriterHandle {
        key,
        path,
        pause: pause_tx,
        cancel,
        state: state_rx,
        completed,
        task: Mutex::new(Some(task)),
    }
}

enum CopyOutcome {
    Finished,
    Cancelled,
}

#[allow(clippy::too_many_arguments)]
async fn run(
    key: String,
    path: PathBuf,
    stream: ByteStream,
    store: Arc<CacheStore>,
    faults: mpsc::UnboundedSender<WriteFault>,
    cancel: CancellationToken,
    mut pause: watch::Receiver<bool>,
    state: watch::Sender<WriterState>,
    completed: Arc<AtomicBool>,
) {
    state.send_replace(WriterState::Running);

    // An existing destination means this key was fully written before,
    // possibly by an earlier session over the same directory.
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        debug!(key = %key, path = %path.display(), "Destination already on disk, skipping copy");
        store.mark_done(&key);
        completed.store(true, Ordering::Release);
        state.send_replace(WriterState::Completed);
        state.send_replace(WriterState::Killed);
        return;
    }

    match copy(stream, &path, &cancel, &mut pause, &state).await {
        Ok(CopyOutcome::Finished) => {
            info!(key = %key, path = %path.display(), "Written to disk");
            store.mark_done(&key);
            completed.store(true, Ordering::Release);
            state.send_replace(WriterState::Completed);
        }
        Ok(CopyOutcome::Cancelled) => {
            debug!(key = %key, path = %path.display(), "Writer killed mid-copy");
        }
        Err(error) => {
            warn!(key = %key, path = %path.display(), error = %error, "Background write failed");
            store.mark_failed(&key);
            let _ = faults.send(WriteFault {
                key: key.clone(),
                path: path.clone(),
                error,
            });
        }
    }

    state.send_replace(WriterState::Killed);
}

async fn copy(
    stream: ByteStream,
    path: &Path,
    cancel: &CancellationToken,
    pause: &mut watch::Receiver<bool>,
    state: &watch::Sender<WriterState>,
) -> io::Result<CopyOutcome> {
    let partial = partial_path(path);
    match write_chunks(stream, &partial, cancel, pause, state).await {
        Ok(true) => {
            if let Err(err) = tokio::fs::rename(&partial, path).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err);
            }
            Ok(CopyOutcome::Finished)
        }
        Ok(false) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Ok(CopyOutcome::Cancelled)
        }
        Err(err) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(err)
        }
    }
}

/// Copy every chunk into `partial`. Returns Ok(true) on a normal end of
/// stream, Ok(false) when killed; the file handle is closed either way.
async fn write_chunks(
    mut stream: ByteStream,
    partial: &Path,
    cancel: &CancellationToken,
    pause: &mut watch::Receiver<bool>,
    state: &watch::Sender<WriterState>,
) -> io::Result<bool> {
    let mut file = File::create(partial).await?;
    let mut was_paused = false;

    loop {
        // Pause gate, checked between chunks. Kill still lands while parked.
        while *pause.borrow() {
            if !was_paused {
                state.send_replace(WriterState::Paused);
                was_paused = true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                changed = pause.changed() => {
                    if changed.is_err() {
                        return Ok(false);
                    }
                }
            }
        }
        if was_paused {
            state.send_replace(WriterState::Running);
            was_paused = false;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            changed = pause.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
                // Gate flipped; re-check it at the top of the loop
                continue;
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => file.write_all(&bytes).await?,
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(true)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
