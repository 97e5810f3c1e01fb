//! Session-scoped disk cache for photo blobs
//!
//! Maps row keys to on-disk files, tracks each file's write state, and runs
//! one cancellable background writer per in-flight copy. The store and every
//! file it tracks live exactly as long as the owning session; teardown kills
//! the writers before deleting anything.

mod error;
mod store;
mod stream;
mod teardown;
mod writer;

pub use error::{CacheError, Result};
pub use store::{CacheEntry, CacheStats, CacheStore, EntryState};
pub use stream::{tee, ByteStream};
pub use teardown::teardown_directory;
pub use writer::{spawn_writer, WriteFault, WriterHandle, WriterState};
