//! Session configuration

use std::path::PathBuf;

const DEFAULT_CACHE_DIR: &str = "./cache/photos";
const DEFAULT_THUMB_SHORT_SIDE: u32 = 64;

/// Configuration for one photo session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory holding this session's cached files
    pub cache_dir: PathBuf,
    /// Target short side, in pixels, for thumbnails generated at insert time
    pub thumb_short_side: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            thumb_short_side: DEFAULT_THUMB_SHORT_SIDE,
        }
    }
}

impl SessionConfig {
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let cache_dir = std::env::var("PHOTODB_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR));

        let thumb_short_side = std::env::var("PHOTODB_THUMB_SHORT_SIDE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_THUMB_SHORT_SIDE);

        Self {
            cache_dir,
            thumb_short_side,
        }
    }
}
