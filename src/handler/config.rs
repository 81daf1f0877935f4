//! Broadcast handler configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::media::EncoderOptions;

/// Default audio cache budget (2 MiB, roughly 90 s of 192 kbit/s MP3)
pub const DEFAULT_CACHE_MAX_BYTES: usize = 2 * 1024 * 1024;

/// Default metadata retention window
pub const DEFAULT_METADATA_RETENTION: Duration = Duration::from_secs(90);

/// Default size of chunks pulled by catch-up subscribers
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Default cache size that triggers the diagnostic dump
pub const DEFAULT_DUMP_THRESHOLD: usize = 825_600;

/// Configuration for one service's broadcast handler
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Maximum number of encoded bytes kept for catch-up playback
    pub cache_max_bytes: usize,

    /// How long label and image history is kept
    pub metadata_retention: Duration,

    /// Bytes per read for catch-up subscribers
    pub chunk_size: usize,

    /// Retry interval when a catch-up chunk is not resident yet
    pub catch_up_poll_interval: Duration,

    /// Upper bound between state checks in `wait_for_termination`
    pub termination_poll_interval: Duration,

    /// Where to dump the cache once it exceeds `dump_threshold` (None = never)
    pub dump_path: Option<PathBuf>,

    /// Cache length that triggers the one-time dump
    pub dump_threshold: usize,

    /// Codec tuning
    pub encoder: EncoderOptions,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            metadata_retention: DEFAULT_METADATA_RETENTION,
            chunk_size: DEFAULT_CHUNK_SIZE,
            catch_up_poll_interval: Duration::from_millis(50),
            termination_poll_interval: Duration::from_secs(2),
            dump_path: None,
            dump_threshold: DEFAULT_DUMP_THRESHOLD,
            encoder: EncoderOptions::default(),
        }
    }
}

impl HandlerConfig {
    /// Derive both retention limits from one playback window
    ///
    /// The cache budget is `window * bytes_per_second`; metadata is kept for
    /// the same window.
    pub fn from_playback_window(window: Duration, bytes_per_second: usize) -> Self {
        let cache_max_bytes = (window.as_secs_f64() * bytes_per_second as f64) as usize;
        Self {
            cache_max_bytes,
            metadata_retention: window,
            ..Default::default()
        }
    }

    /// Set the audio cache budget in bytes
    pub fn cache_max_bytes(mut self, bytes: usize) -> Self {
        self.cache_max_bytes = bytes;
        self
    }

    /// Set the metadata retention window
    pub fn metadata_retention(mut self, retention: Duration) -> Self {
        self.metadata_retention = retention;
        self
    }

    /// Set the catch-up chunk size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the catch-up retry interval
    pub fn catch_up_poll_interval(mut self, interval: Duration) -> Self {
        self.catch_up_poll_interval = interval;
        self
    }

    /// Set the termination poll interval
    pub fn termination_poll_interval(mut self, interval: Duration) -> Self {
        self.termination_poll_interval = interval;
        self
    }

    /// Enable the one-time diagnostic dump
    pub fn dump_to(mut self, path: impl Into<PathBuf>, threshold: usize) -> Self {
        self.dump_path = Some(path.into());
        self.dump_threshold = threshold;
        self
    }

    /// Set codec tuning options
    pub fn encoder(mut self, options: EncoderOptions) -> Self {
        self.encoder = options;
        self
    }

    /// Check the configuration for values the handler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be non-zero".into()));
        }
        if self.chunk_size > self.cache_max_bytes {
            return Err(Error::InvalidConfig(format!(
                "chunk_size ({}) exceeds cache_max_bytes ({}), catch-up could never read",
                self.chunk_size, self.cache_max_bytes
            )));
        }
        if self.catch_up_poll_interval.is_zero() || self.termination_poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll intervals must be non-zero".into()));
        }
        Ok(())
    }
}
