//! Statistics for broadcast handlers

use std::time::{Duration, Instant};

use crate::media::OutputCodec;

/// Handler-level statistics
#[derive(Debug, Clone)]
pub struct HandlerStats {
    /// Service the handler broadcasts
    pub service_id: u32,
    /// Output codec
    pub codec: OutputCodec,
    /// When the handler was created
    pub started_at: Instant,
    /// Live subscribers that have not terminated
    pub live_subscribers: usize,
    /// Catch-up subscribers that have not terminated
    pub catch_up_subscribers: usize,
    /// Absolute offset of the oldest cached byte
    pub cache_head: u64,
    /// Absolute offset one past the newest cached byte
    pub cache_tail: u64,
    /// Bytes currently cached
    pub cache_len: usize,
    /// Cache fill level in percent
    pub cache_utilization: f32,
    /// Encoded bytes produced since start
    pub bytes_encoded: u64,
    /// Encoded chunks produced since start
    pub chunks_encoded: u64,
    /// Sample rate the encoder runs at, once known
    pub sample_rate: Option<u32>,
}

impl HandlerStats {
    pub fn new(service_id: u32, codec: OutputCodec) -> Self {
        Self {
            service_id,
            codec,
            started_at: Instant::now(),
            live_subscribers: 0,
            catch_up_subscribers: 0,
            cache_head: 0,
            cache_tail: 0,
            cache_len: 0,
            cache_utilization: 0.0,
            bytes_encoded: 0,
            chunks_encoded: 0,
            sample_rate: None,
        }
    }

    /// Get duration since the handler started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Total subscribers still streaming
    pub fn subscribers(&self) -> usize {
        self.live_subscribers + self.catch_up_subscribers
    }

    /// Bytes evicted from the cache since start
    pub fn bytes_evicted(&self) -> u64 {
        self.cache_head
    }

    /// Average encoded bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_encoded * 8) / secs
        } else {
            0
        }
    }

    /// Seconds of audio the cache holds at the observed bitrate
    pub fn cached_seconds(&self) -> f64 {
        let bitrate = self.bitrate();
        if bitrate > 0 {
            (self.cache_len as f64 * 8.0) / bitrate as f64
        } else {
            0.0
        }
    }
}
