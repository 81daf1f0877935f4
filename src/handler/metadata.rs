//! Service metadata snapshots
//!
//! Point-in-time copies handed out by the handler's query surface. None of
//! them borrow handler state.

use std::time::SystemTime;

use bytes::Bytes;

use crate::buffer::Latest;
use crate::media::MotType;

/// Current dynamic label (DLS) of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicLabel {
    /// Label text
    pub label: String,
    /// Last time the label was received
    pub time: SystemTime,
    /// Last time the label text changed
    pub last_changed: SystemTime,
}

impl From<&Latest<String>> for DynamicLabel {
    fn from(latest: &Latest<String>) -> Self {
        Self {
            label: latest.value.clone(),
            time: latest.last_seen,
            last_changed: latest.last_changed,
        }
    }
}

/// A slideshow image carried by MOT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotImage {
    /// Raw image bytes
    pub data: Bytes,
    /// Image format
    pub subtype: MotType,
}

/// Current slideshow image of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideshowImage {
    /// Image and its format
    pub image: MotImage,
    /// Last time the image was received
    pub time: SystemTime,
    /// Last time the image content changed
    pub last_changed: SystemTime,
}

impl From<&Latest<MotImage>> for SlideshowImage {
    fn from(latest: &Latest<MotImage>) -> Self {
        Self {
            image: latest.value.clone(),
            time: latest.last_seen,
            last_changed: latest.last_changed,
        }
    }
}

/// Accumulated decoder error counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCounters {
    /// Time of the last update, `None` until the first error report
    pub time: Option<SystemTime>,
    /// Superframe sync errors
    pub frame_errors: u64,
    /// Reed-Solomon blocks with uncorrectable errors
    pub rs_errors: u64,
    /// AAC frames that failed to decode
    pub aac_errors: u64,
}

impl ErrorCounters {
    pub(crate) fn add_frame_errors(&mut self, count: u32, now: SystemTime) {
        self.frame_errors += u64::from(count);
        self.time = Some(now);
    }

    pub(crate) fn add_rs_error(&mut self, uncorrected: bool, now: SystemTime) {
        self.rs_errors += u64::from(uncorrected);
        self.time = Some(now);
    }

    pub(crate) fn add_aac_errors(&mut self, count: u32, now: SystemTime) {
        self.aac_errors += u64::from(count);
        self.time = Some(now);
    }
}

/// Peak levels of the last audio batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioLevels {
    /// Time of the last measurement, `None` before the first batch
    pub time: Option<SystemTime>,
    /// Left channel peak, -1 before the first batch
    pub left: i32,
    /// Right channel peak, -1 before the first batch
    pub right: i32,
}

impl Default for AudioLevels {
    fn default() -> Self {
        Self {
            time: None,
            left: -1,
            right: -1,
        }
    }
}

/// Last X-PAD length mismatch reported by the decoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XpadError {
    /// Whether any mismatch was reported yet
    pub has_error: bool,
    /// Length announced in the PAD header
    pub announced_len: usize,
    /// Length actually received
    pub len: usize,
    /// Time of the last report
    pub time: Option<SystemTime>,
}

/// Format of the decoded audio as last reported by the decoder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz, 0 before the first batch
    pub sample_rate: u32,
    /// Channel mode description, e.g. "Stereo" or "Mono (PS)"
    pub mode: String,
}

/// Signal statistics guarded together by the handler
#[derive(Debug, Default)]
pub(crate) struct SignalStats {
    pub errors: ErrorCounters,
    pub levels: AudioLevels,
    pub xpad: XpadError,
    pub format: AudioFormat,
}
