//! Rolling cache of encoded audio for catch-up playback
//!
//! Clients that join after the stream started can ask to start some number of
//! bytes behind the live edge. The cache keeps the most recent encoded bytes and
//! addresses them by absolute offset:
//!
//! ```text
//!   evicted            resident              future
//! ─────────────┬──────────────────────┬──────────────
//!              head                   tail
//! ```
//!
//! Offsets never reset. Once the cache holds more than its byte budget, the
//! oldest bytes are dropped and `head` moves forward by the same amount.

use bytes::Bytes;
use std::collections::VecDeque;

/// Bounded byte cache addressed by absolute offset
#[derive(Debug)]
pub struct AudioCache {
    /// Maximum number of resident bytes
    max_len: usize,
    /// Resident bytes, oldest first
    data: VecDeque<u8>,
    /// Absolute offset of `data[0]`
    head: u64,
    /// One-time stream header emitted by the encoder
    stream_header: Option<Bytes>,
}

impl AudioCache {
    /// Create a new cache holding at most `max_len` bytes
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            data: VecDeque::with_capacity(max_len.min(1024 * 1024)),
            head: 0,
            stream_header: None,
        }
    }

    /// Append bytes to the tail
    ///
    /// Returns the number of bytes evicted from the head to get back under the
    /// byte budget.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        self.data.extend(bytes);

        let evicted = self.data.len().saturating_sub(self.max_len);
        if evicted > 0 {
            self.data.drain(..evicted);
            self.head += evicted as u64;
        }

        evicted
    }

    /// Read exactly `size` bytes starting at absolute `offset`
    ///
    /// Returns `None` unless the whole range is resident. Callers retry later;
    /// a short read is never returned.
    pub fn read_chunk(&self, offset: u64, size: usize) -> Option<Bytes> {
        if offset < self.head {
            return None;
        }

        let start = usize::try_from(offset - self.head).ok()?;
        let end = start.checked_add(size)?;
        if end > self.data.len() {
            return None;
        }

        let chunk: Vec<u8> = self.data.range(start..end).copied().collect();
        Some(Bytes::from(chunk))
    }

    /// Absolute offset at which a reader rewinding `rewind` bytes from the live
    /// edge should start, clamped to the oldest resident byte
    pub fn start_offset(&self, rewind: usize) -> u64 {
        self.tail().saturating_sub(rewind as u64).max(self.head)
    }

    /// Absolute offset of the oldest resident byte
    pub fn head(&self) -> u64 {
        self.head
    }

    /// Absolute offset one past the newest resident byte
    pub fn tail(&self) -> u64 {
        self.head + self.data.len() as u64
    }

    /// Number of resident bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if no bytes are resident
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of resident bytes
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Get cache utilization as a percentage
    pub fn utilization(&self) -> f32 {
        if self.max_len > 0 {
            (self.data.len() as f32 / self.max_len as f32) * 100.0
        } else {
            0.0
        }
    }

    /// Remember the encoder's stream header
    ///
    /// Only the first header is kept; encoders emit it once.
    pub fn set_stream_header(&mut self, header: Bytes) {
        if self.stream_header.is_none() && !header.is_empty() {
            self.stream_header = Some(header);
        }
    }

    /// Get the retained stream header
    pub fn stream_header(&self) -> Option<&Bytes> {
        self.stream_header.as_ref()
    }

    /// Copy all resident bytes
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }
}
