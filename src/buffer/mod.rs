//! Buffers backing catch-up playback
//!
//! - [`AudioCache`]: rolling byte cache of encoded audio, addressed by absolute offset
//! - [`TimeWindowedBuffer`]: age-bounded history of changing metadata values

pub mod cache;
pub mod window;

pub use cache::AudioCache;
pub use window::{Latest, TimeWindowedBuffer, TimedRecord};
