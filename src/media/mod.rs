//! Media handling
//!
//! This module provides:
//! - Output codec and MOT image type identifiers
//! - The closed set of encoder backends (WAV, MP3, FLAC)
//! - Audio level measurement

pub mod codec;
pub mod encoder;
#[cfg(feature = "flac")]
pub mod flac;
pub mod levels;
#[cfg(feature = "mp3")]
pub mod mp3;
pub mod wav;

pub use codec::{MotType, OutputCodec};
pub use encoder::{EncodedChunk, EncoderBackend, EncoderOptions, CHANNELS};
pub use levels::peak_levels;
