//! Encoder backends
//!
//! The handler only needs one capability from an encoder: take interleaved
//! 16-bit PCM and return encoded chunks. The set of backends is closed and the
//! choice is made once, when the first audio batch reveals the sample rate.
//!
//! | Codec | Backend | Cargo feature |
//! |-------|---------|---------------|
//! | WAV   | built in | always |
//! | MP3   | LAME (`mp3lame-encoder`) | `mp3` (default) |
//! | FLAC  | libFLAC (`libflac-sys`) | `flac` |

use bytes::Bytes;

use super::codec::OutputCodec;
use super::wav::WavEncoder;
use crate::error::{Error, Result};

#[cfg(feature = "flac")]
use super::flac::FlacEncoder;
#[cfg(feature = "mp3")]
use super::mp3::Mp3Encoder;

/// The audio decoders always upconvert to stereo
pub const CHANNELS: u16 = 2;

/// Output of one encoder step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// One-time stream header, only present on the first chunk
    pub header: Option<Bytes>,
    /// Encoded audio
    pub payload: Bytes,
}

impl EncodedChunk {
    /// Create a payload-only chunk
    pub fn payload(payload: Bytes) -> Self {
        Self {
            header: None,
            payload,
        }
    }
}

/// Codec tuning options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// MP3 constant bitrate in kbit/s
    pub mp3_bitrate_kbps: u32,
    /// LAME algorithm quality, 0 (best) to 9 (worst)
    pub mp3_quality: u8,
    /// libFLAC compression level, 0 to 8
    pub flac_compression_level: u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            mp3_bitrate_kbps: 192,
            mp3_quality: 2,
            flac_compression_level: 5,
        }
    }
}

/// One of the supported encoder backends
pub enum EncoderBackend {
    /// Streaming WAV
    Wav(WavEncoder),
    /// LAME MP3
    #[cfg(feature = "mp3")]
    Mp3(Mp3Encoder),
    /// libFLAC
    #[cfg(feature = "flac")]
    Flac(FlacEncoder),
}

impl EncoderBackend {
    /// Create the backend for `codec` at the given sample rate
    pub fn new(codec: OutputCodec, sample_rate: u32, options: &EncoderOptions) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Encoder("sample rate must be non-zero".into()));
        }

        match codec {
            OutputCodec::Wav => Ok(EncoderBackend::Wav(WavEncoder::new(sample_rate, CHANNELS))),
            #[cfg(feature = "mp3")]
            OutputCodec::Mp3 => Ok(EncoderBackend::Mp3(Mp3Encoder::new(sample_rate, options)?)),
            #[cfg(feature = "flac")]
            OutputCodec::Flac => Ok(EncoderBackend::Flac(FlacEncoder::new(sample_rate, options)?)),
            #[allow(unreachable_patterns)]
            other => {
                let _ = options;
                Err(Error::UnsupportedCodec(other))
            }
        }
    }

    /// Encode a batch of interleaved stereo samples
    ///
    /// May return no chunks if the codec is still buffering a frame.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Vec<EncodedChunk>> {
        match self {
            EncoderBackend::Wav(enc) => Ok(enc.encode(samples)),
            #[cfg(feature = "mp3")]
            EncoderBackend::Mp3(enc) => enc.encode(samples),
            #[cfg(feature = "flac")]
            EncoderBackend::Flac(enc) => enc.encode(samples),
        }
    }

    /// Codec produced by this backend
    pub fn codec(&self) -> OutputCodec {
        match self {
            EncoderBackend::Wav(_) => OutputCodec::Wav,
            #[cfg(feature = "mp3")]
            EncoderBackend::Mp3(_) => OutputCodec::Mp3,
            #[cfg(feature = "flac")]
            EncoderBackend::Flac(_) => OutputCodec::Flac,
        }
    }

    /// Sample rate the backend was configured with
    pub fn sample_rate(&self) -> u32 {
        match self {
            EncoderBackend::Wav(enc) => enc.sample_rate(),
            #[cfg(feature = "mp3")]
            EncoderBackend::Mp3(enc) => enc.sample_rate(),
            #[cfg(feature = "flac")]
            EncoderBackend::Flac(enc) => enc.sample_rate(),
        }
    }
}

impl std::fmt::Debug for EncoderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderBackend")
            .field("codec", &self.codec())
            .field("sample_rate", &self.sample_rate())
            .finish()
    }
}
