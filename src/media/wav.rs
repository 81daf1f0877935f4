//! Streaming WAV output
//!
//! Writes a RIFF/WAVE header with unknown (`0xFFFFFFFF`) chunk sizes, which
//! players accept for open-ended streams, followed by little-endian s16 PCM.

use bytes::{BufMut, Bytes, BytesMut};

use super::encoder::EncodedChunk;

/// Size of the canonical PCM WAV header
pub const WAV_HEADER_LEN: usize = 44;

const UNKNOWN_SIZE: u32 = 0xFFFF_FFFF;
const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;

/// Streaming WAV encoder
#[derive(Debug)]
pub struct WavEncoder {
    sample_rate: u32,
    channels: u16,
    header_emitted: bool,
}

impl WavEncoder {
    /// Create a new encoder
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            header_emitted: false,
        }
    }

    /// Build the streaming RIFF header
    pub fn header(&self) -> Bytes {
        let block_align = self.channels * (BITS_PER_SAMPLE / 8);
        let byte_rate = self.sample_rate * u32::from(block_align);

        let mut buf = BytesMut::with_capacity(WAV_HEADER_LEN);
        buf.put_slice(b"RIFF");
        buf.put_u32_le(UNKNOWN_SIZE);
        buf.put_slice(b"WAVE");

        buf.put_slice(b"fmt ");
        buf.put_u32_le(16);
        buf.put_u16_le(FORMAT_PCM);
        buf.put_u16_le(self.channels);
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(byte_rate);
        buf.put_u16_le(block_align);
        buf.put_u16_le(BITS_PER_SAMPLE);

        buf.put_slice(b"data");
        buf.put_u32_le(UNKNOWN_SIZE);

        buf.freeze()
    }

    /// Encode interleaved samples
    ///
    /// The first non-empty batch carries the header.
    pub fn encode(&mut self, samples: &[i16]) -> Vec<EncodedChunk> {
        if samples.is_empty() {
            return Vec::new();
        }

        let mut payload = BytesMut::with_capacity(samples.len() * 2);
        for &sample in samples {
            payload.put_i16_le(sample);
        }

        let header = if self.header_emitted {
            None
        } else {
            self.header_emitted = true;
            Some(self.header())
        };

        vec![EncodedChunk {
            header,
            payload: payload.freeze(),
        }]
    }

    /// Configured sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = WavEncoder::new(48_000, 2).header();

        assert_eq!(header.len(), WAV_HEADER_LEN);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        // channels
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 2);
        // sample rate
        assert_eq!(
            u32::from_le_bytes([header[24], header[25], header[26], header[27]]),
            48_000
        );
        // byte rate = 48000 * 2 * 2
        assert_eq!(
            u32::from_le_bytes([header[28], header[29], header[30], header[31]]),
            192_000
        );
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn test_header_only_once() {
        let mut enc = WavEncoder::new(32_000, 2);

        assert!(enc.encode(&[]).is_empty());

        let first = enc.encode(&[0x0102, -2]);
        assert!(first[0].header.is_some());
        assert_eq!(&first[0].payload[..], &[0x02, 0x01, 0xFE, 0xFF]);

        let second = enc.encode(&[7, 8]);
        assert!(second[0].header.is_none());
    }
}
