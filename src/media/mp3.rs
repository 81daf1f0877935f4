//! MP3 encoding through LAME

use bytes::Bytes;
use mp3lame_encoder::{Bitrate, Builder, InterleavedPcm, Quality};

use super::encoder::{EncodedChunk, EncoderOptions, CHANNELS};
use crate::error::{Error, Result};

/// LAME-backed MP3 encoder
pub struct Mp3Encoder {
    lame: mp3lame_encoder::Encoder,
    sample_rate: u32,
}

// SAFETY: the LAME context is only touched through `&mut self`, and the
// handler serialises all access behind its producer lock.
unsafe impl Send for Mp3Encoder {}

impl Mp3Encoder {
    /// Create and configure a LAME encoder
    pub fn new(sample_rate: u32, options: &EncoderOptions) -> Result<Self> {
        let mut builder = Builder::new()
            .ok_or_else(|| Error::Encoder("failed to create LAME encoder builder".into()))?;

        builder
            .set_num_channels(CHANNELS as u8)
            .map_err(|e| Error::Encoder(format!("set_num_channels: {:?}", e)))?;
        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| Error::Encoder(format!("set_sample_rate({}): {:?}", sample_rate, e)))?;
        builder
            .set_brate(bitrate(options.mp3_bitrate_kbps)?)
            .map_err(|e| Error::Encoder(format!("set_brate: {:?}", e)))?;
        builder
            .set_quality(quality(options.mp3_quality))
            .map_err(|e| Error::Encoder(format!("set_quality: {:?}", e)))?;

        let lame = builder
            .build()
            .map_err(|e| Error::Encoder(format!("build: {:?}", e)))?;

        tracing::debug!(
            sample_rate = sample_rate,
            bitrate_kbps = options.mp3_bitrate_kbps,
            quality = options.mp3_quality,
            "LAME encoder initialised"
        );

        Ok(Self { lame, sample_rate })
    }

    /// Encode interleaved stereo samples
    ///
    /// LAME buffers internally and may return nothing for small batches.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Vec<EncodedChunk>> {
        // LAME worst case: 1.25 * samples per channel + 7200
        let frames = samples.len() / CHANNELS as usize;
        let capacity = frames + frames / 4 + 7200;
        let mut buf: Vec<u8> = Vec::with_capacity(capacity);

        let written = self
            .lame
            .encode(InterleavedPcm(samples), buf.spare_capacity_mut())
            .map_err(|e| Error::Encoder(format!("LAME encode: {:?}", e)))?;

        if written == 0 {
            return Ok(Vec::new());
        }

        // SAFETY: LAME initialised exactly `written` bytes of the spare capacity.
        unsafe {
            buf.set_len(written);
        }

        Ok(vec![EncodedChunk::payload(Bytes::from(buf))])
    }

    /// Configured sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn bitrate(kbps: u32) -> Result<Bitrate> {
    let bitrate = match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            return Err(Error::Encoder(format!(
                "unsupported MP3 bitrate: {} kbit/s",
                other
            )))
        }
    };
    Ok(bitrate)
}

fn quality(level: u8) -> Quality {
    match level {
        0 => Quality::Best,
        1 => Quality::SecondBest,
        2 => Quality::NearBest,
        3 => Quality::VeryNice,
        4 => Quality::Nice,
        5 => Quality::Good,
        6 => Quality::Decent,
        7 => Quality::Ok,
        8 => Quality::SecondWorst,
        _ => Quality::Worst,
    }
}
