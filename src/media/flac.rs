//! FLAC encoding through libFLAC
//!
//! libFLAC writes the `fLaC` marker and STREAMINFO block during stream
//! initialisation. Those bytes are captured once and attached as the header of
//! the first encoded chunk.

use std::ffi::c_void;

use bytes::Bytes;
use libflac_sys::*;

use super::encoder::{EncodedChunk, EncoderOptions, CHANNELS};
use crate::error::{Error, Result};

const BITS_PER_SAMPLE: u32 = 16;

/// Bytes handed over by the libFLAC write callback
#[derive(Default)]
struct WriteSink {
    pending: Vec<u8>,
}

/// libFLAC-backed FLAC encoder
pub struct FlacEncoder {
    encoder: *mut FLAC__StreamEncoder,
    /// Boxed so the client-data pointer given to libFLAC stays valid
    sink: Box<WriteSink>,
    header: Option<Bytes>,
    sample_rate: u32,
}

// SAFETY: the libFLAC encoder and its sink are owned exclusively by this value
// and only touched through `&mut self`; nothing is shared with other threads.
unsafe impl Send for FlacEncoder {}

impl FlacEncoder {
    /// Create and initialise a streaming libFLAC encoder
    pub fn new(sample_rate: u32, options: &EncoderOptions) -> Result<Self> {
        let encoder = unsafe { FLAC__stream_encoder_new() };
        if encoder.is_null() {
            return Err(Error::Encoder(
                "FLAC__stream_encoder_new returned null".into(),
            ));
        }

        // From here on Drop releases the encoder
        let mut this = Self {
            encoder,
            sink: Box::default(),
            header: None,
            sample_rate,
        };

        let ensure = |ok: FLAC__bool, what: &str| {
            if ok == 0 {
                Err(Error::Encoder(format!("libFLAC {} failed", what)))
            } else {
                Ok(())
            }
        };

        unsafe {
            ensure(
                FLAC__stream_encoder_set_channels(encoder, u32::from(CHANNELS)),
                "set_channels",
            )?;
            ensure(
                FLAC__stream_encoder_set_bits_per_sample(encoder, BITS_PER_SAMPLE),
                "set_bits_per_sample",
            )?;
            ensure(
                FLAC__stream_encoder_set_sample_rate(encoder, sample_rate),
                "set_sample_rate",
            )?;
            ensure(
                FLAC__stream_encoder_set_compression_level(
                    encoder,
                    options.flac_compression_level,
                ),
                "set_compression_level",
            )?;
            ensure(
                FLAC__stream_encoder_set_streamable_subset(encoder, 1),
                "set_streamable_subset",
            )?;

            let client_data = &mut *this.sink as *mut WriteSink as *mut c_void;
            let status = FLAC__stream_encoder_init_stream(
                encoder,
                Some(write_callback),
                None,
                None,
                None,
                client_data,
            );
            if status != FLAC__STREAM_ENCODER_INIT_STATUS_OK {
                return Err(Error::Encoder(format!(
                    "libFLAC init_stream failed: status {}",
                    status
                )));
            }
        }

        let header = std::mem::take(&mut this.sink.pending);
        this.header = Some(Bytes::from(header));

        tracing::debug!(
            sample_rate = sample_rate,
            compression_level = options.flac_compression_level,
            "libFLAC encoder initialised"
        );

        Ok(this)
    }

    /// Encode interleaved stereo samples
    ///
    /// libFLAC emits whole frames only, so small batches may produce nothing.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Vec<EncodedChunk>> {
        let frames = samples.len() / CHANNELS as usize;
        if frames == 0 {
            return Ok(Vec::new());
        }

        let pcm: Vec<i32> = samples[..frames * CHANNELS as usize]
            .iter()
            .map(|&s| i32::from(s))
            .collect();

        let ok = unsafe {
            FLAC__stream_encoder_process_interleaved(self.encoder, pcm.as_ptr(), frames as u32)
        };
        if ok == 0 {
            return Err(Error::Encoder("libFLAC reported encode failure".into()));
        }

        let payload = std::mem::take(&mut self.sink.pending);
        if payload.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![EncodedChunk {
            header: self.header.take(),
            payload: Bytes::from(payload),
        }])
    }

    /// Configured sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for FlacEncoder {
    fn drop(&mut self) {
        unsafe {
            if !self.encoder.is_null() {
                FLAC__stream_encoder_finish(self.encoder);
                FLAC__stream_encoder_delete(self.encoder);
            }
        }
    }
}

unsafe extern "C" fn write_callback(
    _encoder: *const FLAC__StreamEncoder,
    buffer: *const FLAC__byte,
    bytes: usize,
    _samples: u32,
    _current_frame: u32,
    client_data: *mut c_void,
) -> FLAC__StreamEncoderWriteStatus {
    let sink = &mut *(client_data as *mut WriteSink);
    let slice = std::slice::from_raw_parts(buffer, bytes);
    sink.pending.extend_from_slice(slice);
    FLAC__STREAM_ENCODER_WRITE_STATUS_OK
}
