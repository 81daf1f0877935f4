//! Decoder callback contract
//!
//! The upstream DAB decoder drives one [`ProgrammeHandler`] per service from a
//! single producer task. Every callback is infallible: malformed input is
//! absorbed by the implementation.

use std::future::Future;

use bytes::Bytes;

/// A MOT object as delivered by the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotFile {
    /// Object body
    pub data: Bytes,
    /// MOT content subtype (0x01 JPEG, 0x03 PNG)
    pub content_sub_type: u16,
}

/// Receiver of decoded programme data
///
/// All methods have no-op defaults so implementations only override what
/// they consume.
pub trait ProgrammeHandler: Send + Sync + 'static {
    /// Superframe sync errors since the last call
    fn on_frame_errors(&self, count: u32) -> impl Future<Output = ()> + Send {
        let _ = count;
        async {}
    }

    /// A batch of decoded interleaved 16-bit PCM
    ///
    /// `mode` describes the channel layout as the decoder reports it.
    fn on_new_audio(
        &self,
        samples: Vec<i16>,
        sample_rate: u32,
        mode: &str,
    ) -> impl Future<Output = ()> + Send {
        let _ = (samples, sample_rate, mode);
        async {}
    }

    /// Result of Reed-Solomon decoding of one block
    fn on_rs_errors(&self, uncorrected: bool, corrected: u32) -> impl Future<Output = ()> + Send {
        let _ = (uncorrected, corrected);
        async {}
    }

    /// AAC frames that failed to decode
    fn on_aac_errors(&self, count: u32) -> impl Future<Output = ()> + Send {
        let _ = count;
        async {}
    }

    /// A dynamic label (DLS) was received
    fn on_new_dynamic_label(&self, label: &str) -> impl Future<Output = ()> + Send {
        let _ = label;
        async {}
    }

    /// A MOT object (slideshow image) was received
    fn on_mot(&self, file: &MotFile) -> impl Future<Output = ()> + Send {
        let _ = file;
        async {}
    }

    /// X-PAD length did not match what the PAD header announced
    fn on_pad_length_error(&self, announced: usize, actual: usize) -> impl Future<Output = ()> + Send {
        let _ = (announced, actual);
        async {}
    }
}
