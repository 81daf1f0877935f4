//! Codec and content type identifiers

/// Output codec used to re-encode a service's audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputCodec {
    /// MPEG-1 Layer III via LAME
    Mp3,
    /// Free Lossless Audio Codec via libFLAC
    Flac,
    /// Uncompressed 16-bit PCM in a streaming RIFF/WAVE container
    Wav,
}

impl OutputCodec {
    /// Check whether a backend for this codec is compiled in
    pub fn is_available(self) -> bool {
        match self {
            OutputCodec::Mp3 => cfg!(feature = "mp3"),
            OutputCodec::Flac => cfg!(feature = "flac"),
            OutputCodec::Wav => true,
        }
    }

    /// MIME type to advertise to clients
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputCodec::Mp3 => "audio/mpeg",
            OutputCodec::Flac => "audio/flac",
            OutputCodec::Wav => "audio/wav",
        }
    }

    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            OutputCodec::Mp3 => "mp3",
            OutputCodec::Flac => "flac",
            OutputCodec::Wav => "wav",
        }
    }
}

impl std::fmt::Display for OutputCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputCodec::Mp3 => "MP3",
            OutputCodec::Flac => "FLAC",
            OutputCodec::Wav => "WAV",
        };
        f.write_str(name)
    }
}

/// Image type of a MOT slideshow object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MotType {
    /// JFIF (JPEG) image
    Jpeg,
    /// PNG image
    Png,
    /// Any other content subtype
    #[default]
    Unknown,
}

impl MotType {
    /// Classify a MOT content subtype code (ETSI TS 101 756, image subtypes)
    pub fn from_content_sub_type(sub_type: u16) -> Self {
        match sub_type {
            0x01 => MotType::Jpeg,
            0x03 => MotType::Png,
            _ => MotType::Unknown,
        }
    }

    /// MIME type to advertise to clients, if known
    pub fn mime_type(self) -> Option<&'static str> {
        match self {
            MotType::Jpeg => Some("image/jpeg"),
            MotType::Png => Some("image/png"),
            MotType::Unknown => None,
        }
    }
}
