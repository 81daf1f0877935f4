//! Error types
//!
//! Errors surfaced by the broadcast handler and its subscribers.

use std::io;

use crate::media::OutputCodec;
use crate::registry::SubscriberId;

/// Error type for broadcast operations
#[derive(Debug)]
pub enum Error {
    /// Connection-level I/O failure
    Io(io::Error),
    /// The requested codec has no backend compiled into this build
    UnsupportedCodec(OutputCodec),
    /// Encoder initialisation or encoding failed
    Encoder(String),
    /// Configuration rejected by validation
    InvalidConfig(String),
    /// The subscriber was already terminated
    SubscriberTerminated(SubscriberId),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::UnsupportedCodec(codec) => {
                write!(f, "Output codec {} is not available in this build", codec)
            }
            Error::Encoder(msg) => write!(f, "Encoder error: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::SubscriberTerminated(id) => write!(f, "Subscriber terminated: {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
