//! Live audio fan-out for DAB radio services
//!
//! One [`BroadcastHandler`] per service takes decoded PCM and metadata from the
//! decoder, encodes the audio and streams it to any number of clients:
//!
//! - **Live** subscribers are pushed every encoded chunk as it is produced.
//! - **Catch-up** subscribers replay from a rolling cache, starting a chosen
//!   number of bytes before the live edge, and pull at their own pace.
//!
//! Dynamic labels and slideshow images are kept in time-windowed histories so
//! a presentation layer can show what was on air at any point of the replay.
//!
//! # Example
//!
//! ```no_run
//! use dab_fanout::{BroadcastHandler, HandlerConfig, OutputCodec, ProgrammeHandler, SubscribeMode};
//! use tokio::net::TcpListener;
//! use std::sync::Arc;
//!
//! # async fn run() -> dab_fanout::Result<()> {
//! let handler = Arc::new(BroadcastHandler::new(0x4daa, OutputCodec::Wav, HandlerConfig::default())?);
//!
//! // Decoder side
//! handler.on_new_audio(vec![0i16; 2304], 48_000, "Stereo").await;
//!
//! // Client side
//! let listener = TcpListener::bind("0.0.0.0:7979").await?;
//! let (socket, _) = listener.accept().await?;
//! handler.serve(Box::new(socket), SubscribeMode::CatchUp { rewind_bytes: 64 * 1024 }).await;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod error;
pub mod handler;
pub mod media;
pub mod registry;
pub mod stats;

pub use error::{Error, Result};
pub use handler::{BroadcastHandler, HandlerConfig, MotFile, ProgrammeHandler};
pub use media::{EncoderOptions, MotType, OutputCodec};
pub use registry::{SenderState, SubscribeMode, SubscriberId};
pub use stats::HandlerStats;
