//! Per-service broadcast handling
//!
//! [`BroadcastHandler`] is the coordinator for one radio service. The decoder
//! drives it through the [`ProgrammeHandler`] callbacks; clients attach to it
//! as live or catch-up subscribers.

pub mod callbacks;
pub mod config;
pub mod metadata;
pub mod programme;

pub use callbacks::{MotFile, ProgrammeHandler};
pub use config::HandlerConfig;
pub use metadata::{
    AudioFormat, AudioLevels, DynamicLabel, ErrorCounters, MotImage, SlideshowImage, XpadError,
};
pub use programme::BroadcastHandler;
