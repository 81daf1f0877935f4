//! Handler statistics

pub mod metrics;

pub use metrics::HandlerStats;
