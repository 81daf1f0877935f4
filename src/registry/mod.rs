//! Subscriber registry and per-client senders
//!
//! Every client of a service is a [`Subscriber`]. Live subscribers are pushed
//! to by the producer; catch-up subscribers pull from the audio cache on their
//! own task.
//!
//! # Architecture
//!
//! ```text
//!                   BroadcastHandler
//!          ┌──────────────────────────────────┐
//!          │ subscribers: SubscriberRegistry  │
//!          │ cache:       AudioCache          │
//!          └───────┬───────────────────▲──────┘
//!                  │ deliver()         │ read_chunk()
//!        ┌─────────┴───────┐     ┌─────┴───────────┐
//!        ▼                 ▼     │                 │
//!   [Live #1]         [Live #3] [CatchUp #2]  [CatchUp #4]
//!        │                 │     │                 │
//!        └──► TCP          └──► TCP ◄──────────────┘
//! ```
//!
//! # Zero-Copy Design
//!
//! Encoded chunks are `bytes::Bytes`, so every live subscriber writes from the
//! same reference-counted allocation.

pub mod store;
pub mod subscriber;

pub use store::SubscriberRegistry;
pub use subscriber::{
    BoxedConnection, ChunkSource, SenderState, SubscribeMode, Subscriber, SubscriberId,
};
