//! Core types: channel names, tracing setup

pub mod channel;
pub mod tracing;

pub use channel::{Channel, ChannelError, MAX_CHANNEL_LEN, NULL_CHANNEL, QUEUE_PREFIX};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
