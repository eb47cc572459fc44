//! Live notification hub client.
//!
//! - [`protocol`]: record framing and message decoding
//! - [`channel`]: connection lifecycle, keep-alive and auto-reconnect

pub mod channel;
pub mod protocol;

pub use channel::{ConnectionState, PushChannel, PushConfig, Subscription};
