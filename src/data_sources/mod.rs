//! Remote services the dashboard reads from.
//!
//! # Data Sources
//!
//! - [`complaints`]: the complaint backend, one collection endpoint per role
//! - [`generative`]: the generative-language API behind the assistant chat

pub mod complaints;
pub mod generative;

pub use complaints::ComplaintsClient;
pub use generative::GenerativeClient;
