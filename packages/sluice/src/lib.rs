//! Unbounded async handshake channel with opt-in backpressure, requeueing, and sticky terminal
//! states
//!
//! See the [docs](crate::docs) and [`Channel`].

#[macro_use]
extern crate tracing;

mod channel;
pub mod docs;

pub use crate::channel::api::*;

/// Error types
pub mod error {
    pub use crate::channel::error::*;
}

/// Future types
pub mod future {
    pub use crate::channel::api::future::*;
}
