//! Cabin core crate - configuration, error types, the response stream
//! channel, and knowledge-base types shared by every other crate.

pub mod config;
pub mod error;
pub mod stream;
pub mod types;

pub use config::CabinConfig;
pub use error::{CabinError, Result};
pub use stream::{ResponseSink, StreamEvent, StreamReceiver};
pub use types::*;
