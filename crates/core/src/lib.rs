//! `taskdeck-core` — shared building blocks for the taskdeck crates.
//!
//! Identifiers and the configuration error model.

pub mod error;
pub mod id;

pub use error::{ConfigError, ConfigResult};
pub use id::UserId;
