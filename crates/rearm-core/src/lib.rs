//! Shared domain types, configuration and errors for Rearm.

pub mod config;
pub mod error;
pub mod types;

pub use config::RearmConfig;
pub use error::{RearmError, Result};
pub use types::*;
