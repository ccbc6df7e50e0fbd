//! Shared configuration, error and parameter types for the Palaver workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::{expand_home, PalaverConfig};
pub use error::{PalaverError, Result};
pub use types::*;
