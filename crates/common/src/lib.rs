//! Common utilities and types shared across the chainhealth crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
