//! Utilities module for logging and error handling

pub mod error;
pub mod logging;

pub use error::{CropScanError, Result};
pub use logging::{init_logging, LogConfig, LogLevel};
