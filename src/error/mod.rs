//! Error handling for command interpretation.
//!
//! This module provides:
//! - The [`ShellError`] taxonomy surfaced at the execute boundary
//! - Structured error information extracted from MySQL, Redis and MongoDB
//!   driver errors
//! - Consistent JSON error formatting for logging and API layers
//!
//! # Example
//!
//! ```rust,no_run
//! use dbshell::error::{Result, ShellError, ParseError};
//!
//! fn reject(text: &str) -> Result<()> {
//!     Err(ParseError::UnsupportedCommand(text.to_string()).into())
//! }
//! ```

pub mod driver;
pub mod kinds;

// Re-export commonly used types
pub use driver::{ErrorDetails, ErrorInfo};
pub use kinds::{
    ConfigError, ConnectionError, DriverExecutionError, ParseError, Result, ShellError,
    UnsupportedOperation,
};
