//! dbshell library
//!
//! A multi-dialect command interpreter: free-form commands typed against a
//! MySQL, Redis or MongoDB connection are parsed, run on a session-scoped
//! pooled connection and rendered as CLI-style text.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `executor`: Command execution engine and connection resolution
//! - `formatter`: Result rendering per dialect
//! - `parser`: Redis tokenizer, SQL classifier and Mongo shell parser
//! - `pool`: Session-scoped connection pool
//! - `repl`: Interactive line loop
//!
//! # Example
//!
//! ```no_run
//! use dbshell::{CommandRequest, Config, Executor, pool::BackendKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let executor = Executor::from_config(&config);
//!
//!     let request = CommandRequest::new(BackendKind::Document, "local", "tab-1", "use shop");
//!     let outcome = executor.execute(&request).await?;
//!     println!("{}", outcome.rendered_text);
//!
//!     executor.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod parser;
pub mod pool;
pub mod repl;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, ShellError};
pub use executor::{CommandRequest, ExecutionOutcome, Executor};
pub use pool::{BackendKind, ConnectionPool, PoolKey};
pub use repl::ReplEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
