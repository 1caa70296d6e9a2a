//! Command parsers for each dialect
//!
//! - `redis`: quote-aware tokenizer for `redis-cli` style lines
//! - `sql`: leading-keyword statement classifier
//! - `mongo`: structural parser for `db.<collection>.<op>(...)` shell syntax
//!
//! All parsers are pure functions over the command text.
//!
//! # Examples
//!
//! ```
//! use dbshell::parser::{redis, sql, mongo};
//!
//! assert_eq!(redis::tokenize("GET k"), vec!["GET", "k"]);
//! assert_eq!(sql::classify("select 1"), sql::StatementKind::Query);
//! assert_eq!(mongo::parse("show dbs").unwrap().operation, "show");
//! ```

pub mod mongo;
pub mod redis;
pub mod sql;

pub use mongo::{ChainedOperation, ParsedCommand, ShellValue};
pub use sql::StatementKind;
