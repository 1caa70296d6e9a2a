//! Result formatting for each dialect
//!
//! Every formatter turns a driver-native result into the text shown to the
//! user:
//! - `redis`: `redis-cli` conventions (`(nil)`, numbered array lines)
//! - `sql`: boxed tables for row sets, one-line summaries otherwise
//! - `mongo`: bare scalars, pretty JSON for documents and arrays
//!
//! Formatters are pure and never fail.

pub mod mongo;
pub mod redis;
pub mod sql;

pub use mongo::format_bson;
pub use redis::format_value as format_redis;
pub use sql::{ExecSummary, RowSet, SqlOutput, format_output as format_sql};
