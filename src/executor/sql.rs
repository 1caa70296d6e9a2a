//! SQL dispatch
//!
//! Each session owns one dedicated MySQL connection so `USE` and session
//! variables persist between commands. Statements run verbatim over the text
//! protocol.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TableStyle;
use crate::error::{ConnectionError, DriverExecutionError, Result, ShellError};
use crate::error::driver::from_sqlx_error;
use crate::formatter::{ExecSummary, RowSet, SqlOutput, format_sql};
use crate::parser::sql::{StatementKind, changed_database, classify};
use crate::pool::{ConnectionPool, Connector, PoolKey};

use super::ExecutionOutcome;

/// Pooled SQL handle: one connection, serialized per session
pub type SqlHandle = Arc<Mutex<MySqlConnection>>;

/// Opens dedicated MySQL connections
#[derive(Debug, Clone)]
pub struct SqlConnector {
    connect_timeout: Duration,
}

impl SqlConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn connect_options(key: &PoolKey) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new().host(&key.host).port(key.port);
        if let Some(user) = &key.username {
            options = options.username(user);
        }
        if let Some(password) = &key.password {
            options = options.password(password.expose());
        }
        if let Some(db) = key.database.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            options = options.database(db);
        }
        options
    }
}

#[async_trait]
impl Connector for SqlConnector {
    type Handle = SqlHandle;

    async fn connect(&self, key: &PoolKey) -> Result<Self::Handle> {
        let options = Self::connect_options(key);
        let conn = match tokio::time::timeout(self.connect_timeout, options.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(ConnectionError::ConnectionFailed {
                    target: key.to_string(),
                    message: e.to_string(),
                }
                .into());
            }
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    target: key.to_string(),
                    seconds: self.connect_timeout.as_secs(),
                }
                .into());
            }
        };
        Ok(Arc::new(Mutex::new(conn)))
    }

    async fn close(&self, handle: Self::Handle) {
        // A command still holding the handle closes it on drop instead.
        if let Ok(conn) = Arc::try_unwrap(handle) {
            if let Err(e) = conn.into_inner().close().await {
                warn!("Error closing MySQL connection: {}", e);
            }
        }
    }
}

fn statement_error(error: &sqlx::Error, statement: &str) -> ShellError {
    DriverExecutionError::new("mysql", from_sqlx_error(error))
        .with_statement(statement)
        .into()
}

/// Run one statement on the session's connection
pub async fn execute(
    pool: &ConnectionPool<SqlConnector>,
    key: &PoolKey,
    statement: &str,
    style: TableStyle,
) -> Result<ExecutionOutcome> {
    let kind = classify(statement);
    let handle = pool.acquire(key).await?;
    let mut conn = handle.lock().await;

    let start = Instant::now();
    let output = if kind.returns_rows() {
        let rows = sqlx::raw_sql(statement)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| statement_error(&e, statement))?;
        SqlOutput::Rows(row_set(&rows))
    } else {
        let result = sqlx::raw_sql(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| statement_error(&e, statement))?;
        // The driver reports one row counter, so there is no separate matched count.
        SqlOutput::Summary(ExecSummary {
            kind,
            rows_affected: result.rows_affected(),
            matched_rows: None,
            last_insert_id: result.last_insert_id(),
        })
    };
    debug!(
        kind = %kind,
        "SQL statement completed in {}ms",
        start.elapsed().as_millis()
    );

    let changed = if kind == StatementKind::Use {
        let selected: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| statement_error(&e, "SELECT DATABASE()"))?;
        let changed = changed_database(kind, statement, selected);
        if let Some(db) = &changed {
            pool.select_database(key, db.as_str()).await;
            info!(key = %key, "Session switched to database '{}'", db);
        }
        changed
    } else {
        None
    };

    Ok(ExecutionOutcome {
        rendered_text: format_sql(&output, style),
        changed_database: changed,
    })
}

/// Column names and text cells of a result
fn row_set(rows: &[MySqlRow]) -> RowSet {
    let Some(first) = rows.first() else {
        return RowSet::default();
    };

    RowSet {
        columns: first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
        rows: rows
            .iter()
            .map(|row| (0..row.columns().len()).map(|i| render_cell(row, i)).collect())
            .collect(),
    }
}

/// Decode one cell as text, trying the column's Rust types in order
fn render_cell(row: &MySqlRow, idx: usize) -> Option<String> {
    macro_rules! try_as {
        ($ty:ty, $render:expr) => {
            if let Ok(v) = row.try_get::<Option<$ty>, _>(idx) {
                return v.map($render);
            }
        };
    }

    try_as!(u64, |v: u64| v.to_string());
    try_as!(i64, |v: i64| v.to_string());
    try_as!(i32, |v: i32| v.to_string());
    try_as!(u32, |v: u32| v.to_string());
    try_as!(i16, |v: i16| v.to_string());
    try_as!(u16, |v: u16| v.to_string());
    try_as!(i8, |v: i8| v.to_string());
    try_as!(u8, |v: u8| v.to_string());
    try_as!(bool, |v: bool| String::from(if v { "1" } else { "0" }));
    try_as!(f64, |v: f64| v.to_string());
    try_as!(f32, |v: f32| v.to_string());
    try_as!(Decimal, |v: Decimal| v.to_string());
    try_as!(String, |v: String| v);
    try_as!(chrono::DateTime<chrono::Utc>, |v: chrono::DateTime<chrono::Utc>| {
        v.format("%Y-%m-%d %H:%M:%S").to_string()
    });
    try_as!(chrono::NaiveDateTime, |v: chrono::NaiveDateTime| {
        v.format("%Y-%m-%d %H:%M:%S").to_string()
    });
    try_as!(chrono::NaiveDate, |v: chrono::NaiveDate| v.format("%Y-%m-%d").to_string());
    try_as!(chrono::NaiveTime, |v: chrono::NaiveTime| v.format("%H:%M:%S").to_string());
    try_as!(serde_json::Value, |v: serde_json::Value| v.to_string());
    try_as!(Vec<u8>, |v: Vec<u8>| match String::from_utf8(v) {
        Ok(text) => text,
        Err(e) => format!("0x{}", hex::encode(e.into_bytes())),
    });

    let type_name = row.columns()[idx].type_info().name().to_string();
    Some(format!("<{type_name}>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{BackendKind, Secret};

    #[test]
    fn test_connect_options_from_key() {
        let key = PoolKey::new(BackendKind::Relational, "db.internal", 3307)
            .with_credentials(Some("app".into()), Some(Secret::new("pw")))
            .with_database(Some(" shop ".into()));
        let options = SqlConnector::connect_options(&key);
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("shop"));
    }

    #[test]
    fn test_empty_row_set() {
        assert_eq!(row_set(&[]), RowSet::default());
    }
}
