//! Command execution engine
//!
//! This module is the single entry point for running a raw command:
//! - Resolves the connection id to a pool key for the session
//! - Routes to the dialect dispatcher (`sql`, `redis`, `mongo`)
//! - Returns rendered text and any database change
//!
//! Errors from every stage surface here as one [`ShellError`](crate::error::ShellError).

pub mod mongo;
pub mod redis;
pub mod resolver;
pub mod sql;

pub use resolver::{ConnectionResolver, ConnectionTarget, StaticResolver};

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{Config, TableStyle};
use crate::error::{Result, ShellError};
use crate::pool::{BackendKind, ConnectionPool, PoolSettings};

use self::mongo::MongoConnector;
use self::redis::RedisConnector;
use self::sql::SqlConnector;

/// One command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub backend: BackendKind,
    /// Logical connection, resolved through the [`ConnectionResolver`]
    pub connection_id: String,
    /// Terminal session; sessions never share connections
    pub session_id: String,
    pub command: String,
}

impl CommandRequest {
    pub fn new(
        backend: BackendKind,
        connection_id: impl Into<String>,
        session_id: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            connection_id: connection_id.into(),
            session_id: session_id.into(),
            command: command.into(),
        }
    }
}

/// Result of a successful command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutcome {
    pub rendered_text: String,
    /// Set by SQL `USE`, Mongo `use` and Redis `SELECT <n>`
    pub changed_database: Option<String>,
}

/// Runs commands against pooled connections
pub struct Executor {
    resolver: Arc<dyn ConnectionResolver>,
    sql: Arc<ConnectionPool<SqlConnector>>,
    redis: Arc<ConnectionPool<RedisConnector>>,
    mongo: Arc<ConnectionPool<MongoConnector>>,
    table_style: TableStyle,
}

impl Executor {
    /// Create an executor with one pool per dialect
    ///
    /// # Arguments
    /// * `config` - Pool and display settings
    /// * `resolver` - Maps connection ids to targets
    pub fn new(config: &Config, resolver: Arc<dyn ConnectionResolver>) -> Self {
        let settings = PoolSettings::from(&config.pool);
        let timeout = settings.connect_timeout;

        Self {
            resolver,
            sql: Arc::new(ConnectionPool::new(SqlConnector::new(timeout), settings.clone())),
            redis: Arc::new(ConnectionPool::new(RedisConnector, settings.clone())),
            mongo: Arc::new(ConnectionPool::new(MongoConnector::new(timeout), settings)),
            table_style: config.display.table_style,
        }
    }

    /// Executor resolving ids against the config's connection profiles
    pub fn from_config(config: &Config) -> Self {
        Self::new(config, Arc::new(StaticResolver::from_config(config)))
    }

    /// Start the idle sweepers of all pools
    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.sql.spawn_sweeper(),
            self.redis.spawn_sweeper(),
            self.mongo.spawn_sweeper(),
        ]
    }

    /// Execute one raw command
    ///
    /// # Arguments
    /// * `request` - Backend, connection id, session id and command text
    ///
    /// # Returns
    /// * `Result<ExecutionOutcome>` - Rendered text and database change, or the first error
    pub async fn execute(&self, request: &CommandRequest) -> Result<ExecutionOutcome> {
        debug!(
            backend = %request.backend,
            session = %request.session_id,
            "Executing command: {}",
            request.command
        );
        let start = Instant::now();

        let target = self
            .resolver
            .resolve(request.backend, &request.connection_id)
            .await?;
        let key = target.pool_key(&request.session_id);

        let result = match request.backend {
            BackendKind::Relational => {
                sql::execute(&self.sql, &key, &request.command, self.table_style).await
            }
            BackendKind::KeyValue => redis::execute(&self.redis, &key, &request.command).await,
            BackendKind::Document => mongo::execute(&self.mongo, &key, &request.command).await,
        };

        debug!("Command executed in {}ms", start.elapsed().as_millis());
        if let Err(ShellError::Driver(e)) = &result {
            let info = e.info.to_json_compact().unwrap_or_default();
            warn!(
                backend = e.backend,
                code = ?e.info.code(),
                session = %request.session_id,
                "Command rejected by server: {}",
                info
            );
        }
        result
    }

    /// Close every connection owned by `session_id`
    pub async fn close_session(&self, session_id: &str) -> usize {
        self.sql.remove_session(session_id).await
            + self.redis.remove_session(session_id).await
            + self.mongo.remove_session(session_id).await
    }

    /// Stop the sweepers and close all connections
    pub async fn shutdown(&self) {
        self.sql.shutdown().await;
        self.redis.shutdown().await;
        self.mongo.shutdown().await;
    }
}
