//! MongoDB dispatch
//!
//! A parsed shell command is routed to one of three places:
//! - `use` / `show`: handled here and in [`admin`]
//! - `db.<op>(...)`: the admin operation table
//! - `db.<collection>.<op>(...)`: chainable queries or the immediate
//!   operation table of a [`LooseModel`]
//!
//! The pooled handle is a [`MongoSession`]: a client plus the database the
//! session currently points at. `use` records the database with the pool and
//! swaps the pooled handle for one bound to it on the same client, so a
//! reconnect after eviction lands in the same database.

mod admin;
mod chain;
mod model;

pub use chain::{FindQuery, PopulateSpec, Terminal};
pub use model::LooseModel;

use async_trait::async_trait;
use mongodb::bson::{Bson, doc};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::{Client, Database};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, ParseError, Result, UnsupportedOperation};
use crate::formatter::format_bson;
use crate::parser::mongo::{ParsedCommand, parse};
use crate::pool::{ConnectionPool, Connector, PoolKey};

use super::ExecutionOutcome;

/// Database used when a profile names none
pub const DEFAULT_DATABASE: &str = "test";

/// Pooled Mongo handle
#[derive(Debug, Clone)]
pub struct MongoSession {
    client: Client,
    database: Database,
}

impl MongoSession {
    pub fn new(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    /// Same client, different database
    pub fn with_database(&self, name: &str) -> Self {
        Self::new(self.client.clone(), name)
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    fn model(&self, collection: &str) -> LooseModel {
        LooseModel::bind(&self.client, &self.database, collection)
    }
}

/// Opens Mongo clients and checks them with a ping
#[derive(Debug, Clone)]
pub struct MongoConnector {
    connect_timeout: Duration,
}

impl MongoConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn client_options(&self, key: &PoolKey) -> Result<ClientOptions> {
        let address = ServerAddress::parse(key.address()).map_err(|e| {
            ConnectionError::ConnectionFailed {
                target: key.to_string(),
                message: e.to_string(),
            }
        })?;

        let mut options = ClientOptions::default();
        options.hosts = vec![address];
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);

        if key.username.is_some() || key.password.is_some() {
            let mut credential = Credential::default();
            credential.username = key.username.clone();
            credential.password = key.password.as_ref().map(|p| p.expose().to_string());
            options.credential = Some(credential);
        }

        Ok(options)
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Handle = MongoSession;

    async fn connect(&self, key: &PoolKey) -> Result<Self::Handle> {
        let failed = |e: mongodb::error::Error| ConnectionError::ConnectionFailed {
            target: key.to_string(),
            message: e.to_string(),
        };

        let client = Client::with_options(self.client_options(key)?).map_err(failed)?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(failed)?;

        let database = session_database(key);
        debug!("Connected to MongoDB at {} (database '{}')", key.address(), database);

        Ok(MongoSession::new(client, database))
    }
}

/// Database a new connection for `key` starts in
fn session_database(key: &PoolKey) -> &str {
    key.database
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DATABASE)
}

/// Run one shell command on the session's client
pub async fn execute<C>(
    pool: &ConnectionPool<C>,
    key: &PoolKey,
    command: &str,
) -> Result<ExecutionOutcome>
where
    C: Connector<Handle = MongoSession>,
{
    let parsed = parse(command)?;
    let session = pool.acquire(key).await?;

    let start = Instant::now();
    let mut changed_database = None;
    let value = if parsed.is_collection_op() {
        run_collection_command(&session, parsed).await?
    } else {
        match parsed.operation.as_str() {
            "use" => {
                let name = first_string(&parsed, "a database name")?;
                pool.select_database(key, name.as_str()).await;
                pool.replace(key, session.with_database(&name)).await?;
                info!(key = %key, "Session switched to database '{}'", name);
                let message = format!("switched to db {name}");
                changed_database = Some(name);
                Bson::String(message)
            }
            "show" => {
                let target = first_string(&parsed, "a show target")?;
                admin::show(&session, &target).await?
            }
            operation => admin::run(&session, operation, parsed.args).await?,
        }
    };
    debug!(
        db = session.database_name(),
        "MongoDB command completed in {}ms",
        start.elapsed().as_millis()
    );

    Ok(ExecutionOutcome {
        rendered_text: format_bson(&value),
        changed_database,
    })
}

async fn run_collection_command(session: &MongoSession, parsed: ParsedCommand) -> Result<Bson> {
    let model = session.model(&parsed.collection);

    if chain::is_chainable(&parsed.operation) {
        let mut query = FindQuery::from_primary(&parsed.operation, parsed.args)?;
        query.apply_chain(parsed.chained_operations)?;
        return query.materialize(&model).await;
    }

    if !model::is_immediate(&parsed.operation) {
        return Err(UnsupportedOperation::Operation(parsed.operation).into());
    }

    if !parsed.chained_operations.is_empty() {
        let methods: Vec<&str> = parsed
            .chained_operations
            .iter()
            .map(|op| op.method.as_str())
            .collect();
        warn!(
            "Ignoring chained methods [{}] after immediate operation '{}'",
            methods.join(", "),
            parsed.operation
        );
    }

    model.run(&parsed.operation, parsed.args).await
}

fn first_string(parsed: &ParsedCommand, what: &str) -> Result<String> {
    parsed
        .args
        .first()
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ParseError::invalid_argument(&parsed.operation, format!("{what} is required")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{BackendKind, PoolSettings, Secret};

    /// Builds clients without pinging; the driver connects lazily
    struct LazyConnector;

    #[async_trait]
    impl Connector for LazyConnector {
        type Handle = MongoSession;

        async fn connect(&self, key: &PoolKey) -> Result<Self::Handle> {
            let options = MongoConnector::new(Duration::from_millis(100)).client_options(key)?;
            let client = Client::with_options(options)?;
            Ok(MongoSession::new(client, session_database(key)))
        }
    }

    fn session_key() -> PoolKey {
        PoolKey::new(BackendKind::Document, "localhost", 27017)
            .with_database(Some("app".into()))
            .with_session("tab-1")
    }

    #[test]
    fn test_client_options_from_key() {
        let key = PoolKey::new(BackendKind::Document, "mongo.internal", 27018)
            .with_credentials(Some("app".into()), Some(Secret::new("pw")));
        let options = MongoConnector::new(Duration::from_secs(3))
            .client_options(&key)
            .unwrap();

        assert_eq!(options.hosts.len(), 1);
        assert_eq!(options.hosts[0].to_string(), "mongo.internal:27018");
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(3)));
        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("app"));
        assert_eq!(credential.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_client_options_without_credentials() {
        let key = PoolKey::new(BackendKind::Document, "localhost", 27017);
        let options = MongoConnector::new(Duration::from_secs(1))
            .client_options(&key)
            .unwrap();
        assert!(options.credential.is_none());
    }

    #[test]
    fn test_first_string() {
        let parsed = parse("use shop").unwrap();
        assert_eq!(first_string(&parsed, "a database name").unwrap(), "shop");

        let parsed = parse("db.runCommand()").unwrap();
        assert!(first_string(&parsed, "x").is_err());
    }

    #[test]
    fn test_session_database_defaults() {
        let key = PoolKey::new(BackendKind::Document, "localhost", 27017);
        assert_eq!(session_database(&key), DEFAULT_DATABASE);
        assert_eq!(session_database(&key.clone().with_database(Some("  ".into()))), DEFAULT_DATABASE);
        assert_eq!(session_database(&key.with_database(Some("shop".into()))), "shop");
    }

    #[tokio::test]
    async fn test_use_switches_session_database() {
        let pool = ConnectionPool::new(LazyConnector, PoolSettings::default());
        let key = session_key();
        assert_eq!(pool.acquire(&key).await.unwrap().database_name(), "app");

        let outcome = execute(&pool, &key, "use otherdb").await.unwrap();
        assert_eq!(outcome.rendered_text, "switched to db otherdb");
        assert_eq!(outcome.changed_database.as_deref(), Some("otherdb"));

        let session = pool.acquire(&key).await.unwrap();
        assert_eq!(session.database_name(), "otherdb");
        assert_eq!(session.model("users").collection().namespace().db, "otherdb");
    }

    #[tokio::test]
    async fn test_use_survives_idle_eviction() {
        let pool = ConnectionPool::new(LazyConnector, PoolSettings::default());
        let key = session_key();
        execute(&pool, &key, "use otherdb").await.unwrap();

        let later = tokio::time::Instant::now() + pool.settings().idle_ttl * 2;
        assert_eq!(pool.sweep_at(later).await, 1);

        let session = pool.acquire(&key).await.unwrap();
        assert_eq!(session.database_name(), "otherdb");
    }

    #[tokio::test]
    async fn test_unknown_collection_operation_is_named() {
        let pool = ConnectionPool::new(LazyConnector, PoolSettings::default());
        let err = execute(&pool, &session_key(), "db.users.mapReduce({}).limit(1)")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ShellError::Unsupported(UnsupportedOperation::Operation(ref op)) if op == "mapReduce"
        ));
    }

    #[tokio::test]
    async fn test_use_requires_name() {
        let pool = ConnectionPool::new(LazyConnector, PoolSettings::default());
        assert!(execute(&pool, &session_key(), "use").await.is_err());
        assert_eq!(pool.selected_database(&session_key()).await, None);
    }
}
