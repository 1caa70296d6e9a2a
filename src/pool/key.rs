//! Pool identity types
//!
//! A [`PoolKey`] identifies one live connection. Two requests with equal keys
//! share a connection; keys that differ only in `session_id` never do, since
//! each session carries its own active-database context.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database backend dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// MySQL-compatible SQL server
    #[serde(alias = "mysql", alias = "sql")]
    Relational,

    /// Redis
    #[serde(alias = "redis")]
    KeyValue,

    /// MongoDB
    #[serde(alias = "mongodb", alias = "mongo")]
    Document,
}

impl BackendKind {
    /// Default server port for the backend
    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::Relational => 3306,
            BackendKind::KeyValue => 6379,
            BackendKind::Document => 27017,
        }
    }

    /// URI-style scheme used in log output
    pub fn scheme(&self) -> &'static str {
        match self {
            BackendKind::Relational => "mysql",
            BackendKind::KeyValue => "redis",
            BackendKind::Document => "mongodb",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relational" | "mysql" | "sql" => Ok(BackendKind::Relational),
            "keyvalue" | "redis" => Ok(BackendKind::KeyValue),
            "document" | "mongodb" | "mongo" => Ok(BackendKind::Document),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// A credential that never shows up in logs or debug output
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw secret for handing to a driver
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Identity of one pooled connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Secret>,
    /// Database selected when the connection is opened
    pub database: Option<String>,
    /// Terminal session owning the connection
    pub session_id: Option<String>,
}

impl PoolKey {
    pub fn new(backend: BackendKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            backend,
            host: host.into(),
            port,
            username: None,
            password: None,
            database: None,
            session_id: None,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<Secret>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub fn with_database(mut self, database: Option<String>) -> Self {
        self.database = database;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// `host:port` for driver connect strings and error messages
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.backend)?;
        if let Some(user) = &self.username {
            write!(f, "{user}@")?;
        }
        write!(f, "{}", self.address())?;
        if let Some(db) = &self.database {
            write!(f, "/{db}")?;
        }
        if let Some(session) = &self.session_id {
            write!(f, "#{session}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_secret_is_redacted() {
        let key = PoolKey::new(BackendKind::Relational, "db", 3306)
            .with_credentials(Some("root".into()), Some(Secret::new("hunter2")));
        let debug = format!("{key:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!key.to_string().contains("hunter2"));
    }

    #[test]
    fn test_session_distinguishes_keys() {
        let base = PoolKey::new(BackendKind::Document, "localhost", 27017)
            .with_database(Some("app".into()));
        let tab_a = base.clone().with_session("tab-a");
        let tab_b = base.clone().with_session("tab-b");

        let keys: HashSet<PoolKey> = [tab_a.clone(), tab_a, tab_b].into_iter().collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_display() {
        let key = PoolKey::new(BackendKind::KeyValue, "cache", 6380)
            .with_credentials(Some("default".into()), None)
            .with_session("s1");
        assert_eq!(key.to_string(), "redis://default@cache:6380#s1");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("MySQL".parse::<BackendKind>(), Ok(BackendKind::Relational));
        assert_eq!("redis".parse::<BackendKind>(), Ok(BackendKind::KeyValue));
        assert_eq!("mongo".parse::<BackendKind>(), Ok(BackendKind::Document));
        assert!("oracle".parse::<BackendKind>().is_err());
    }
}
