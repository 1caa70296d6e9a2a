//! Connection identity resolution
//!
//! Commands name a logical connection by id. A [`ConnectionResolver`] maps
//! that id to where and how to connect; credential storage lives behind it.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::{Config, ConnectionProfile};
use crate::error::{ConnectionError, Result};
use crate::pool::{BackendKind, PoolKey, Secret};

/// Resolved connection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTarget {
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub default_database: Option<String>,
}

impl ConnectionTarget {
    /// Pool key for this target within `session_id`
    pub fn pool_key(&self, session_id: &str) -> PoolKey {
        PoolKey::new(self.backend, self.host.clone(), self.port)
            .with_credentials(self.username.clone(), self.password.clone())
            .with_database(self.default_database.clone())
            .with_session(session_id)
    }
}

impl From<&ConnectionProfile> for ConnectionTarget {
    fn from(profile: &ConnectionProfile) -> Self {
        Self {
            backend: profile.backend,
            host: profile.host.clone(),
            port: profile.port_or_default(),
            username: profile.username.clone().filter(|u| !u.is_empty()),
            password: profile
                .password
                .clone()
                .filter(|p| !p.is_empty())
                .map(Secret::new),
            default_database: profile.database.clone().filter(|d| !d.is_empty()),
        }
    }
}

/// Maps a connection id to connection parameters
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    /// Resolve `connection_id` for `backend`
    ///
    /// # Returns
    /// * `Result<ConnectionTarget>` - Target or `ConnectionError::UnknownConnection`
    async fn resolve(&self, backend: BackendKind, connection_id: &str) -> Result<ConnectionTarget>;
}

/// Resolver over a fixed set of profiles
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    targets: HashMap<String, ConnectionTarget>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[[connections]]` profiles of a config
    pub fn from_config(config: &Config) -> Self {
        let mut resolver = Self::new();
        for profile in &config.connections {
            resolver.insert(profile.id.clone(), ConnectionTarget::from(profile));
        }
        resolver
    }

    pub fn insert(&mut self, id: impl Into<String>, target: ConnectionTarget) {
        self.targets.insert(id.into(), target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl ConnectionResolver for StaticResolver {
    async fn resolve(&self, backend: BackendKind, connection_id: &str) -> Result<ConnectionTarget> {
        match self.targets.get(connection_id) {
            Some(target) if target.backend == backend => Ok(target.clone()),
            Some(target) => Err(ConnectionError::UnknownConnection(format!(
                "{connection_id} is a {} connection, not {backend}",
                target.backend
            ))
            .into()),
            None => Err(ConnectionError::UnknownConnection(connection_id.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShellError;

    fn target(backend: BackendKind) -> ConnectionTarget {
        ConnectionTarget {
            backend,
            host: "localhost".to_string(),
            port: backend.default_port(),
            username: None,
            password: None,
            default_database: Some("app".to_string()),
        }
    }

    #[tokio::test]
    async fn test_resolve_known_id() {
        let mut resolver = StaticResolver::new();
        resolver.insert("cache", target(BackendKind::KeyValue));

        let resolved = resolver.resolve(BackendKind::KeyValue, "cache").await.unwrap();
        assert_eq!(resolved.port, 6379);
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let resolver = StaticResolver::new();
        let err = resolver.resolve(BackendKind::Document, "nope").await.unwrap_err();
        assert!(matches!(
            err,
            ShellError::Connection(ConnectionError::UnknownConnection(_))
        ));
    }

    #[tokio::test]
    async fn test_backend_mismatch() {
        let mut resolver = StaticResolver::new();
        resolver.insert("main", target(BackendKind::Relational));
        assert!(resolver.resolve(BackendKind::Document, "main").await.is_err());
    }

    #[test]
    fn test_pool_key_carries_session() {
        let key = target(BackendKind::Document).pool_key("tab-1");
        assert_eq!(key.session_id.as_deref(), Some("tab-1"));
        assert_eq!(key.database.as_deref(), Some("app"));
    }
}
