//! Session-scoped connection pool
//!
//! This module provides the connection pool shared by all three dialects:
//! - Lazy creation of one connection per [`PoolKey`]
//! - Single-flight connects: concurrent callers for a missing key wait for one attempt
//! - Handle replacement for dialects that switch databases on a live client
//! - Per-key selected database that outlives evicted handles
//! - Periodic idle sweeps on a background task
//!
//! # Lifecycle
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use dbshell::pool::{ConnectionPool, Connector};
//! # async fn demo<C: Connector>(connector: C) {
//! let pool = Arc::new(ConnectionPool::new(connector, Default::default()));
//! let sweeper = pool.spawn_sweeper();
//! // ... acquire / replace per command ...
//! pool.shutdown().await;
//! let _ = sweeper.await;
//! # }
//! ```

mod key;

pub use key::{BackendKind, PoolKey, Secret};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{ConnectionError, Result, ShellError};

/// Opens and closes driver handles for one backend
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Cheaply clonable handle handed to callers
    type Handle: Clone + Send + Sync + 'static;

    /// Open a new connection for `key` (one attempt)
    async fn connect(&self, key: &PoolKey) -> Result<Self::Handle>;

    /// Gracefully close a handle removed from the pool
    async fn close(&self, handle: Self::Handle) {
        drop(handle);
    }
}

/// One live connection and its eviction clock
#[derive(Debug)]
pub struct PooledEntry<H> {
    handle: H,
    created_at: Instant,
    last_used_at: Instant,
}

impl<H> PooledEntry<H> {
    fn new(handle: H) -> Self {
        let now = Instant::now();
        Self {
            handle,
            created_at: now,
            last_used_at: now,
        }
    }

    fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_used_at) > ttl
    }
}

/// Per-key state; its mutex serializes connect, replace and eviction for that key
struct Slot<H> {
    state: Mutex<SlotState<H>>,
}

struct SlotState<H> {
    entry: Option<PooledEntry<H>>,
    /// Set once the slot is unlinked from the pool map; waiters must re-resolve
    retired: bool,
}

impl<H> Slot<H> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                entry: None,
                retired: false,
            }),
        }
    }
}

/// Timing knobs of a pool
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
    pub connect_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            idle_ttl: config.idle_ttl(),
            sweep_interval: config.sweep_interval(),
            connect_timeout: config.connect_timeout(),
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Connection pool keyed by [`PoolKey`]
pub struct ConnectionPool<C: Connector> {
    connector: C,
    settings: PoolSettings,
    slots: Mutex<HashMap<PoolKey, Arc<Slot<C::Handle>>>>,
    /// Database switched to per key; survives eviction, cleared on explicit removal
    selected: Mutex<HashMap<PoolKey, String>>,
    shutdown: CancellationToken,
}

impl<C: Connector> ConnectionPool<C> {
    /// Create an empty pool
    ///
    /// # Arguments
    /// * `connector` - Backend connector used to open handles
    /// * `settings` - TTL, sweep and connect timing
    pub fn new(connector: C, settings: PoolSettings) -> Self {
        Self {
            connector,
            settings,
            slots: Mutex::new(HashMap::new()),
            selected: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Pool settings
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Number of keys with a live entry
    pub async fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().await.values().cloned().collect();
        let mut live = 0;
        for slot in slots {
            let state = slot.state.lock().await;
            if !state.retired && state.entry.is_some() {
                live += 1;
            }
        }
        live
    }

    /// Whether the pool holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get the handle for `key`, connecting on first use
    ///
    /// Concurrent callers for the same missing key wait on the key's slot,
    /// so only the first performs the connect; the rest reuse its result.
    /// A failed connect leaves the slot empty and is retried by the next caller.
    ///
    /// # Returns
    /// * `Result<C::Handle>` - Shared handle or connection error
    pub async fn acquire(&self, key: &PoolKey) -> Result<C::Handle> {
        loop {
            if self.shutdown.is_cancelled() {
                return Err(ConnectionError::PoolClosed.into());
            }

            let slot = self.slot_for(key).await;
            let mut state = slot.state.lock().await;
            if state.retired {
                continue;
            }

            if let Some(entry) = state.entry.as_mut() {
                entry.touch();
                debug!(key = %key, "Reusing pooled connection");
                return Ok(entry.handle.clone());
            }

            let handle = self.connect_with_retry(key).await?;
            info!(key = %key, "Opened pooled connection");
            state.entry = Some(PooledEntry::new(handle.clone()));
            return Ok(handle);
        }
    }

    /// Swap the handle stored under `key`, keeping the key and refreshing its clock
    ///
    /// Used when a dialect rebinds the active database on an existing client.
    ///
    /// # Returns
    /// * `Result<C::Handle>` - The previous handle
    pub async fn replace(&self, key: &PoolKey, handle: C::Handle) -> Result<C::Handle> {
        let slot = self
            .slots
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ConnectionError::NotPooled(key.to_string()))?;

        let mut state = slot.state.lock().await;
        if state.retired {
            return Err(ConnectionError::NotPooled(key.to_string()).into());
        }
        let entry = state
            .entry
            .as_mut()
            .ok_or_else(|| ConnectionError::NotPooled(key.to_string()))?;

        let previous = std::mem::replace(&mut entry.handle, handle);
        entry.touch();
        debug!(key = %key, "Replaced pooled connection handle");
        Ok(previous)
    }

    /// Remember that the session behind `key` switched to `database`
    ///
    /// Connections opened for `key` from now on, including reconnects after
    /// an idle eviction, target `database` instead of `key.database`.
    pub async fn select_database(&self, key: &PoolKey, database: impl Into<String>) {
        let database = database.into();
        debug!(key = %key, "Selected database '{}'", database);
        self.selected.lock().await.insert(key.clone(), database);
    }

    /// Database the session behind `key` switched to, if any
    pub async fn selected_database(&self, key: &PoolKey) -> Option<String> {
        self.selected.lock().await.get(key).cloned()
    }

    /// Key handed to the connector: `key` with its switched database applied
    async fn connect_target(&self, key: &PoolKey) -> PoolKey {
        match self.selected_database(key).await {
            Some(database) => key.clone().with_database(Some(database)),
            None => key.clone(),
        }
    }

    /// Evict entries idle longer than the TTL
    ///
    /// # Returns
    /// * `usize` - Number of connections closed
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    /// Evict entries whose idle time at `now` exceeds the TTL
    pub async fn sweep_at(&self, now: Instant) -> usize {
        let ttl = self.settings.idle_ttl;
        self.evict_where(|entry| match entry {
            Some(entry) => entry.is_idle(now, ttl),
            None => true,
        })
        .await
    }

    /// Close and forget the entry for `key`
    ///
    /// # Returns
    /// * `bool` - Whether a live connection was closed
    pub async fn remove(&self, key: &PoolKey) -> bool {
        self.selected.lock().await.remove(key);
        let slot = match self.slots.lock().await.get(key).cloned() {
            Some(slot) => slot,
            None => return false,
        };
        self.retire(key, &slot, |_| true).await
    }

    /// Close every entry owned by `session_id`
    pub async fn remove_session(&self, session_id: &str) -> usize {
        self.selected
            .lock()
            .await
            .retain(|key, _| key.session_id.as_deref() != Some(session_id));
        let snapshot: Vec<_> = self
            .slots
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key.session_id.as_deref() == Some(session_id))
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut closed = 0;
        for (key, slot) in snapshot {
            if self.retire(&key, &slot, |_| true).await {
                closed += 1;
            }
        }
        closed
    }

    /// Stop the sweeper and close every connection
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.selected.lock().await.clear();
        let closed = self.evict_where(|_| true).await;
        info!("Connection pool shut down, closed {} connection(s)", closed);
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until shutdown
    ///
    /// The task holds a weak reference, so dropping the last pool handle
    /// also ends it.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let pool: Weak<Self> = Arc::downgrade(self);
        let token = self.shutdown.clone();
        let period = self.settings.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(pool) = pool.upgrade() else { break };
                        let evicted = pool.sweep().await;
                        if evicted > 0 {
                            info!("Idle sweep closed {} connection(s)", evicted);
                        }
                    }
                }
            }
            debug!("Pool sweeper stopped");
        })
    }

    async fn slot_for(&self, key: &PoolKey) -> Arc<Slot<C::Handle>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    async fn evict_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(Option<&PooledEntry<C::Handle>>) -> bool,
    {
        let snapshot: Vec<_> = self
            .slots
            .lock()
            .await
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut closed = 0;
        for (key, slot) in snapshot {
            if self.retire(&key, &slot, &predicate).await {
                closed += 1;
            }
        }
        closed
    }

    /// Unlink `slot` and close its entry if `predicate` holds, under the slot lock
    async fn retire<F>(&self, key: &PoolKey, slot: &Arc<Slot<C::Handle>>, predicate: F) -> bool
    where
        F: Fn(Option<&PooledEntry<C::Handle>>) -> bool,
    {
        let mut state = slot.state.lock().await;
        if state.retired || !predicate(state.entry.as_ref()) {
            return false;
        }
        state.retired = true;

        {
            let mut slots = self.slots.lock().await;
            if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
                slots.remove(key);
            }
        }

        match state.entry.take() {
            Some(entry) => {
                debug!(
                    key = %key,
                    age_secs = entry.created_at.elapsed().as_secs(),
                    "Closing pooled connection"
                );
                self.connector.close(entry.handle).await;
                true
            }
            None => false,
        }
    }

    async fn connect_with_retry(&self, key: &PoolKey) -> Result<C::Handle> {
        let attempts = self.settings.retry_attempts.max(1);
        let timeout = self.settings.connect_timeout;
        let target = self.connect_target(key).await;
        let mut last_error: Option<ShellError> = None;

        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, self.connector.connect(&target)).await {
                Ok(Ok(handle)) => return Ok(handle),
                Ok(Err(e)) => {
                    warn!(key = %key, attempt, "Connect attempt failed: {}", e);
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(key = %key, attempt, "Connect attempt timed out");
                    last_error = Some(
                        ConnectionError::Timeout {
                            target: key.to_string(),
                            seconds: timeout.as_secs(),
                        }
                        .into(),
                    );
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.retry_backoff * attempt).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ConnectionError::ConnectionFailed {
                target: key.to_string(),
                message: "no connection attempt made".to_string(),
            }
            .into()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    /// Connector that hands out numbered handles and counts calls
    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
        closes: AtomicUsize,
        failures_left: AtomicUsize,
        delay: Duration,
        databases: std::sync::Mutex<Vec<Option<String>>>,
    }

    impl CountingConnector {
        fn last_database(&self) -> Option<String> {
            self.databases.lock().unwrap().last().cloned().flatten()
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Handle = Arc<usize>;

        async fn connect(&self, key: &PoolKey) -> Result<Self::Handle> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            self.databases.lock().unwrap().push(key.database.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
                .is_ok()
            {
                return Err(ConnectionError::ConnectionFailed {
                    target: key.to_string(),
                    message: "refused".to_string(),
                }
                .into());
            }
            Ok(Arc::new(n))
        }

        async fn close(&self, _handle: Self::Handle) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn settings() -> PoolSettings {
        PoolSettings {
            idle_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            retry_attempts: 1,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn key(session: &str) -> PoolKey {
        PoolKey::new(BackendKind::KeyValue, "localhost", 6379).with_session(session)
    }

    #[tokio::test]
    async fn test_concurrent_acquire_connects_once() {
        let connector = CountingConnector {
            delay: Duration::from_millis(50),
            ..Default::default()
        };
        let pool = Arc::new(ConnectionPool::new(connector, settings()));
        let k = key("tab-1");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let k = k.clone();
                tokio::spawn(async move { pool.acquire(&k).await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_get_separate_connections() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        let a = pool.acquire(&key("tab-a")).await.unwrap();
        let b = pool.acquire(&key("tab-b")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_cached() {
        let connector = CountingConnector::default();
        connector.failures_left.store(1, Ordering::SeqCst);
        let pool = ConnectionPool::new(connector, settings());
        let k = key("tab-1");

        let err = assert_err!(pool.acquire(&k).await);
        assert!(matches!(err, ShellError::Connection(_)));
        assert!(pool.is_empty().await);

        assert_ok!(pool.acquire(&k).await);
        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let connector = CountingConnector::default();
        connector.failures_left.store(2, Ordering::SeqCst);
        let mut s = settings();
        s.retry_attempts = 3;
        let pool = ConnectionPool::new(connector, s);

        assert_ok!(pool.acquire(&key("tab-1")).await);
        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let connector = CountingConnector {
            delay: Duration::from_millis(200),
            ..Default::default()
        };
        let mut s = settings();
        s.connect_timeout = Duration::from_millis(10);
        let pool = ConnectionPool::new(connector, s);

        let err = pool.acquire(&key("slow")).await.unwrap_err();
        assert!(matches!(
            err,
            ShellError::Connection(ConnectionError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_sweep_evicts_idle_entries() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        pool.acquire(&key("stale")).await.unwrap();

        let later = Instant::now() + Duration::from_secs(601);
        assert_eq!(pool.sweep_at(later).await, 1);
        assert!(pool.is_empty().await);
        assert_eq!(pool.connector.closes.load(Ordering::SeqCst), 1);

        // The next acquire reconnects.
        pool.acquire(&key("stale")).await.unwrap();
        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sweep_keeps_recently_used_entries() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        pool.acquire(&key("busy")).await.unwrap();
        pool.acquire(&key("idle")).await.unwrap();

        assert_eq!(pool.sweep_at(Instant::now() + Duration::from_secs(300)).await, 0);
        assert_eq!(pool.len().await, 2);

        let idle_touched = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.acquire(&key("busy")).await.unwrap();

        let sweep_time = idle_touched + Duration::from_secs(600) + Duration::from_millis(1);
        assert_eq!(pool.sweep_at(sweep_time).await, 1);
        assert_eq!(pool.len().await, 1);

        pool.acquire(&key("busy")).await.unwrap();
        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_replace_keeps_key_and_refreshes_clock() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        let k = key("tab-1");
        let original = pool.acquire(&k).await.unwrap();

        let previous = pool.replace(&k, Arc::new(99)).await.unwrap();
        assert!(Arc::ptr_eq(&previous, &original));

        let current = pool.acquire(&k).await.unwrap();
        assert_eq!(*current, 99);
        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replace_unknown_key() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        let err = pool.replace(&key("nobody"), Arc::new(1)).await.unwrap_err();
        assert!(matches!(
            err,
            ShellError::Connection(ConnectionError::NotPooled(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_session() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        pool.acquire(&key("tab-a")).await.unwrap();
        pool.acquire(&key("tab-b")).await.unwrap();

        assert_eq!(pool.remove_session("tab-a").await, 1);
        assert_eq!(pool.len().await, 1);
        assert!(pool.remove(&key("tab-b")).await);
        assert!(!pool.remove(&key("tab-b")).await);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let pool = Arc::new(ConnectionPool::new(CountingConnector::default(), settings()));
        let sweeper = pool.spawn_sweeper();
        pool.acquire(&key("tab-a")).await.unwrap();

        pool.shutdown().await;
        sweeper.await.unwrap();

        assert_eq!(pool.connector.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            pool.acquire(&key("tab-a")).await,
            Err(ShellError::Connection(ConnectionError::PoolClosed))
        ));
    }

    #[tokio::test]
    async fn test_selected_database_survives_eviction() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        let k = key("tab-1").with_database(Some("app".into()));

        pool.acquire(&k).await.unwrap();
        assert_eq!(pool.connector.last_database().as_deref(), Some("app"));

        pool.select_database(&k, "otherdb").await;
        pool.replace(&k, Arc::new(42)).await.unwrap();

        let later = Instant::now() + pool.settings().idle_ttl * 2;
        assert_eq!(pool.sweep_at(later).await, 1);
        assert!(pool.is_empty().await);

        let reopened = pool.acquire(&k).await.unwrap();
        assert_ne!(*reopened, 42);
        assert_eq!(pool.connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.connector.last_database().as_deref(), Some("otherdb"));
        assert_eq!(pool.selected_database(&k).await.as_deref(), Some("otherdb"));
    }

    #[tokio::test]
    async fn test_selection_is_per_session() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        pool.select_database(&key("tab-a"), "otherdb").await;

        pool.acquire(&key("tab-b")).await.unwrap();
        assert_eq!(pool.connector.last_database(), None);
        assert_eq!(pool.selected_database(&key("tab-b")).await, None);
    }

    #[tokio::test]
    async fn test_remove_session_forgets_selection() {
        let pool = ConnectionPool::new(CountingConnector::default(), settings());
        let k = key("tab-a");
        pool.acquire(&k).await.unwrap();
        pool.select_database(&k, "otherdb").await;

        assert_eq!(pool.remove_session("tab-a").await, 1);
        assert_eq!(pool.selected_database(&k).await, None);

        pool.acquire(&k).await.unwrap();
        assert_eq!(pool.connector.last_database(), None);
    }
}
