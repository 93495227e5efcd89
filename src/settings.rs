//! Persistent extension settings.
//!
//! The relay keeps three settings: whether the user wants the page to stay
//! connected across reloads, whether the connection is currently enabled,
//! and the controller server URL. [`SettingsStore`] abstracts the backing
//! storage; [`MemorySettingsStore`] is the in-process implementation used
//! by the page runtime and by tests.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Storage key for the enabled flag.
pub const CONNECTION_ENABLED_KEY: &str = "connection-enabled";

/// Storage key for the controller server URL.
pub const WS_SERVER_KEY: &str = "ws-server";

/// Server URL used when none is stored or the stored one is invalid.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:9772";

/// Storage key for a page's remember-connection flag.
#[must_use]
pub fn remember_connection_key(origin: &str) -> String {
    format!("page:{origin}/remember-connection")
}

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with `(new, old)` when a watched setting is written.
pub type WatchCallback = Box<dyn Fn(&Value, Option<&Value>) + Send + Sync>;

// ============================================================================
// SettingsStore
// ============================================================================

/// Key/value settings storage with change notification.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Writes `value` under `key` and notifies the key's watchers.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Registers a callback fired on every write to `key`.
    ///
    /// Watchers are never removed for the store's lifetime.
    fn watch(&self, key: &str, callback: WatchCallback);
}

// ============================================================================
// MemorySettingsStore
// ============================================================================

#[derive(Default)]
struct StoreInner {
    values: Mutex<HashMap<String, Value>>,
    watchers: Mutex<HashMap<String, Vec<Arc<dyn Fn(&Value, Option<&Value>) + Send + Sync>>>>,
}

/// In-memory settings store.
#[derive(Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<StoreInner>,
}

impl MemorySettingsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.inner.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let previous = self.inner.values.lock().insert(key.to_owned(), value.clone());

        let watchers: Vec<_> = self
            .inner
            .watchers
            .lock()
            .get(key)
            .map(|list| list.iter().map(Arc::clone).collect())
            .unwrap_or_default();
        for watcher in watchers {
            watcher(&value, previous.as_ref());
        }

        Ok(())
    }

    fn watch(&self, key: &str, callback: WatchCallback) {
        self.inner
            .watchers
            .lock()
            .entry(key.to_owned())
            .or_default()
            .push(Arc::from(callback));
    }
}

// ============================================================================
// Tests
// ============================================================================
