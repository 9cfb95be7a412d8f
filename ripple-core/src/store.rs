//! Session Key/Value Storage
//!
//! Opaque per-browser storage that outlives a single page, such as a login
//! or a flash message. The engine does not persist anything itself; it
//! delegates to a [`KvStore`] keyed by a scope token that travels in a
//! cookie.
//!
//! [`StoreHandle`] is what page code sees. When no store is configured, or
//! the request carried no scope, every operation is a no-op that returns
//! the empty value.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::session::random_token;

/// Cookie carrying the store scope token.
pub const STORE_COOKIE: &str = "ripple_sid";

/// External key/value store.
pub trait KvStore: Send + Sync {
    fn get(&self, scope: &str, key: &str) -> Option<Value>;

    fn set(&self, scope: &str, key: &str, value: Value);

    fn delete(&self, scope: &str, key: &str);

    fn keys(&self, scope: &str) -> Vec<String>;

    /// Remove everything stored under `scope`.
    fn destroy(&self, scope: &str);

    /// Move the data under `scope` to a fresh token and return it.
    fn renew_token(&self, scope: &str) -> String;
}

/// In-memory [`KvStore`].
#[derive(Default)]
pub struct MemoryStore {
    scopes: DashMap<String, HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, scope: &str, key: &str) -> Option<Value> {
        self.scopes.get(scope)?.get(key).cloned()
    }

    fn set(&self, scope: &str, key: &str, value: Value) {
        self.scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn delete(&self, scope: &str, key: &str) {
        if let Some(mut data) = self.scopes.get_mut(scope) {
            data.remove(key);
        }
    }

    fn keys(&self, scope: &str) -> Vec<String> {
        self.scopes
            .get(scope)
            .map(|data| data.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn destroy(&self, scope: &str) {
        self.scopes.remove(scope);
    }

    fn renew_token(&self, scope: &str) -> String {
        let fresh = random_token();
        if let Some((_, data)) = self.scopes.remove(scope) {
            self.scopes.insert(fresh.clone(), data);
        }
        fresh
    }
}

/// Scoped view of the store for one session.
#[derive(Clone)]
pub struct StoreHandle {
    store: Option<Arc<dyn KvStore>>,
    scope: Option<String>,
}

impl StoreHandle {
    pub(crate) fn new(store: Option<Arc<dyn KvStore>>, scope: Option<String>) -> Self {
        Self { store, scope }
    }

    fn target(&self) -> Option<(&dyn KvStore, &str)> {
        Some((self.store.as_deref()?, self.scope.as_deref()?))
    }

    /// The scope token, or an empty string.
    pub fn id(&self) -> &str {
        self.scope.as_deref().unwrap_or("")
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let (store, scope) = self.target()?;
        store.get(scope, key)
    }

    pub fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Store a value. Values that fail to serialize are logged and skipped.
    pub fn set(&self, key: &str, value: impl Serialize) {
        let Some((store, scope)) = self.target() else {
            return;
        };
        match serde_json::to_value(value) {
            Ok(value) => store.set(scope, key, value),
            Err(error) => tracing::warn!(key, %error, "store value not serializable"),
        }
    }

    pub fn delete(&self, key: &str) {
        if let Some((store, scope)) = self.target() {
            store.delete(scope, key);
        }
    }

    /// Read and delete a value (flash message pattern).
    pub fn pop(&self, key: &str) -> Option<Value> {
        let value = self.get(key)?;
        self.delete(key);
        Some(value)
    }

    pub fn keys(&self) -> Vec<String> {
        self.target()
            .map(|(store, scope)| store.keys(scope))
            .unwrap_or_default()
    }

    /// Drop every value in this scope (logout).
    pub fn destroy(&self) {
        if let Some((store, scope)) = self.target() {
            store.destroy(scope);
        }
    }

    /// Move the data to a fresh token, returning it.
    ///
    /// The host is responsible for delivering the new token to the browser.
    pub fn renew_token(&self) -> Option<String> {
        let (store, scope) = self.target()?;
        Some(store.renew_token(scope))
    }
}

/// Find the store scope token in a `Cookie` header value.
pub(crate) fn scope_from_cookie_header(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == STORE_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
