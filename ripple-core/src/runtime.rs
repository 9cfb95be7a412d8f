//! Runtime
//!
//! The runtime bundles the services every session shares: the pub/sub
//! backend, the key/value store and the default action rate limit. It is
//! cloned into each session at creation, so sessions never reach for
//! global state.

use std::sync::Arc;

use crate::config::RateLimitConfig;
use crate::pubsub::PubSub;
use crate::store::KvStore;

struct RuntimeInner {
    pubsub: Option<Arc<dyn PubSub>>,
    store: Option<Arc<dyn KvStore>>,
    action_rate_limit: RateLimitConfig,
}

/// Shared services handed to every session.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new(
        pubsub: Option<Arc<dyn PubSub>>,
        store: Option<Arc<dyn KvStore>>,
        action_rate_limit: RateLimitConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                pubsub,
                store,
                action_rate_limit,
            }),
        }
    }

    pub fn pubsub(&self) -> Option<&Arc<dyn PubSub>> {
        self.inner.pubsub.as_ref()
    }

    pub fn store(&self) -> Option<&Arc<dyn KvStore>> {
        self.inner.store.as_ref()
    }

    /// Limiter settings applied to each new session.
    pub fn action_rate_limit(&self) -> RateLimitConfig {
        self.inner.action_rate_limit
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(None, None, RateLimitConfig::default())
    }
}
