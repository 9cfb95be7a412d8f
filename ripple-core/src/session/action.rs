//! Actions
//!
//! An action is a server callback the client can trigger by id. Actions are
//! registered while a page or component is constructed and never change
//! afterwards; the gateway looks them up on every inbound request.
//!
//! The callback receives the session that declared it, so callbacks do not
//! need to capture their own session (which would keep it alive forever).

use std::sync::{Arc, Weak};

use crate::config::RateLimitConfig;
use crate::gateway::RateLimiter;
use crate::render::Attr;

use super::node::{Session, SessionNode};

/// Route prefix actions are served under.
pub const ACTION_ROUTE_PREFIX: &str = "/_action/";

/// An action callback.
pub type ActionFn = Arc<dyn Fn(&Session) + Send + Sync>;

/// Per-action options.
#[derive(Debug, Clone, Default)]
pub struct ActionOptions {
    /// A dedicated limiter for this action. Both this and the session
    /// limiter must allow a request.
    pub rate_limit: Option<RateLimitConfig>,
}

impl ActionOptions {
    /// Options with a dedicated token bucket.
    pub fn rate_limited(rate: f64, burst: u32) -> Self {
        Self {
            rate_limit: Some(RateLimitConfig::new(rate, burst)),
        }
    }
}

/// A registered action.
#[derive(Clone)]
pub(crate) struct ActionEntry {
    pub(crate) callback: ActionFn,

    /// `None` inherits the session default.
    pub(crate) limiter: Option<Arc<RateLimiter>>,

    /// The page or component that declared the action.
    pub(crate) owner: Weak<SessionNode>,
}

impl ActionEntry {
    pub(crate) fn new(callback: ActionFn, options: &ActionOptions, owner: Weak<SessionNode>) -> Self {
        let limiter = options
            .rate_limit
            .as_ref()
            .and_then(RateLimiter::from_config)
            .map(Arc::new);
        Self {
            callback,
            limiter,
            owner,
        }
    }
}

/// Handle to a registered action, used to wire it into a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHandle {
    id: String,
}

impl ActionHandle {
    pub(crate) fn new(id: String) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The client expression that triggers this action.
    pub fn url(&self) -> String {
        format!("@get('{ACTION_ROUTE_PREFIX}{}')", self.id)
    }

    /// Trigger on an arbitrary client event.
    pub fn on(&self, event: &str) -> Attr {
        Attr::new(format!("data-on:{event}"), self.url())
    }

    pub fn on_click(&self) -> Attr {
        self.on("click")
    }

    /// Trigger on input change, debounced by 200ms.
    pub fn on_change(&self) -> Attr {
        self.on("change__debounce.200ms")
    }

    pub fn on_submit(&self) -> Attr {
        self.on("submit")
    }

    /// Trigger on key down. An empty key matches every key.
    pub fn on_keydown(&self, key: &str) -> Attr {
        let condition = if key.is_empty() {
            String::new()
        } else {
            format!("evt.key==='{key}' && ")
        };
        Attr::new("data-on:keydown", format!("{condition}{}", self.url()))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
