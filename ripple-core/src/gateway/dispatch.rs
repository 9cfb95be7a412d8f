//! Action dispatch.
//!
//! Every inbound action runs the same gauntlet, in order:
//!
//! 1. session lookup (a miss is expected after expiry, logged at debug),
//! 2. anti-forgery token, compared in constant time,
//! 3. the session limiter,
//! 4. action lookup,
//! 5. the action's own limiter, if it has one,
//! 6. value injection and the callback, inside a panic boundary.
//!
//! Each rejection is a distinct [`Error`] variant. None of them is fatal.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{panic_message, Error, RateLimitScope, Result};
use crate::registry::SessionRegistry;
use crate::session::Session;

use super::payload::InboundPayload;

/// Authenticates, rate limits and invokes actions.
#[derive(Clone)]
pub struct ActionGateway {
    registry: Arc<SessionRegistry>,
}

impl ActionGateway {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Invoke `action_id` on the session named in `payload`.
    ///
    /// Blocks for as long as the callback runs.
    pub fn invoke(&self, action_id: &str, payload: InboundPayload) -> Result<()> {
        let session = match self.registry.get(&payload.session_id) {
            Ok(session) => session,
            Err(error) => {
                tracing::debug!(action = action_id, %error, "action dropped");
                return Err(error);
            }
        };
        let id = session.id().clone();

        if !constant_time_eq(payload.csrf_token.as_bytes(), session.csrf_token().as_bytes()) {
            tracing::warn!(session = %id, action = action_id, "action rejected: invalid anti-forgery token");
            return Err(Error::Forbidden);
        }

        if let Some(limiter) = &session.page().limiter {
            if !limiter.allow() {
                tracing::warn!(session = %id, action = action_id, "action rate limited");
                return Err(Error::RateLimited {
                    scope: RateLimitScope::Session,
                });
            }
        }

        let Some(entry) = session.find_action(action_id) else {
            tracing::debug!(session = %id, action = action_id, "action not found");
            return Err(Error::ActionNotFound {
                session: id.to_string(),
                action: action_id.to_string(),
            });
        };

        if let Some(limiter) = &entry.limiter {
            if !limiter.allow() {
                tracing::warn!(session = %id, action = action_id, "action rate limited (per action)");
                return Err(Error::RateLimited {
                    scope: RateLimitScope::Action,
                });
            }
        }

        // Component actions run against the component that declared them.
        let target = entry.owner.upgrade().map(Session).unwrap_or_else(|| session.clone());
        let values = payload.values;

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            session.inject_inbound(Some(&values));
            (entry.callback)(&target);
        }));

        match outcome {
            Ok(()) => {
                tracing::trace!(session = %id, action = action_id, "action invoked");
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(session = %id, action = action_id, panic = %message, "action panicked");
                Err(Error::ActionPanicked {
                    action: action_id.to_string(),
                    message,
                })
            }
        }
    }
}

/// Compare two byte strings without an early exit on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::runtime::Runtime;
    use crate::session::ActionOptions;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        gateway: ActionGateway,
        session: Session,
        calls: Arc<AtomicUsize>,
        action: String,
    }

    fn fixture(runtime: Runtime) -> Fixture {
        let registry = Arc::new(SessionRegistry::new());
        let session = Session::new("/", &runtime);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let action = session
            .action(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .id()
            .to_string();
        registry.register(session.clone());

        Fixture {
            gateway: ActionGateway::new(registry),
            session,
            calls,
            action,
        }
    }

    fn payload(session: &Session) -> InboundPayload {
        InboundPayload::new(session.id().as_str(), session.csrf_token())
    }

    #[test]
    fn valid_request_invokes_callback() {
        let f = fixture(Runtime::default());
        f.gateway.invoke(&f.action, payload(&f.session)).unwrap();
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wrong_token_is_forbidden() {
        let f = fixture(Runtime::default());
        let mut bad = payload(&f.session);
        bad.csrf_token = "0".repeat(32);

        assert!(matches!(f.gateway.invoke(&f.action, bad), Err(Error::Forbidden)));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_session_and_action_are_not_found() {
        let f = fixture(Runtime::default());

        let err = f
            .gateway
            .invoke(&f.action, InboundPayload::new("nope", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));

        let err = f.gateway.invoke("missing", payload(&f.session)).unwrap_err();
        assert!(matches!(err, Error::ActionNotFound { .. }));
    }

    #[test]
    fn session_limiter_applies() {
        let runtime = Runtime::new(None, None, RateLimitConfig::new(0.001, 1));
        let f = fixture(runtime);

        f.gateway.invoke(&f.action, payload(&f.session)).unwrap();
        assert!(matches!(
            f.gateway.invoke(&f.action, payload(&f.session)),
            Err(Error::RateLimited {
                scope: RateLimitScope::Session
            })
        ));
    }

    #[test]
    fn action_limiter_is_an_independent_gate() {
        let runtime = Runtime::new(None, None, RateLimitConfig::DISABLED);
        let f = fixture(runtime);
        let limited = f
            .session
            .action_with(|_| {}, ActionOptions::rate_limited(0.001, 1));

        f.gateway.invoke(limited.id(), payload(&f.session)).unwrap();
        assert!(matches!(
            f.gateway.invoke(limited.id(), payload(&f.session)),
            Err(Error::RateLimited {
                scope: RateLimitScope::Action
            })
        ));

        // Other actions are unaffected.
        f.gateway.invoke(&f.action, payload(&f.session)).unwrap();
    }

    #[test]
    fn panics_are_contained() {
        let f = fixture(Runtime::default());
        let boom = f.session.action(|_| panic!("boom"));

        let err = f.gateway.invoke(boom.id(), payload(&f.session)).unwrap_err();
        assert!(matches!(err, Error::ActionPanicked { ref message, .. } if message == "boom"));

        f.gateway.invoke(&f.action, payload(&f.session)).unwrap();
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn values_are_injected_before_callback() {
        let f = fixture(Runtime::default());
        let name = f.session.value("server");
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let reader = name.clone();
        let read = f.session.action(move |_| *sink.lock() = reader.string());

        let request = payload(&f.session).with_value(name.id(), json!("client"));
        f.gateway.invoke(read.id(), request).unwrap();

        assert_eq!(seen.lock().as_str(), "client");
        assert!(!name.is_dirty());
    }

    #[test]
    fn component_actions_receive_component() {
        let f = fixture(Runtime::default());
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut handle = None;
        f.session.component(|c| {
            handle = Some(c.action(move |s| *sink.lock() = Some(s.is_component())));
        });

        f.gateway
            .invoke(handle.unwrap().id(), payload(&f.session))
            .unwrap();
        assert_eq!(*seen.lock(), Some(true));
    }

    #[test]
    fn constant_time_eq_matches_bytes() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
