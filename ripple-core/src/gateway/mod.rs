//! Action Gateway
//!
//! The HTTP-facing entry point for client-triggered actions. A request
//! names an action in its path and carries the client's value snapshot,
//! including the page session id and anti-forgery token.
//!
//! # Rate Limiting
//!
//! Two token buckets may guard an action: the session's (configured
//! app-wide) and the action's own. They are independent gates: a request
//! must pass both, and a stricter per-action limit never loosens the
//! session limit or the other way round.

mod dispatch;
mod payload;
mod ratelimit;

pub use dispatch::ActionGateway;
pub use payload::{InboundPayload, CSRF_KEY, QUERY_PARAM, SESSION_KEY};
pub use ratelimit::RateLimiter;
