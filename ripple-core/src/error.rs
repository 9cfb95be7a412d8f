//! Error Types
//!
//! Every failure the engine can observe is one of a small set of kinds.
//! None of them is fatal to the serving process: lookup misses are logged
//! and swallowed, authentication and rate-limit rejections become client
//! visible status codes, and panicking callbacks are contained.
//!
//! The only error a host is expected to treat as fatal is
//! [`Error::PageConstruction`], which is returned from the dry construction
//! pass when a page is registered.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::pubsub::PubSubError;
use crate::render::RenderError;
use crate::transport::TransportError;

/// Which limiter rejected an action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// The session-wide default limiter.
    Session,
    /// The limiter attached to a single action.
    Action,
}

impl std::fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Action => f.write_str("action"),
        }
    }
}

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session expired or never existed.
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// No action with this id is registered on the session.
    #[error("action '{action}' not found on session '{session}'")]
    ActionNotFound { session: String, action: String },

    /// The anti-forgery token did not match.
    #[error("invalid anti-forgery token")]
    Forbidden,

    /// A token bucket denied the request.
    #[error("rate limited ({scope} limiter)")]
    RateLimited { scope: RateLimitScope },

    /// An action callback panicked. The panic was contained.
    #[error("action '{action}' panicked: {message}")]
    ActionPanicked { action: String, message: String },

    /// A page or component was declared with missing or invalid parts.
    #[error("malformed session: {0}")]
    Malformed(String),

    /// The dry construction pass for a page failed.
    #[error("page '{route}' failed to construct: {message}")]
    PageConstruction { route: String, message: String },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    PubSub(#[from] PubSubError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is a lookup miss.
    ///
    /// Callers treat these as "expired or never existed", never as a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::ActionNotFound { .. })
    }

    /// The HTTP status this error is reported with.
    ///
    /// Only rejections the client can act on get a non-success status.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::PageConstruction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Bodies stay empty so nothing about the failure leaks to the client.
        self.status().into_response()
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_client_statuses() {
        assert_eq!(Error::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::RateLimited { scope: RateLimitScope::Action }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            Error::SessionNotFound("x".into()).status(),
            StatusCode::OK
        );
    }

    #[test]
    fn lookup_misses_are_not_found() {
        assert!(Error::SessionNotFound("a".into()).is_not_found());
        assert!(Error::ActionNotFound {
            session: "a".into(),
            action: "b".into()
        }
        .is_not_found());
        assert!(!Error::Forbidden.is_not_found());
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
