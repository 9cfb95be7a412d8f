//! Identifiers
//!
//! Session, component, value and action ids are short random hex strings.
//! Session ids also embed the route so logs stay readable; component ids
//! embed their page's id so a component can always be traced to its root.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use rand::RngCore;

/// Random hex string with `bytes * 2` characters.
fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Short random id used for values, actions and id suffixes.
pub(crate) fn short_id() -> String {
    random_hex(4)
}

/// Fresh anti-forgery token (32 hex characters).
pub(crate) fn csrf_token() -> String {
    random_hex(16)
}

/// Unique identifier for a session.
///
/// An empty id marks a session created for the dry construction pass; such
/// a session is never registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Generate a new id for a page served at `route`.
    pub fn for_route(route: &str) -> Self {
        Self(format!("{route}_/{}", short_id()).into())
    }

    /// Generate a new id for a component nested under `parent`.
    pub fn for_component(parent: &SessionId) -> Self {
        Self(format!("{}/_component/{}", parent.0, short_id()).into())
    }

    /// The id used by dry construction sessions.
    pub fn unassigned() -> Self {
        Self(Arc::from(""))
    }

    /// Whether this is the id of a dry construction session.
    pub fn is_unassigned(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.into())
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self(raw.into())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        let id1 = SessionId::for_route("/");
        let id2 = SessionId::for_route("/");
        let id3 = SessionId::for_route("/");

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ids_embed_route_and_parent() {
        let page = SessionId::for_route("/counter");
        assert!(page.as_str().starts_with("/counter_/"));

        let component = SessionId::for_component(&page);
        assert!(component.as_str().starts_with(page.as_str()));
        assert!(component.as_str().contains("/_component/"));
    }

    #[test]
    fn unassigned_is_empty() {
        assert!(SessionId::unassigned().is_unassigned());
        assert!(!SessionId::for_route("/").is_unassigned());
    }

    #[test]
    fn tokens_have_expected_length() {
        assert_eq!(csrf_token().len(), 32);
        assert_eq!(short_id().len(), 8);
    }
}
