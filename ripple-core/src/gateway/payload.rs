//! Inbound action payloads.
//!
//! The client sends its whole value snapshot with every request, as a JSON
//! object in the `datastar` query parameter. Two reserved keys identify the
//! page and carry its anti-forgery token; everything else is a value.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Reserved key carrying the page session id.
pub const SESSION_KEY: &str = "ripple-session";

/// Reserved key carrying the anti-forgery token.
pub const CSRF_KEY: &str = "ripple-csrf";

/// Query parameter the client puts its snapshot in.
pub const QUERY_PARAM: &str = "datastar";

/// A parsed action or stream request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundPayload {
    pub session_id: String,
    pub csrf_token: String,

    /// The client's values, reserved keys removed.
    pub values: Map<String, Value>,
}

impl InboundPayload {
    pub fn new(session_id: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            csrf_token: csrf_token.into(),
            values: Map::new(),
        }
    }

    /// Add a client value.
    pub fn with_value(mut self, id: impl Into<String>, value: Value) -> Self {
        self.values.insert(id.into(), value);
        self
    }

    /// Split the reserved keys out of a snapshot.
    pub fn from_map(mut values: Map<String, Value>) -> Self {
        let mut take = |key: &str| match values.remove(key) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let session_id = take(SESSION_KEY);
        let csrf_token = take(CSRF_KEY);

        Self {
            session_id,
            csrf_token,
            values,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(Self::from_map(map)),
            _ => Err(Error::Malformed("payload is not a JSON object".to_string())),
        }
    }

    /// Parse the raw `datastar` query parameter.
    pub fn from_query(raw: Option<&str>) -> Result<Self> {
        let raw = raw.ok_or_else(|| Error::Malformed(format!("missing '{QUERY_PARAM}' parameter")))?;
        Self::from_json(raw)
    }

    /// The snapshot as the client would send it.
    pub fn to_json(&self) -> String {
        let mut map = self.values.clone();
        map.insert(SESSION_KEY.to_string(), Value::String(self.session_id.clone()));
        map.insert(CSRF_KEY.to_string(), Value::String(self.csrf_token.clone()));
        Value::Object(map).to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reserved_keys_are_split_out() {
        let payload = InboundPayload::from_json(
            r#"{"ripple-session":"/_/abc","ripple-csrf":"tok","name":"ana","n":3}"#,
        )
        .unwrap();

        assert_eq!(payload.session_id, "/_/abc");
        assert_eq!(payload.csrf_token, "tok");
        assert_eq!(payload.values.len(), 2);
        assert_eq!(payload.values["n"], json!(3));
    }

    #[test]
    fn non_string_reserved_keys_read_as_empty() {
        let payload = InboundPayload::from_json(r#"{"ripple-session":1}"#).unwrap();
        assert_eq!(payload.session_id, "");
        assert!(payload.values.is_empty());
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(
            InboundPayload::from_query(None),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            InboundPayload::from_json("[1,2]"),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(InboundPayload::from_json("{"), Err(Error::Json(_))));
    }

    #[test]
    fn to_json_restores_reserved_keys() {
        let payload = InboundPayload::new("s", "t").with_value("a", json!("1"));
        assert_eq!(InboundPayload::from_json(&payload.to_json()).unwrap(), payload);
    }
}
