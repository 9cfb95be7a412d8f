//! Reactive Value Implementation
//!
//! A reactive value is a named, server-held value that mirrors a piece of
//! client state. The server diffs these values and pushes the ones that
//! changed.
//!
//! # How Reactive Values Work
//!
//! 1. A page declares a value. The input is serialized once, at declaration
//!    time, into a stored representation that always has a string form.
//!    Composite inputs (arrays, objects) are stored as their JSON text.
//!
//! 2. Server logic calls [`ReactiveValue::set`], which marks the value
//!    dirty. The next sync includes it in the value-delta patch.
//!
//! 3. Before every action the client reports its current values. Those
//!    overwrite the stored value and clear the dirty flag, so client-origin
//!    updates are never echoed back.
//!
//! # Revisions
//!
//! Every write bumps a revision counter. A sync records the revision it
//! saw and only clears the dirty flag if nothing wrote the value in the
//! meantime, so a concurrent `set` is never lost.
//!
//! # Thread Safety
//!
//! The handle is a cheap `Arc` clone; the state sits behind a
//! `parking_lot::Mutex`.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::render::Attr;

/// Why a value could not be declared.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("value '{0}' was declared with a null input")]
    Null(String),

    #[error("value '{id}' could not be serialized: {message}")]
    Serialize { id: String, message: String },
}

/// The string form of a stored value.
///
/// Strings render without quotes; everything else renders as compact JSON.
pub(crate) fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serialize a declared input into its stored representation.
fn to_stored(id: &str, input: impl Serialize) -> Result<Value, ValueError> {
    let value = serde_json::to_value(input).map_err(|e| ValueError::Serialize {
        id: id.to_string(),
        message: e.to_string(),
    })?;

    match value {
        Value::Null => Err(ValueError::Null(id.to_string())),
        composite @ (Value::Array(_) | Value::Object(_)) => {
            Ok(Value::String(composite.to_string()))
        }
        scalar => Ok(scalar),
    }
}

#[derive(Debug)]
struct ValueState {
    value: Value,
    dirty: bool,
    revision: u64,
    error: Option<ValueError>,
}

/// A named value tracked by a session.
///
/// # Example
///
/// ```rust,ignore
/// let name = session.value("world");
///
/// // Server-side update, pushed on the next sync
/// name.set("ripple");
/// session.sync();
/// ```
#[derive(Clone)]
pub struct ReactiveValue {
    /// Identifier, scoped to the owning page.
    id: Arc<str>,

    state: Arc<Mutex<ValueState>>,
}

impl ReactiveValue {
    /// Declare a value from any serializable input.
    ///
    /// A null input or one that fails to serialize yields an errored
    /// placeholder whose string form is `"error"`; it is never pushed.
    pub(crate) fn declare(id: String, input: impl Serialize) -> Self {
        let state = match to_stored(&id, input) {
            Ok(value) => ValueState {
                value,
                dirty: true,
                revision: 0,
                error: None,
            },
            Err(error) => ValueState {
                value: Value::String("error".to_string()),
                dirty: false,
                revision: 0,
                error: Some(error),
            },
        };

        Self {
            id: id.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create a value the client reported but the server never declared.
    ///
    /// It starts clean: the client already has it.
    pub(crate) fn from_client(id: String, value: Value) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(Mutex::new(ValueState {
                value,
                dirty: false,
                revision: 0,
                error: None,
            })),
        }
    }

    /// The value's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The stored value.
    pub fn get(&self) -> Value {
        self.state.lock().value.clone()
    }

    /// Set a new value and mark it for the next sync.
    ///
    /// A previous declaration error is cleared.
    pub fn set(&self, input: impl Serialize) {
        match to_stored(&self.id, input) {
            Ok(value) => {
                let mut state = self.state.lock();
                state.value = value;
                state.dirty = true;
                state.revision += 1;
                state.error = None;
            }
            Err(error) => {
                tracing::warn!(value = %self.id, %error, "ignoring value update");
            }
        }
    }

    /// Overwrite with a client-reported value. Clears the dirty flag.
    pub(crate) fn inject(&self, value: Value) {
        let mut state = self.state.lock();
        state.value = value;
        state.dirty = false;
        state.revision += 1;
        state.error = None;
    }

    /// Whether the value changed on the server since it was last pushed.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// The declaration error, if this is an errored placeholder.
    pub fn error(&self) -> Option<ValueError> {
        self.state.lock().error.clone()
    }

    /// Current revision and string form, if the value is dirty and valid.
    pub(crate) fn pending(&self) -> Option<(u64, String)> {
        let state = self.state.lock();
        if let Some(error) = &state.error {
            tracing::warn!(value = %self.id, %error, "value is out of sync");
            return None;
        }
        state
            .dirty
            .then(|| (state.revision, string_form(&state.value)))
    }

    /// Clear the dirty flag if nothing wrote the value since `revision`.
    pub(crate) fn mark_delivered(&self, revision: u64) {
        let mut state = self.state.lock();
        if state.revision == revision {
            state.dirty = false;
        }
    }

    /// The value as a string.
    pub fn string(&self) -> String {
        string_form(&self.state.lock().value)
    }

    /// Read as a bool: `true`, `1`, `yes` and `on` (any case) are true.
    pub fn as_bool(&self) -> bool {
        matches!(
            self.string().to_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        )
    }

    /// Read as an integer, or 0.
    pub fn as_i64(&self) -> i64 {
        self.string().trim().parse().unwrap_or(0)
    }

    /// Read as a float, or 0.0.
    pub fn as_f64(&self) -> f64 {
        self.string().trim().parse().unwrap_or(0.0)
    }

    /// Attribute binding an input element to this value.
    pub fn bind(&self) -> Attr {
        Attr::new("data-bind", self.id.to_string())
    }

    /// A span whose text follows this value on the client.
    pub fn text(&self) -> String {
        format!("<span {}></span>", Attr::new("data-text", format!("${}", self.id)))
    }
}

impl Debug for ReactiveValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReactiveValue")
            .field("id", &self.id)
            .field("value", &state.value)
            .field("dirty", &state.dirty)
            .finish()
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
    fn scalars_keep_their_string_form() {
        let cases: Vec<(Value, &str)> = vec![
            (json!("test"), "test"),
            (json!(1), "1"),
            (json!(-99), "-99"),
            (json!(1.1), "1.1"),
            (json!(-34.345), "-34.345"),
            (json!(true), "true"),
            (json!(false), "false"),
        ];
        for (input, expected) in cases {
            let value = ReactiveValue::declare("v".into(), input);
            assert_eq!(value.string(), expected);
        }
    }

    #[test]
    fn composites_are_stored_as_json_text() {
        #[derive(Serialize)]
        struct Point {
            num: i32,
            is_positive: bool,
        }

        let list = ReactiveValue::declare("l".into(), vec![1, 2]);
        assert_eq!(list.get(), Value::String("[1,2]".into()));

        let point = ReactiveValue::declare("p".into(), Point { num: 1, is_positive: true });
        let parsed: Value = serde_json::from_str(&point.string()).unwrap();
        assert_eq!(parsed, json!({"num": 1, "is_positive": true}));
    }

    #[test]
    fn null_input_yields_errored_placeholder() {
        let value = ReactiveValue::declare("n".into(), Option::<i32>::None);
        assert_eq!(value.string(), "error");
        assert!(matches!(value.error(), Some(ValueError::Null(_))));
        assert!(value.pending().is_none());
    }

    #[test]
    fn declared_values_start_dirty() {
        let value = ReactiveValue::declare("d".into(), 5);
        assert!(value.is_dirty());
        assert_eq!(value.pending(), Some((0, "5".to_string())));
    }

    #[test]
    fn set_marks_dirty_and_clears_error() {
        let value = ReactiveValue::declare("s".into(), Option::<i32>::None);
        value.set(42);
        assert!(value.is_dirty());
        assert!(value.error().is_none());
        assert_eq!(value.as_i64(), 42);
    }

    #[test]
    fn inject_clears_dirty() {
        let value = ReactiveValue::declare("i".into(), "a");
        value.inject(json!("b"));
        assert!(!value.is_dirty());
        assert_eq!(value.string(), "b");
    }

    #[test]
    fn delivery_does_not_clear_newer_writes() {
        let value = ReactiveValue::declare("r".into(), 1);
        let (revision, _) = value.pending().unwrap();

        value.set(2);
        value.mark_delivered(revision);
        assert!(value.is_dirty());

        let (revision, text) = value.pending().unwrap();
        assert_eq!(text, "2");
        value.mark_delivered(revision);
        assert!(!value.is_dirty());
    }

    #[test]
    fn typed_readers() {
        assert!(ReactiveValue::declare("b".into(), "Yes").as_bool());
        assert!(!ReactiveValue::declare("b".into(), "nope").as_bool());
        assert_eq!(ReactiveValue::declare("i".into(), "12").as_i64(), 12);
        assert_eq!(ReactiveValue::declare("i".into(), "x").as_i64(), 0);
        assert_eq!(ReactiveValue::declare("f".into(), 2.5).as_f64(), 2.5);
    }

    #[test]
    fn clone_shares_state() {
        let v1 = ReactiveValue::declare("c".into(), 0);
        let v2 = v1.clone();

        v1.set(42);
        assert_eq!(v2.as_i64(), 42);
    }

    #[test]
    fn binding_attributes() {
        let value = ReactiveValue::declare("abc".into(), 0);
        assert_eq!(value.bind().to_string(), "data-bind=\"abc\"");
        assert_eq!(value.text(), "<span data-text=\"$abc\"></span>");
    }
}
