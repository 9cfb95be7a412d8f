//! Wire frames.
//!
//! Patches are translated into server-sent events in the Datastar dialect.
//! Everything ends up as one of two event types: element patches and
//! signal patches. Scripts, redirects and URL replacement are element
//! patches that append a self-removing `<script>` to the body.

use std::fmt::Write as _;

use axum::http::Uri;
use axum::response::sse::Event;

use crate::session::{Patch, PatchKind};

use super::TransportError;

/// Event id of the first frame on every stream.
///
/// A client that reconnects echoes it back in `Last-Event-ID`.
pub const RECONNECT_SENTINEL: &str = "ripple";

pub const EVENT_PATCH_ELEMENTS: &str = "datastar-patch-elements";
pub const EVENT_PATCH_SIGNALS: &str = "datastar-patch-signals";

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: &'static str,
    pub id: Option<String>,

    /// Data lines, without the `data: ` prefix.
    pub lines: Vec<String>,
}

impl Frame {
    /// The empty element patch that opens a stream.
    pub fn initial() -> Self {
        Self {
            event: EVENT_PATCH_ELEMENTS,
            id: Some(RECONNECT_SENTINEL.to_string()),
            lines: Vec::new(),
        }
    }

    pub fn elements(html: &str) -> Self {
        Self {
            event: EVENT_PATCH_ELEMENTS,
            id: None,
            lines: prefixed("elements", html),
        }
    }

    /// `json` is an object mapping value ids to their string forms.
    pub fn signals(json: &str) -> Self {
        Self {
            event: EVENT_PATCH_SIGNALS,
            id: None,
            lines: prefixed("signals", json),
        }
    }

    pub fn script(script: &str) -> Self {
        let mut lines = vec!["selector body".to_string(), "mode append".to_string()];
        let element = format!("<script data-effect=\"el.remove()\">{script}</script>");
        lines.extend(prefixed("elements", &element));
        Self {
            event: EVENT_PATCH_ELEMENTS,
            id: None,
            lines,
        }
    }

    pub fn redirect(url: &str) -> Self {
        Self::script(&format!("setTimeout(() => window.location = {})", js_string(url)))
    }

    /// Fails if `url` is not a valid URI reference.
    pub fn replace_url(url: &str) -> Result<Self, TransportError> {
        url.parse::<Uri>()
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::script(&format!(
            "window.history.replaceState({{}}, \"\", {})",
            js_string(url)
        )))
    }

    /// Translate a queued patch.
    pub fn from_patch(patch: &Patch) -> Result<Self, TransportError> {
        match patch.kind {
            PatchKind::Elements => Ok(Self::elements(&patch.payload)),
            PatchKind::Values => Ok(Self::signals(&patch.payload)),
            PatchKind::Script => Ok(Self::script(&patch.payload)),
            PatchKind::Redirect => Ok(Self::redirect(&patch.payload)),
            PatchKind::ReplaceUrl => Self::replace_url(&patch.payload),
        }
    }

    /// Convert to an axum SSE event.
    pub fn to_event(&self) -> Event {
        let mut event = Event::default().event(self.event);
        if let Some(id) = &self.id {
            event = event.id(id);
        }
        if !self.lines.is_empty() {
            event = event.data(self.lines.join("\n"));
        }
        event
    }

    /// The frame in `text/event-stream` form.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "event: {}", self.event);
        if let Some(id) = &self.id {
            let _ = writeln!(out, "id: {id}");
        }
        for line in &self.lines {
            let _ = writeln!(out, "data: {line}");
        }
        out.push('\n');
        out
    }
}

/// One `key line` entry per line of `body`.
///
/// SSE fields may not contain `\r` or `\n`, so every line ending style
/// (`\n`, `\r\n` and a lone `\r`) splits a line.
fn prefixed(key: &str, body: &str) -> Vec<String> {
    let normalized = body.replace("\r\n", "\n");
    let body = normalized
        .strip_suffix(['\n', '\r'])
        .unwrap_or(normalized.as_str());
    if body.is_empty() {
        return Vec::new();
    }
    body.split(['\n', '\r'])
        .map(|line| format!("{key} {line}"))
        .collect()
}

/// Quote `raw` as a JavaScript string literal.
pub(crate) fn js_string(raw: &str) -> String {
    serde_json::Value::String(raw.to_string()).to_string()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_frame_carries_sentinel() {
        assert_eq!(
            Frame::initial().encode(),
            "event: datastar-patch-elements\nid: ripple\n\n"
        );
    }

    #[test]
    fn elements_are_split_per_line() {
        let frame = Frame::elements("<div id=\"a\">\n<p>x</p>\n</div>");
        assert_eq!(
            frame.lines,
            vec!["elements <div id=\"a\">", "elements <p>x</p>", "elements </div>"]
        );
    }

    #[test]
    fn carriage_returns_never_reach_a_field() {
        let script = Frame::from_patch(&Patch::new(PatchKind::Script, "let a = 1;\rlet b = 2;")).unwrap();
        assert!(script.lines.iter().all(|line| !line.contains(['\r', '\n'])));
        let _ = script.to_event();

        let elements = Frame::from_patch(&Patch::new(PatchKind::Elements, "<p>a\rb</p>\r\n<p>c</p>")).unwrap();
        assert_eq!(
            elements.lines,
            vec!["elements <p>a", "elements b</p>", "elements <p>c</p>"]
        );
        let _ = elements.to_event();
    }

    #[test]
    fn signals_frame() {
        let frame = Frame::from_patch(&Patch::new(PatchKind::Values, r#"{"a":"1"}"#)).unwrap();
        assert_eq!(
            frame.encode(),
            "event: datastar-patch-signals\ndata: signals {\"a\":\"1\"}\n\n"
        );
    }

    #[test]
    fn script_appends_self_removing_element() {
        let frame = Frame::script("alert(1)");
        assert_eq!(frame.event, EVENT_PATCH_ELEMENTS);
        assert_eq!(
            frame.lines,
            vec![
                "selector body",
                "mode append",
                "elements <script data-effect=\"el.remove()\">alert(1)</script>",
            ]
        );
    }

    #[test]
    fn redirect_quotes_url() {
        let frame = Frame::redirect("/next?a=\"b\"");
        assert!(frame.lines[2].contains(r#"window.location = "/next?a=\"b\"""#));
    }

    #[test]
    fn replace_url_validates() {
        let frame = Frame::replace_url("/items?page=2").unwrap();
        assert!(frame.lines[2].contains(r#"window.history.replaceState({}, "", "/items?page=2")"#));

        assert!(matches!(
            Frame::replace_url("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
