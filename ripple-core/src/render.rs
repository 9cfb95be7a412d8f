//! Rendering Capability
//!
//! The engine does not build markup itself. A view is anything that can
//! write itself into a string buffer; the HTML composition layer sits on top
//! of this trait. Plain strings render verbatim, and a `Result` lets a view
//! report a failure that aborts the surrounding sync.
//!
//! [`Attr`] is the one piece of markup the engine does produce: the client
//! binding attributes emitted by reactive values and action handles.

use std::fmt;
use std::sync::Arc;

/// Error produced while rendering a view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Failed(String),

    #[error("formatting failed")]
    Fmt,
}

impl From<fmt::Error> for RenderError {
    fn from(_: fmt::Error) -> Self {
        Self::Fmt
    }
}

/// Something that can be written as markup.
pub trait Render {
    /// Append the markup for `self` to `out`.
    fn render_to(&self, out: &mut String) -> Result<(), RenderError>;

    /// Render into a fresh string.
    fn render(&self) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render_to(&mut out)?;
        Ok(out)
    }
}

impl Render for String {
    fn render_to(&self, out: &mut String) -> Result<(), RenderError> {
        out.push_str(self);
        Ok(())
    }
}

impl Render for &str {
    fn render_to(&self, out: &mut String) -> Result<(), RenderError> {
        out.push_str(self);
        Ok(())
    }
}

impl<R: Render> Render for Result<R, RenderError> {
    fn render_to(&self, out: &mut String) -> Result<(), RenderError> {
        match self {
            Ok(inner) => inner.render_to(out),
            Err(e) => Err(e.clone()),
        }
    }
}

impl<R: Render> Render for Vec<R> {
    fn render_to(&self, out: &mut String) -> Result<(), RenderError> {
        for item in self {
            item.render_to(out)?;
        }
        Ok(())
    }
}

/// A type-erased view function.
///
/// Stored by sessions; called on every render.
pub type ViewFn = Arc<dyn Fn(&mut String) -> Result<(), RenderError> + Send + Sync>;

/// Erase a closure returning any [`Render`] type into a [`ViewFn`].
pub(crate) fn erase_view<F, R>(view: F) -> ViewFn
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Render,
{
    Arc::new(move |out: &mut String| view().render_to(out))
}

/// An HTML attribute, rendered as `name="value"` with the value escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    name: String,
    value: String,
}

impl Attr {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unescaped value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, escape_attr(&self.value))
    }
}

impl Render for Attr {
    fn render_to(&self, out: &mut String) -> Result<(), RenderError> {
        use fmt::Write;
        write!(out, "{self}")?;
        Ok(())
    }
}

/// Escape a string for use inside a double-quoted attribute or text node.
pub fn escape_attr(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_render_verbatim() {
        assert_eq!("<p>hi</p>".render().unwrap(), "<p>hi</p>");
        assert_eq!(String::from("x").render().unwrap(), "x");
        assert_eq!(vec!["a", "b"].render().unwrap(), "ab");
    }

    #[test]
    fn failed_results_propagate() {
        let view: Result<String, RenderError> = Err(RenderError::Failed("nope".into()));
        assert_eq!(view.render(), Err(RenderError::Failed("nope".into())));
    }

    #[test]
    fn attr_escapes_value() {
        let attr = Attr::new("data-on:click", "$a='x' && @get('/_action/1')");
        assert_eq!(
            attr.to_string(),
            "data-on:click=\"$a=&#39;x&#39; &amp;&amp; @get(&#39;/_action/1&#39;)\""
        );
    }

    #[test]
    fn erased_view_renders() {
        let view = erase_view(|| format!("<b>{}</b>", 2));
        let mut out = String::new();
        view(&mut out).unwrap();
        assert_eq!(out, "<b>2</b>");
    }
}
