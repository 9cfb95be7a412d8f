//! The HTML document wrapped around every page.

use std::fmt::Write as _;

use crate::config::Options;
use crate::gateway::{CSRF_KEY, SESSION_KEY};
use crate::render::{escape_attr, Attr};
use crate::session::Session;
use crate::transport::js_string;

use super::routes::{CLOSE_ROUTE, STREAM_ROUTE};

#[derive(Debug, Clone)]
pub(crate) struct DocumentShell {
    title: String,
    script_path: String,
    head: Vec<String>,
    foot: Vec<String>,
}

impl DocumentShell {
    pub(crate) fn from_options(options: &Options) -> Self {
        Self {
            title: options.document_title.clone(),
            script_path: options.script_path.clone(),
            head: options.head_includes.clone(),
            foot: options.foot_includes.clone(),
        }
    }

    pub(crate) fn append_head(&mut self, html: String) {
        self.head.push(html);
    }

    pub(crate) fn append_foot(&mut self, html: String) {
        self.foot.push(html);
    }

    /// Render the full document for `session` with `body` as its content.
    pub(crate) fn render(&self, session: &Session, body: &str) -> String {
        // The id embeds the route, so it is quoted as a JS string.
        let id = js_string(session.id().as_str());
        let signals = Attr::new(
            "data-signals",
            format!(
                "{{'{SESSION_KEY}':{id},'{CSRF_KEY}':{}}}",
                js_string(session.csrf_token())
            ),
        );
        let stream = Attr::new("data-init", format!("@get('{STREAM_ROUTE}')"));
        let beacon = Attr::new(
            "data-init",
            format!(
                "window.addEventListener('beforeunload', () => navigator.sendBeacon('{CLOSE_ROUTE}', {id}))"
            ),
        );

        let mut out = String::with_capacity(body.len() + 1024);
        out.push_str("<!doctype html>\n<html>\n<head>\n");
        out.push_str("<meta charset=\"utf-8\">\n");
        out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        let _ = writeln!(out, "<title>{}</title>", escape_attr(&self.title));
        let _ = writeln!(
            out,
            "<script type=\"module\" {}></script>",
            Attr::new("src", self.script_path.as_str())
        );
        for include in &self.head {
            out.push_str(include);
            out.push('\n');
        }
        let _ = writeln!(out, "<meta {signals}>\n<meta {stream}>\n<meta {beacon}>");
        out.push_str("</head>\n<body>\n");
        out.push_str(body);
        out.push('\n');
        for include in &self.foot {
            out.push_str(include);
            out.push('\n');
        }
        out.push_str("</body>\n</html>\n");
        out
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn document_wires_session_and_stream() {
        let mut options = Options::default();
        options.document_title = "Demo & Co".to_string();
        let mut shell = DocumentShell::from_options(&options);
        shell.append_head("<link rel=\"stylesheet\" href=\"/app.css\">".to_string());
        shell.append_foot("<footer>f</footer>".to_string());

        let session = Session::new("/", &Runtime::default());
        let html = shell.render(&session, "<main></main>");

        assert!(html.contains("<title>Demo &amp; Co</title>"));
        assert!(html.contains("src=\"/_datastar.js\""));
        assert!(html.contains(session.csrf_token()));
        assert!(html.contains("@get(&#39;/_sse&#39;)"));
        assert!(html.contains("/_session/close"));

        let head_end = html.find("</head>").unwrap();
        assert!(html.find("/app.css").unwrap() < head_end);
        assert!(html.find("<footer>").unwrap() > html.find("<main>").unwrap());
    }

    #[test]
    fn quotes_in_routes_stay_inside_js_strings() {
        let shell = DocumentShell::from_options(&Options::default());
        let session = Session::new("/it's", &Runtime::default());
        let html = shell.render(&session, "");

        let quoted = escape_attr(&js_string(session.id().as_str()));
        assert!(quoted.starts_with("&#34;/it&#39;s_/"));
        assert!(html.contains(&format!("&#39;ripple-session&#39;:{quoted}")));
        assert!(html.contains(&format!("&#39;/_session/close&#39;, {quoted})")));
        assert!(!html.contains("&#39;/it&#39;s"));
    }
}
