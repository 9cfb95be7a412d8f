//! Ripple Core
//!
//! This crate provides the server runtime for Ripple, a framework for
//! server-driven web UIs. The browser holds a thin client; all state and
//! logic live in per-page sessions on the server, and changes travel to the
//! browser as patches over a server-sent event stream.
//!
//! It implements:
//!
//! - Sessions with reactive values, actions and nested components
//! - A registry of live sessions and a reaper for orphaned ones
//! - The patch pump that streams a session's mailbox to its browser
//! - The action gateway (anti-forgery check, rate limiting, dispatch)
//! - A pub/sub bridge so sessions can talk to each other
//!
//! # Architecture
//!
//! - `session`: per-page state, values, actions, the mailbox
//! - `registry`: live session table and the TTL reaper
//! - `transport`: SSE frames and the patch pump
//! - `gateway`: inbound action handling
//! - `pubsub`: backend contract, in-memory backend, session bridge
//! - `store`: request-scoped key/value store
//! - `app`: the HTTP shell tying it all together
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{App, Options};
//!
//! let app = App::new(Options::default());
//! app.page("/", |s| {
//!     let count = s.value(0);
//!
//!     let shown = count.clone();
//!     let increment = s.action(move |s| {
//!         count.set(count.as_i64() + 1);
//!         s.sync();
//!     });
//!     s.view(move || {
//!         format!("<button {}>{}</button>", increment.on_click(), shown.text())
//!     });
//! })?;
//!
//! app.run().await?;
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pubsub;
pub mod registry;
pub mod render;
pub mod runtime;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod transport;

pub use app::{App, AppBuilder};
pub use config::{Options, RateLimitConfig};
pub use error::{Error, Result};
pub use render::{Attr, Render};
pub use session::{ActionHandle, ActionOptions, ReactiveValue, Session};
