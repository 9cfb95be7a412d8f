//! Sessions
//!
//! This module implements the server-side half of a page: the state that
//! lives between the first render and the moment the browser goes away.
//!
//! # Core Concepts
//!
//! ## Reactive Values
//!
//! Named values mirrored on the client. The server marks a value dirty when
//! it changes, and the next sync pushes exactly the dirty ones. Values the
//! client reports before an action overwrite the server copy without being
//! echoed back.
//!
//! ## Actions
//!
//! Server callbacks the client triggers by id. They are registered while a
//! page is constructed and invoked by the action gateway.
//!
//! ## Mailbox
//!
//! A bounded, non-blocking queue of outgoing patches. A producer that finds
//! it full drops its patch instead of waiting; the next full sync
//! supersedes anything lost.
//!
//! ## Components
//!
//! Child sessions nested in a page. They keep their own view and children
//! but declare values and actions on the page, so one mailbox and one
//! registry entry serve the whole tree.
//!
//! # Example
//!
//! ```rust,ignore
//! let session = Session::new("/", &runtime);
//! let count = session.value(0);
//!
//! let shown = count.clone();
//! session.view(move || format!("<p>{}</p>", shown.as_i64()));
//!
//! let increment = session.action(move |s| {
//!     count.set(count.as_i64() + 1);
//!     s.sync();
//! });
//! ```

mod action;
mod disposal;
mod id;
mod interval;
mod mailbox;
mod node;
mod value;

pub use self::action::{ActionFn, ActionHandle, ActionOptions, ACTION_ROUTE_PREFIX};
pub use self::node::{ComponentView, Session};
pub use self::id::SessionId;
pub use self::interval::IntervalRoutine;
pub use self::mailbox::{Mailbox, MailboxReceiver, Patch, PatchBatch, PatchKind, MAILBOX_CAPACITY};
pub use self::value::{ReactiveValue, ValueError};

pub(crate) use self::action::ActionEntry;
pub(crate) use self::id::csrf_token as random_token;
pub(crate) use self::node::PageState;
