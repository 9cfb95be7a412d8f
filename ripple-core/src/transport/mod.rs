//! Streaming Transport
//!
//! Each live page holds one server-sent-events stream. The transport layer
//! owns the wire format and the per-stream loop that feeds it.
//!
//! # How Delivery Works
//!
//! 1. The stream endpoint looks the session up and opens a [`FrameSink`].
//!    The HTTP response reads frames from the other end.
//!
//! 2. A [`PatchPump`] writes the reconnect sentinel, marks the session
//!    connected and queues an initial sync.
//!
//! 3. The pump drains the mailbox, translating each patch into a
//!    [`Frame`]. Patches from one sync arrive as one batch, elements first.
//!
//! 4. When the client goes away the pump evicts the session. When the
//!    session is disposed first, the pump stops and the stream ends.

mod frame;
mod pump;

pub use frame::{Frame, EVENT_PATCH_ELEMENTS, EVENT_PATCH_SIGNALS, RECONNECT_SENTINEL};
pub use pump::{FrameSink, PatchPump, PumpExit};

pub(crate) use frame::js_string;

use std::time::Duration;

/// Interval between keep-alive comments on an idle stream.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Frames buffered between a pump and the HTTP response.
pub const FRAME_BUFFER: usize = 16;

/// Stream failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("stream closed")]
    Closed,

    #[error("invalid url {0}")]
    InvalidUrl(String),
}
