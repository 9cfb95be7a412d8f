//! Patch Pump
//!
//! One pump runs per open stream. It moves patch batches from the session's
//! mailbox onto the stream, in order.
//!
//! # States
//!
//! ```text
//!   Connecting ──initial frame──► Streaming ──closed / disposed──► Closed
//! ```
//!
//! While streaming the pump waits on three things at once:
//!
//! - the transport closing: the session is evicted (disposed and removed
//!   from the registry),
//! - the session being disposed elsewhere: the pump just stops,
//! - a batch arriving: each patch is translated and written.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::registry::SessionRegistry;
use crate::session::{Patch, Session};

use super::frame::Frame;
use super::TransportError;

/// Writable end of a stream.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<Frame>,
}

impl FrameSink {
    /// A sink and the receiver the transport reads frames from.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Resolves once the reading side is gone.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The client went away; the session was evicted.
    TransportClosed,

    /// The session was disposed by someone else.
    Disposed,
}

/// Drains one session's mailbox onto one stream.
pub struct PatchPump {
    session: Session,
    registry: Arc<SessionRegistry>,
    sink: FrameSink,
}

impl PatchPump {
    pub fn new(session: Session, registry: Arc<SessionRegistry>, sink: FrameSink) -> Self {
        Self {
            session,
            registry,
            sink,
        }
    }

    /// Run until the stream closes or the session is disposed.
    ///
    /// `reconnect` selects the initial sync: a reconnecting client gets the
    /// full view, a fresh one only the values (it already has the markup).
    pub async fn run(self, reconnect: bool) -> PumpExit {
        let id = self.session.id().clone();

        if self.sink.send(Frame::initial()).await.is_err() {
            tracing::debug!(session = %id, "stream closed before it started");
            self.registry.evict(&self.session);
            return PumpExit::TransportClosed;
        }
        self.session.set_connected(true);
        tracing::debug!(session = %id, reconnect, "stream established");

        let mut disposed = self.session.disposal_listener();
        let mut mailbox = self.session.page().mailbox.receiver().await;

        if reconnect {
            self.session.sync();
        } else {
            self.session.sync_values();
        }

        let exit = loop {
            tokio::select! {
                biased;

                _ = self.sink.closed() => {
                    tracing::debug!(session = %id, "stream ended");
                    self.registry.evict(&self.session);
                    break PumpExit::TransportClosed;
                }
                _ = disposed.disposed() => {
                    tracing::debug!(session = %id, "session disposed, closing stream");
                    break PumpExit::Disposed;
                }
                batch = mailbox.recv() => {
                    let Some(batch) = batch else {
                        break PumpExit::Disposed;
                    };
                    for patch in &batch {
                        self.write(patch).await;
                    }
                }
            }
        };

        self.session.set_connected(false);
        exit
    }

    async fn write(&self, patch: &Patch) {
        let frame = match Frame::from_patch(patch) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::error!(session = %self.session.id(), %error, "dropping patch");
                return;
            }
        };

        if let Err(error) = self.sink.send(frame).await {
            if self.sink.is_closed() {
                tracing::debug!(session = %self.session.id(), %error, "write after stream closed");
            } else {
                tracing::error!(session = %self.session.id(), %error, "failed to write patch");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::session::PatchKind;
    use crate::transport::frame::{EVENT_PATCH_ELEMENTS, EVENT_PATCH_SIGNALS, RECONNECT_SENTINEL};
    use std::time::Duration;
    use tokio::time::timeout;

    fn registered() -> (Arc<SessionRegistry>, Session) {
        let registry = Arc::new(SessionRegistry::new());
        let session = Session::new("/", &Runtime::default());
        session.value("v");
        session.view(|| "<p>hi</p>");
        registry.register(session.clone());
        (registry, session)
    }

    async fn next(rx: &mut mpsc::Receiver<Frame>) -> Frame {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn first_connect_sends_sentinel_then_values() {
        let (registry, session) = registered();
        let (sink, mut rx) = FrameSink::channel(8);
        let pump = tokio::spawn(PatchPump::new(session.clone(), registry, sink).run(false));

        let first = next(&mut rx).await;
        assert_eq!(first.id.as_deref(), Some(RECONNECT_SENTINEL));
        assert_eq!(next(&mut rx).await.event, EVENT_PATCH_SIGNALS);
        assert!(session.is_connected());

        session.dispose();
        assert_eq!(pump.await.unwrap(), PumpExit::Disposed);
    }

    #[tokio::test]
    async fn reconnect_sends_full_view_in_order() {
        let (registry, session) = registered();
        let (sink, mut rx) = FrameSink::channel(8);
        let pump = tokio::spawn(PatchPump::new(session.clone(), registry, sink).run(true));

        next(&mut rx).await;
        let elements = next(&mut rx).await;
        assert_eq!(elements.event, EVENT_PATCH_ELEMENTS);
        assert!(elements.lines[0].contains("<p>hi</p>"));
        assert_eq!(next(&mut rx).await.event, EVENT_PATCH_SIGNALS);

        session.exec_script("console.log(1)");
        let script = next(&mut rx).await;
        assert_eq!(script.lines[0], "selector body");

        session.dispose();
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn closed_transport_evicts_session() {
        let (registry, session) = registered();
        let (sink, mut rx) = FrameSink::channel(8);
        let pump = tokio::spawn(PatchPump::new(session.clone(), Arc::clone(&registry), sink).run(false));

        next(&mut rx).await;
        drop(rx);

        let exit = timeout(Duration::from_secs(1), pump).await.unwrap().unwrap();
        assert_eq!(exit, PumpExit::TransportClosed);
        assert!(session.is_disposed());
        assert!(registry.get(session.id().as_str()).is_err());
    }

    #[tokio::test]
    async fn invalid_url_patch_is_skipped() {
        let (registry, session) = registered();
        let (sink, mut rx) = FrameSink::channel(8);
        let pump = tokio::spawn(PatchPump::new(session.clone(), registry, sink).run(false));
        next(&mut rx).await;
        next(&mut rx).await;

        session.send_patch(PatchKind::ReplaceUrl, "bad url");
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.redirect("/ok");

        let frame = next(&mut rx).await;
        assert!(frame.lines[2].contains("window.location"));

        session.dispose();
        pump.await.unwrap();
    }
}
