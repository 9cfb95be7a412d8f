//! Mailbox
//!
//! Each page has one mailbox: a bounded queue of patches waiting for the
//! patch pump. Producers never wait. If the mailbox already holds an
//! undelivered batch the new one is dropped.
//!
//! Dropping is the accepted trade-off for liveness: an elements patch is a
//! full re-render, so the next sync supersedes anything that was lost, and
//! value deltas are only marked delivered when their batch was accepted.
//!
//! A batch is the unit of delivery. One `sync()` enqueues its elements
//! patch and its value-delta patch as a single batch, elements first, so
//! the pair is either delivered together and in order or not at all.

use std::sync::Arc;

use smallvec::SmallVec;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Number of undelivered batches a mailbox holds.
pub const MAILBOX_CAPACITY: usize = 1;

/// What a patch does on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// Replace elements, merged by element id.
    Elements,
    /// Replace values (a JSON object of name to string).
    Values,
    /// Run a script.
    Script,
    /// Navigate to a URL.
    Redirect,
    /// Replace the current URL without navigating.
    ReplaceUrl,
}

/// One unit of pushed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub kind: PatchKind,
    pub payload: String,
}

impl Patch {
    pub fn new(kind: PatchKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Patches delivered together, in order.
pub type PatchBatch = SmallVec<[Patch; 2]>;

/// Receiving half, held by the patch pump for the life of a connection.
pub type MailboxReceiver = OwnedMutexGuard<mpsc::Receiver<PatchBatch>>;

/// Bounded, non-blocking patch queue.
pub struct Mailbox {
    tx: mpsc::Sender<PatchBatch>,
    rx: Arc<AsyncMutex<mpsc::Receiver<PatchBatch>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }

    /// Enqueue a batch without waiting.
    ///
    /// Returns `false` if the batch was dropped.
    pub fn try_send(&self, batch: PatchBatch) -> bool {
        if batch.is_empty() {
            return true;
        }
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(batch)) => {
                tracing::trace!(patches = batch.len(), "mailbox full, dropping batch");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Enqueue a single patch without waiting.
    pub fn send_patch(&self, patch: Patch) -> bool {
        let mut batch = PatchBatch::new();
        batch.push(patch);
        self.try_send(batch)
    }

    /// Take exclusive ownership of the receiving half.
    ///
    /// Waits while another pump still holds it.
    pub async fn receiver(&self) -> MailboxReceiver {
        Arc::clone(&self.rx).lock_owned().await
    }

    /// Take the next batch if one is waiting and no pump holds the receiver.
    pub fn try_take(&self) -> Option<PatchBatch> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
