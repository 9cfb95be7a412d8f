//! Disposal Signal
//!
//! Disposal is the single cancellation primitive for a page. It is
//! broadcast once to every listener: the patch pump, interval routines and
//! anything else bound to the page's lifetime.
//!
//! Signalling twice is a no-op; the first caller wins and later callers
//! learn that disposal already happened.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// One-shot broadcast cancellation.
pub struct DisposalSignal {
    /// Whether the signal has fired.
    disposed: AtomicBool,

    tx: watch::Sender<bool>,
}

impl DisposalSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            disposed: AtomicBool::new(false),
            tx,
        }
    }

    /// Fire the signal.
    ///
    /// Returns `true` only for the call that actually fired it.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.tx.send_replace(true);
        true
    }

    /// Check if the signal has fired.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// A listener that resolves once the signal fires.
    pub fn listener(&self) -> DisposalListener {
        DisposalListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for DisposalSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`DisposalSignal`].
#[derive(Clone)]
pub struct DisposalListener {
    rx: watch::Receiver<bool>,
}

impl DisposalListener {
    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn disposed(&mut self) {
        // The sender lives as long as the page; an error means it is gone,
        // which is as final as disposal.
        let _ = self.rx.wait_for(|disposed| *disposed).await;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn dispose_fires_once() {
        let signal = DisposalSignal::new();
        assert!(!signal.is_disposed());

        assert!(signal.dispose());
        assert!(!signal.dispose());
        assert!(!signal.dispose());
        assert!(signal.is_disposed());
    }

    #[tokio::test]
    async fn every_listener_observes_disposal() {
        let signal = DisposalSignal::new();
        let mut first = signal.listener();
        let mut second = signal.listener();

        signal.dispose();

        tokio::time::timeout(Duration::from_secs(1), first.disposed())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), second.disposed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn late_listener_resolves_immediately() {
        let signal = DisposalSignal::new();
        signal.dispose();

        let mut late = signal.listener();
        tokio::time::timeout(Duration::from_secs(1), late.disposed())
            .await
            .unwrap();
    }
}
