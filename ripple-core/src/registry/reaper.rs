//! Reaper
//!
//! Sessions whose browser never opened a stream (or closed the tab before
//! the close beacon arrived) would otherwise live forever. The reaper wakes
//! up periodically and evicts every session that has no connection and is
//! older than the TTL.
//!
//! A session that connects between the snapshot and its eviction is still
//! evicted; the client treats a vanished session as a cue to reload.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::table::SessionRegistry;

/// Evict disconnected sessions older than `ttl` as of `now`.
///
/// Returns the number of sessions evicted.
pub fn reap_expired(registry: &SessionRegistry, ttl: Duration, now: Instant) -> usize {
    let orphans: Vec<_> = registry
        .snapshot()
        .into_iter()
        .filter(|session| {
            !session.is_connected() && now.saturating_duration_since(session.created_at()) > ttl
        })
        .collect();

    for session in &orphans {
        tracing::info!(
            session = %session.id(),
            ttl_secs = ttl.as_secs(),
            "reaping orphaned session"
        );
        registry.evict(session);
    }
    orphans.len()
}

/// Handle to the background reaper task.
///
/// Dropping the handle also stops the task.
pub struct Reaper {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Reaper {
    /// Start sweeping `registry` every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(registry: Arc<SessionRegistry>, ttl: Duration, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (stop, mut stopped) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        reap_expired(&registry, ttl, Instant::now());
                    }
                }
            }
            tracing::debug!("reaper stopped");
        });

        tracing::debug!(?ttl, ?interval, "reaper started");
        Self { stop, task }
    }

    /// Stop the reaper and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(error) = self.task.await {
            tracing::error!(%error, "reaper task failed");
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
    use crate::session::Session;

    #[test]
    fn evicts_only_disconnected_expired_sessions() {
        let registry = SessionRegistry::new();
        let orphan = Session::new("/", &Runtime::default());
        let live = Session::new("/", &Runtime::default());
        live.set_connected(true);
        registry.register(orphan.clone());
        registry.register(live.clone());

        let ttl = Duration::from_secs(10);
        assert_eq!(reap_expired(&registry, ttl, Instant::now()), 0);

        let later = Instant::now() + Duration::from_secs(11);
        assert_eq!(reap_expired(&registry, ttl, later), 1);

        assert!(registry.get(orphan.id().as_str()).is_err());
        assert!(orphan.is_disposed());
        assert!(registry.get(live.id().as_str()).is_ok());
    }

    #[tokio::test]
    async fn background_sweep_runs_and_stops() {
        let registry = Arc::new(SessionRegistry::new());
        registry.register(Session::new("/", &Runtime::default()));

        let reaper = Reaper::spawn(Arc::clone(&registry), Duration::ZERO, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_empty());

        tokio::time::timeout(Duration::from_secs(1), reaper.stop())
            .await
            .unwrap();
    }
}
