//! Periodic routines bound to a page's lifetime.
//!
//! A routine ticks on the tokio runtime until it is stopped or the page is
//! disposed, whichever comes first. The first tick fires one period after
//! creation. Handlers are synchronous user code and run on the blocking
//! pool, one tick at a time. Handler panics are logged and the routine keeps
//! running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::error::panic_message;

use super::node::{Session, SessionNode};
use super::disposal::{DisposalListener, DisposalSignal};

const MIN_PERIOD: Duration = Duration::from_millis(1);

struct Shared {
    period: watch::Sender<Duration>,
    stop: DisposalSignal,
}

/// Handle to a running periodic routine.
///
/// Dropping the handle does not stop the routine.
#[derive(Clone)]
pub struct IntervalRoutine {
    shared: Arc<Shared>,
}

impl IntervalRoutine {
    pub(crate) fn spawn<F>(session: &Session, period: Duration, handler: F) -> Self
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let (period_tx, period_rx) = watch::channel(clamp(period));
        let routine = Self {
            shared: Arc::new(Shared {
                period: period_tx,
                stop: DisposalSignal::new(),
            }),
        };

        if session.is_dry() {
            return routine;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(session = %session.id(), "interval not started: no async runtime");
                return routine;
            }
        };

        runtime.spawn(run(
            Arc::clone(&routine.shared),
            Arc::downgrade(&session.0),
            session.disposal_listener(),
            period_rx,
            handler,
        ));
        routine
    }

    /// Change the period. The next tick fires one new period from now.
    pub fn update_interval(&self, period: Duration) {
        self.shared.period.send_replace(clamp(period));
    }

    /// Stop the routine. Calling this more than once is harmless.
    pub fn stop(&self) {
        self.shared.stop.dispose();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_disposed()
    }
}

fn clamp(period: Duration) -> Duration {
    if period < MIN_PERIOD {
        tracing::warn!(?period, "interval period too small, using 1ms");
        MIN_PERIOD
    } else {
        period
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run<F>(
    shared: Arc<Shared>,
    owner: Weak<SessionNode>,
    mut disposed: DisposalListener,
    mut period: watch::Receiver<Duration>,
    handler: F,
) where
    F: Fn(&Session) + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    let mut stopped = shared.stop.listener();
    let mut ticks = ticker(*period.borrow_and_update());

    loop {
        tokio::select! {
            _ = disposed.disposed() => break,
            _ = stopped.disposed() => break,
            changed = period.changed() => {
                if changed.is_err() {
                    break;
                }
                ticks = ticker(*period.borrow_and_update());
            }
            _ = ticks.tick() => {
                let Some(node) = owner.upgrade() else {
                    break;
                };
                let session = Session(node);
                let handler = Arc::clone(&handler);
                let outcome = tokio::task::spawn_blocking(move || {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&session))) {
                        tracing::error!(
                            session = %session.id(),
                            panic = %panic_message(payload.as_ref()),
                            "interval handler panicked"
                        );
                    }
                })
                .await;
                if let Err(error) = outcome {
                    tracing::error!(%error, "interval task failed");
                    break;
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
