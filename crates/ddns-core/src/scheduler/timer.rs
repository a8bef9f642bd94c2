//! Recurring per-task timers

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use super::Inner;

/// A live timer loop for one task
pub(super) struct TimerHandle {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Spawn a loop that ticks `task_id` every `every`, first tick one period from now
    ///
    /// The loop holds only a weak reference to the scheduler and exits when
    /// cancelled or when the scheduler is gone. A tick in progress is never
    /// interrupted by cancellation.
    pub(super) fn spawn(inner: Weak<Inner>, task_id: String, every: Duration) -> Self {
        let (cancel, mut cancelled) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => break,
                    _ = ticker.tick() => {}
                }

                let Some(inner) = inner.upgrade() else { break };
                inner.tick(&task_id).await;
            }

            debug!(task_id = %task_id, "Timer loop exited");
        });

        Self { cancel, handle }
    }

    /// Stop future firings; returns the loop handle so callers may wait on it
    pub(super) fn cancel(self) -> JoinHandle<()> {
        // The loop may already be gone
        let _ = self.cancel.send(());
        self.handle
    }
}
