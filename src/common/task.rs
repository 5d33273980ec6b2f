use std::{future::Future, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A repeating task that runs `tick` every `period` until cancelled.
///
/// The first tick happens one full period after spawning. Ticks never
/// overlap: a slow tick delays the next one instead of stacking up, and a
/// cancel aborts an in-flight tick at its next suspension point. Dropping
/// the handle cancels the task.
pub struct PeriodicTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick() => {}
                }
            }
        });

        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A detached unit of work whose completion can optionally be awaited.
///
/// Dropping the handle does not stop the work.
pub struct BackgroundTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(work),
        }
    }

    /// Waits for the work to finish. `None` if it panicked or was aborted.
    pub async fn wait(self) -> Option<T> {
        self.handle.await.ok()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Lets the work run to completion unobserved.
    pub fn detach(self) {}
}
