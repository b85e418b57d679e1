//! One-shot cancellable timers on tokio.
//!
//! A timer is a spawned task racing a sleep against a cancel notification.
//! Cancelling a timer that already fired (or was already cancelled) is a
//! no-op, so the fire/cancel race is always safe for callers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;

/// Shortest schedulable challenge duration.
pub const MIN_DURATION_SECS: u64 = 30;
/// Longest schedulable challenge duration (24 hours).
pub const MAX_DURATION_SECS: u64 = 86_400;

/// Clamp a requested duration into the supported band.
///
/// Out-of-range requests are clamped, never rejected.
pub fn clamp_duration_secs(secs: u64) -> u64 {
    secs.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
}

/// Handle to a pending one-shot timer.
pub struct TimerHandle {
    cancel: Arc<Notify>,
}

impl TimerHandle {
    /// Prevent the timer from firing if it has not fired yet.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }
}

/// Schedule `fut` to run once after `delay`.
///
/// A zero delay fires on the next scheduler tick, which is how overdue
/// rehydrated actions fire immediately at startup.
pub fn schedule_once<F>(delay: Duration, fut: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel = Arc::new(Notify::new());
    let cancel_task = cancel.clone();

    tokio::spawn(async move {
        tokio::select! {
            biased;

            _ = cancel_task.notified() => {
                // Cancelled before firing
            }
            _ = sleep(delay) => {
                fut.await;
            }
        }
    });

    TimerHandle { cancel }
}
