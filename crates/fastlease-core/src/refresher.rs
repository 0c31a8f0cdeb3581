//! Lease heartbeat
//!
//! While a lock is held the lease is rewritten every `refresh_time` so it
//! never goes stale. The tick callback decides whether to keep going; the
//! owning handle makes it a no-op once released.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawn a heartbeat task that calls `tick` every `period`, first after one
/// full period, until `tick` breaks or the task is aborted.
pub(crate) fn spawn_heartbeat<F>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    let period = period.max(MIN_PERIOD);
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tick().is_break() {
                break;
            }
        }
    })
}
