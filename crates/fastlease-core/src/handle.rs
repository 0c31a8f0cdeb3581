//! Lock handle: acquire / release
//!
//! A `LockHandle` owns everything one contender needs for one lock name: its
//! id, the retry, verification and heartbeat timers, and the parameters of the
//! current acquisition. Every timer callback runs its store work while holding
//! the handle's state mutex and first checks the acquisition epoch, so
//! `release` (which bumps the epoch, aborts the timers and clears the lease
//! under the same mutex) is atomic with respect to any in-flight callback.

use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use fastlease_common::{LockError, SharedStore, StoreError};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::{AcquireParams, LockConfig};
use crate::identity::{self, ContenderId};
use crate::keys::LockKeys;
use crate::lease::{Lease, LeaseSnapshot};
use crate::metrics;
use crate::protocol::{self, Round};
use crate::refresher;

type Waiter = oneshot::Sender<Result<(), LockError>>;

#[derive(Default)]
struct HandleState {
    /// Bumped by every acquire and release; callbacks from older epochs are no-ops
    epoch: u64,
    params: Option<AcquireParams>,
    held: bool,
    waiter: Option<Waiter>,
    retry_timer: Option<JoinHandle<()>>,
    verify_timer: Option<JoinHandle<()>>,
    heartbeat_timer: Option<JoinHandle<()>>,
}

impl HandleState {
    fn cancel_timers(&mut self) {
        for timer in [
            self.retry_timer.take(),
            self.verify_timer.take(),
            self.heartbeat_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.abort();
        }
    }
}

struct Shared {
    keys: LockKeys,
    id: ContenderId,
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    config: LockConfig,
    state: Mutex<HandleState>,
}

/// Builder for [`LockHandle`]
pub struct LockHandleBuilder {
    name: String,
    config: LockConfig,
    clock: Arc<dyn Clock>,
}

impl LockHandleBuilder {
    pub fn config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self, store: impl SharedStore + 'static) -> LockHandle {
        let id = ContenderId::generate(self.clock.as_ref());
        LockHandle {
            shared: Arc::new(Shared {
                keys: LockKeys::new(self.name),
                id,
                store: Arc::new(store),
                clock: self.clock,
                config: self.config,
                state: Mutex::new(HandleState::default()),
            }),
        }
    }
}

/// One contender's handle on a named lock.
///
/// Dropping the handle releases the lock. That is best effort: a process that
/// is killed never runs it, and the lease then expires after
/// `max_lock_time_ms` without a refresh.
pub struct LockHandle {
    shared: Arc<Shared>,
}

impl LockHandle {
    /// Handle with default timing and the wall clock
    pub fn new(name: impl Into<String>, store: impl SharedStore + 'static) -> Self {
        Self::builder(name).build(store)
    }

    pub fn builder(name: impl Into<String>) -> LockHandleBuilder {
        LockHandleBuilder {
            name: name.into(),
            config: LockConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn name(&self) -> &str {
        self.shared.keys.name()
    }

    pub fn contender_id(&self) -> &ContenderId {
        &self.shared.id
    }

    pub fn keys(&self) -> &LockKeys {
        &self.shared.keys
    }

    pub fn config(&self) -> &LockConfig {
        &self.shared.config
    }

    /// Whether this handle currently believes it holds the lock
    pub fn is_held(&self) -> bool {
        self.shared.state.lock().held
    }

    /// Start acquiring the lock.
    ///
    /// The returned future resolves with `Ok(())` exactly once, when this
    /// contender becomes the holder. Contention is retried indefinitely. It
    /// resolves with an error only if the store fails or the attempt is
    /// cancelled by [`release`](Self::release) or a later `acquire`; a
    /// cancelled attempt never reports success.
    ///
    /// Must be called from within a tokio runtime.
    pub fn acquire(&self, params: AcquireParams) -> Acquisition {
        let (tx, rx) = oneshot::channel();
        let acquisition = Acquisition {
            name: self.name().to_string(),
            rx,
        };

        if !params.has_refresh_margin() {
            tracing::warn!(
                lock = %self.name(),
                max_lock_time_ms = params.max_lock_time_ms,
                refresh_time_ms = params.refresh_time_ms,
                "Refresh interval does not fit inside the lease lifetime; the lease may expire while held"
            );
        }

        let mut state = self.shared.state.lock();
        if state.held {
            let _ = tx.send(Ok(()));
            return acquisition;
        }

        // A newer acquire supersedes a pending one; its waiter sees Cancelled
        state.cancel_timers();
        state.epoch += 1;
        state.params = Some(params);
        state.waiter = Some(tx);

        let epoch = state.epoch;
        let delay = identity::jitter(self.shared.config.max_jitter());
        tracing::debug!(
            lock = %self.name(),
            id = %self.shared.id,
            jitter_ms = delay.as_millis() as u64,
            "Scheduling first acquisition round"
        );
        state.retry_timer = Some(schedule(&self.shared, delay, move |shared| {
            shared.run_round(epoch)
        }));

        acquisition
    }

    /// Acquire with a deadline.
    ///
    /// On timeout the pending attempt is cancelled as if by `release`; should
    /// the lock have been obtained at the last moment it is kept and `Ok` is
    /// returned.
    pub async fn acquire_timeout(
        &self,
        params: AcquireParams,
        timeout: Duration,
    ) -> Result<(), LockError> {
        let acquisition = self.acquire(params);
        match tokio::time::timeout(timeout, acquisition).await {
            Ok(result) => result,
            Err(_) => {
                if self.shared.abandon_pending() {
                    return Ok(());
                }
                tracing::debug!(
                    lock = %self.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Acquisition timed out"
                );
                Err(LockError::AcquireTimeout {
                    name: self.name().to_string(),
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Stop every timer and clear our lease.
    ///
    /// Synchronous and idempotent. A pending acquisition never succeeds after
    /// this returns. The announcement key is left as is.
    pub fn release(&self) {
        self.shared.release();
    }

    /// Release when `teardown` completes (for example `tokio::signal::ctrl_c()`).
    ///
    /// The task does not keep the handle alive.
    pub fn release_on<F>(&self, teardown: F) -> JoinHandle<()>
    where
        F: Future + Send + 'static,
    {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            teardown.await;
            if let Some(shared) = shared.upgrade() {
                tracing::info!(lock = %shared.keys.name(), "Teardown signalled, releasing lock");
                shared.release();
            }
        })
    }

    /// Current lease as stored
    pub fn lease(&self) -> Result<Option<Lease>, StoreError> {
        self.shared.keys.read_lease(self.shared.store.as_ref())
    }

    pub fn snapshot(&self, max_lock_time_ms: u64) -> Result<LeaseSnapshot, StoreError> {
        self.shared.keys.snapshot(
            self.shared.store.as_ref(),
            self.shared.clock.now_millis(),
            max_lock_time_ms,
        )
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("name", &self.shared.keys.name())
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .finish()
    }
}

fn schedule<F>(shared: &Arc<Shared>, delay: Duration, callback: F) -> JoinHandle<()>
where
    F: FnOnce(&Arc<Shared>) + Send + 'static,
{
    let shared = shared.clone();
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        callback(&shared);
    })
}

impl Shared {
    fn run_round(self: &Arc<Self>, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }
        state.retry_timer = None;
        self.round(&mut state, epoch);
    }

    fn run_verify(self: &Arc<Self>, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }
        state.verify_timer = None;

        match protocol::verify_claim(&self.keys, self.store.as_ref(), &self.id) {
            Ok(true) => self.become_holder(&mut state, epoch),
            Ok(false) => {
                tracing::debug!(lock = %self.keys.name(), id = %self.id, "Claim lost during verification, restarting");
                ::metrics::counter!(metrics::CLAIMS_LOST_TOTAL, "lock" => self.keys.name().to_string())
                    .increment(1);
                self.round(&mut state, epoch);
            }
            Err(e) => self.fail(&mut state, e),
        }
    }

    fn round(self: &Arc<Self>, state: &mut HandleState, epoch: u64) {
        let Some(params) = state.params else {
            return;
        };

        match protocol::attempt(
            &self.keys,
            self.store.as_ref(),
            self.clock.as_ref(),
            &self.id,
            params.max_lock_time_ms,
        ) {
            Ok(Round::Acquired) => self.become_holder(state, epoch),
            Ok(Round::Busy { holder }) => {
                tracing::trace!(lock = %self.keys.name(), %holder, "Lock busy, rescheduling");
                ::metrics::counter!(metrics::CONTENTION_RETRIES_TOTAL, "lock" => self.keys.name().to_string())
                    .increment(1);
                state.retry_timer = Some(schedule(self, self.config.retry_delay(), move |shared| {
                    shared.run_round(epoch)
                }));
            }
            Ok(Round::Contended { announced }) => {
                tracing::debug!(
                    lock = %self.keys.name(),
                    %announced,
                    verify_delay_ms = self.config.verify_delay_ms,
                    "Concurrent announcement seen, verifying claim after delay"
                );
                state.verify_timer = Some(schedule(self, self.config.verify_delay(), move |shared| {
                    shared.run_verify(epoch)
                }));
            }
            Err(e) => self.fail(state, e),
        }
    }

    fn become_holder(self: &Arc<Self>, state: &mut HandleState, epoch: u64) {
        let Some(params) = state.params else {
            return;
        };
        state.held = true;

        let weak = Arc::downgrade(self);
        state.heartbeat_timer = Some(refresher::spawn_heartbeat(
            params.refresh_time(),
            move || match weak.upgrade() {
                Some(shared) => shared.refresh(epoch),
                None => ControlFlow::Break(()),
            },
        ));

        tracing::info!(lock = %self.keys.name(), id = %self.id, "Lock acquired");
        ::metrics::counter!(metrics::ACQUISITIONS_TOTAL, "lock" => self.keys.name().to_string())
            .increment(1);
        ::metrics::gauge!(metrics::LOCKS_HELD).increment(1.0);

        if let Some(waiter) = state.waiter.take() {
            let _ = waiter.send(Ok(()));
        }
    }

    fn refresh(&self, epoch: u64) -> ControlFlow<()> {
        let state = self.state.lock();
        if state.epoch != epoch || !state.held {
            return ControlFlow::Break(());
        }
        if let Err(e) = self.keys.write_lease(
            self.store.as_ref(),
            &self.id,
            self.clock.now_millis(),
        ) {
            tracing::warn!(lock = %self.keys.name(), error = %e, "Failed to refresh lease");
            ::metrics::counter!(metrics::HEARTBEAT_FAILURES_TOTAL, "lock" => self.keys.name().to_string())
                .increment(1);
        }
        ControlFlow::Continue(())
    }

    fn fail(&self, state: &mut HandleState, error: StoreError) {
        tracing::warn!(lock = %self.keys.name(), error = %error, "Acquisition aborted by store failure");
        state.cancel_timers();
        state.epoch += 1;
        state.params = None;
        if let Some(waiter) = state.waiter.take() {
            let _ = waiter.send(Err(LockError::StoreUnavailable(error)));
        }
    }

    /// Drop a pending acquisition; returns true if the lock turned out to be held
    fn abandon_pending(&self) -> bool {
        let mut state = self.state.lock();
        if state.held {
            return true;
        }
        self.release_locked(&mut state);
        false
    }

    fn release(&self) {
        let mut state = self.state.lock();
        self.release_locked(&mut state);
    }

    fn release_locked(&self, state: &mut HandleState) {
        state.epoch += 1;
        state.cancel_timers();
        state.params = None;
        state.waiter = None;
        let was_held = std::mem::take(&mut state.held);

        // Only our own lease (held or provisionally claimed) is cleared. The
        // store has no compare-and-delete, so a claim written by another
        // contender between this read and the remove is deleted. That
        // contender restarts at its verify read, or rewrites Y at its next
        // heartbeat if it already counted itself the holder.
        match self.keys.read_lease(self.store.as_ref()) {
            Ok(Some(lease)) if lease.is_held_by(self.id.as_str()) => {
                if let Err(e) = self.keys.clear_lease(self.store.as_ref()) {
                    tracing::warn!(lock = %self.keys.name(), error = %e, "Failed to clear lease on release");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(lock = %self.keys.name(), error = %e, "Failed to read lease on release");
            }
        }

        if was_held {
            tracing::info!(lock = %self.keys.name(), id = %self.id, "Lock released");
            ::metrics::counter!(metrics::RELEASES_TOTAL, "lock" => self.keys.name().to_string())
                .increment(1);
            ::metrics::gauge!(metrics::LOCKS_HELD).decrement(1.0);
        }
    }
}

/// Completion signal of one [`LockHandle::acquire`] call
#[must_use = "an acquisition does nothing useful unless awaited"]
pub struct Acquisition {
    name: String,
    rx: oneshot::Receiver<Result<(), LockError>>,
}

impl Future for Acquisition {
    type Output = Result<(), LockError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(LockError::Cancelled(self.name.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
