//! Tokio-backed [`Scheduler`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

use crate::ports::{BoxFuture, Scheduler, TimerHandle};

/// Shortest period a repeating task may have.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Runs timers as tasks on a tokio runtime.
///
/// Repeating tasks first run one period after registration. A tick that
/// falls behind is skipped rather than replayed in a burst.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime of the calling context, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn start_repeating(
        &self,
        name: &'static str,
        period: Duration,
        task: Arc<dyn Fn() + Send + Sync>,
    ) -> TimerHandle {
        let period = period.max(MIN_PERIOD);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let join = self.handle.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                task();
            }
        });
        trace!(timer = name, ?period, "[kad] repeating timer started");

        TimerHandle::new(name, move || {
            cancelled.store(true, Ordering::Release);
            join.abort();
        })
    }

    fn call_after(
        &self,
        name: &'static str,
        delay: Duration,
        task: Box<dyn FnOnce() + Send>,
    ) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let join = self.handle.spawn(async move {
            time::sleep(delay).await;
            if !flag.load(Ordering::Acquire) {
                task();
            }
        });

        TimerHandle::new(name, move || {
            cancelled.store(true, Ordering::Release);
            join.abort();
        })
    }

    fn spawn(&self, name: &'static str, future: BoxFuture) -> TimerHandle {
        let join = self.handle.spawn(future);
        TimerHandle::new(name, move || join.abort())
    }
}
