//! Single-slot cancellable timer.
//!
//! A [`Timer`] holds at most one pending task. Scheduling while a task is
//! pending does nothing; the slot frees itself just before the task runs, so
//! the task may schedule its own successor. Timers run on tokio's clock, which
//! tests pause and advance instead of sleeping in wall-clock time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    pending: Option<AbortHandle>,
}

/// A named timer with a single pending slot.
#[derive(Debug)]
pub struct Timer {
    name: &'static str,
    slot: Arc<Mutex<Slot>>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, slot: Arc::new(Mutex::new(Slot::default())) }
    }

    /// Run `task` after `delay` unless a task is already pending.
    ///
    /// Returns whether the task was scheduled. Must be called from within a
    /// tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if slot.pending.is_some() {
            tracing::trace!(timer = self.name, "timer already pending");
            return false;
        }

        slot.generation += 1;
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        let name = self.name;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                slot.pending = None;
            }
            tracing::trace!(timer = name, "timer fired");
            task.await;
        });

        slot.pending = Some(handle.abort_handle());
        tracing::trace!(timer = self.name, delay_ms = delay.as_millis() as u64, "timer scheduled");
        true
    }

    /// Replace any pending task with `task`.
    pub fn reschedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.schedule(delay, task);
    }

    /// Cancel the pending task, if any. A task that already fired keeps running.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        match slot.pending.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let timer = Timer::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(timer.schedule(Duration::from_secs(5), counting_task(&fired)));
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_twice_yields_one_timer() {
        let timer = Timer::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(timer.schedule(Duration::from_secs(5), counting_task(&fired)));
        assert!(!timer.schedule(Duration::from_secs(1), counting_task(&fired)));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let timer = Timer::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        timer.schedule(Duration::from_secs(5), counting_task(&fired));
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending() {
        let timer = Timer::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        timer.schedule(Duration::from_secs(5), counting_task(&fired));
        timer.reschedule(Duration::from_secs(20), counting_task(&fired));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_can_schedule_successor() {
        let timer = Arc::new(Timer::new("test"));
        let fired = Arc::new(AtomicUsize::new(0));

        let successor = counting_task(&fired);
        let inner = Arc::clone(&timer);
        let first = counting_task(&fired);
        timer.schedule(Duration::from_secs(1), async move {
            first.await;
            assert!(inner.schedule(Duration::from_secs(1), successor));
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
