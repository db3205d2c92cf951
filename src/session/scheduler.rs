//! Periodic task scheduling behind an injectable trait.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Work performed by one tick.
pub type TickFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Body run on every tick. Returns the future for that tick's work.
pub type TickFn = Box<dyn Fn() -> TickFuture + Send + Sync>;

/// Capability to run a closure on a fixed interval.
pub trait Scheduler: Send + Sync + 'static {
    /// Schedules `tick` every `interval`, first firing one interval from
    /// now. Ticks are not chained to the completion of earlier ticks.
    fn schedule_periodic(&self, name: &'static str, interval: Duration, tick: TickFn) -> ScheduledTask;
}

/// Handle to a periodic schedule. Cancelled on [`cancel`](Self::cancel) or drop.
pub struct ScheduledTask {
    cancel_tx: broadcast::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn new(cancel_tx: broadcast::Sender<()>, join: JoinHandle<()>) -> Self {
        Self {
            cancel_tx,
            join: Some(join),
        }
    }

    /// Stops future ticks. A tick body already running is left to finish.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.cancel_tx.send(());
        if let Some(join) = self.join.take() {
            // The timer loop only waits on the ticker and the cancel channel
            join.abort();
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// [`Scheduler`] backed by `tokio::time::interval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_periodic(&self, name: &'static str, interval: Duration, tick: TickFn) -> ScheduledTask {
        let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
        // Anchored at scheduling time, not when the task first runs
        let start = tokio::time::Instant::now() + interval;
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => {
                        tracing::debug!(task = name, "Periodic task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        tracing::trace!(task = name, "Periodic tick");
                        tokio::spawn(tick());
                    }
                }
            }
        });

        ScheduledTask::new(cancel_tx, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_tick(counter: &Arc<AtomicUsize>) -> TickFn {
        let counter = Arc::clone(counter);
        Box::new(move || -> TickFuture {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let counter = Arc::new(AtomicUsize::new(0));
        let _task = TokioScheduler.schedule_periodic("test", Duration::from_secs(60), counting_tick(&counter));

        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = TokioScheduler.schedule_periodic("test", Duration::from_secs(10), counting_tick(&counter));

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        task.cancel();
        tokio::time::advance(Duration::from_secs(100)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        drop(TokioScheduler.schedule_periodic("test", Duration::from_secs(10), counting_tick(&counter)));

        tokio::time::advance(Duration::from_secs(50)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
