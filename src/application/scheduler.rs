//! Periodic driver for trading cycles.
//!
//! One timer, one cycle at a time. Shutdown is only honored between
//! cycles: a cycle that already started always runs to completion, which
//! keeps the order protocol's terminal-state guarantee intact.

use crate::application::agent::TradingAgent;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::FutureExt;
use rand::Rng;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// One trading cycle over the configured symbols. Implemented by the agent;
/// tests substitute counting or failing runners.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run(&self, symbols: &[String]) -> Result<()>;
}

#[async_trait]
impl CycleRunner for TradingAgent {
    async fn run(&self, symbols: &[String]) -> Result<()> {
        TradingAgent::run(self, symbols).await
    }
}

#[derive(Default)]
pub struct Scheduler {
    is_running: AtomicBool,
    run_count: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::SeqCst)
    }

    /// Runs cycles until the `shutdown` future resolves. The first cycle
    /// fires immediately; each subsequent tick may be delayed by a random
    /// jitter below `jitter`.
    pub async fn start<S>(
        &self,
        runner: Arc<dyn CycleRunner>,
        symbols: Vec<String>,
        interval: Duration,
        jitter: Duration,
        shutdown: S,
    ) where
        S: Future<Output = ()> + Send,
    {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler: already running, ignoring start");
            return;
        }

        info!(
            "Scheduler: starting for {:?} every {:?} (jitter up to {:?})",
            symbols, interval, jitter
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !jitter.is_zero() {
                        let wait = rand::rng().random_range(0..jitter.as_millis() as u64);
                        tokio::time::sleep(Duration::from_millis(wait)).await;
                    }
                    self.run_cycle(runner.as_ref(), &symbols).await;
                }
                _ = &mut shutdown => {
                    info!("Scheduler: shutdown signal received");
                    break;
                }
            }
        }

        self.stop();
    }

    /// Executes exactly one cycle; used by the `--once` entry path.
    pub async fn run_once(&self, runner: Arc<dyn CycleRunner>, symbols: &[String]) {
        self.run_cycle(runner.as_ref(), symbols).await;
    }

    async fn run_cycle(&self, runner: &dyn CycleRunner, symbols: &[String]) {
        let cycle = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Scheduler: === cycle #{} at {} ===",
            cycle,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        match AssertUnwindSafe(runner.run(symbols)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Scheduler: cycle #{} failed: {:#}", cycle, e),
            Err(_) => error!("Scheduler: cycle #{} panicked", cycle),
        }
    }

    fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        info!(
            "Scheduler: stopped after {} cycle(s)",
            self.run_count.load(Ordering::SeqCst)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingRunner {
        started: AtomicUsize,
        completed: AtomicUsize,
        work: Duration,
    }

    impl CountingRunner {
        fn new(work: Duration) -> Self {
            Self {
                started: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                work,
            }
        }
    }

    #[async_trait]
    impl CycleRunner for CountingRunner {
        async fn run(&self, _symbols: &[String]) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl CycleRunner for FailingRunner {
        async fn run(&self, _symbols: &[String]) -> Result<()> {
            anyhow::bail!("simulated cycle failure")
        }
    }

    #[tokio::test]
    async fn test_cycle_errors_do_not_stop_the_timer() {
        let scheduler = Scheduler::new();
        scheduler
            .start(
                Arc::new(FailingRunner),
                vec!["BTC/USDT".to_string()],
                Duration::from_millis(20),
                Duration::ZERO,
                tokio::time::sleep(Duration::from_millis(70)),
            )
            .await;

        // First cycle is immediate, then ticks at 20ms; every one fails and
        // the count still advances.
        assert!(scheduler.run_count() >= 3);
    }

    #[tokio::test]
    async fn test_in_progress_cycle_completes_before_shutdown() {
        let scheduler = Scheduler::new();
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(50)));
        scheduler
            .start(
                runner.clone(),
                vec!["BTC/USDT".to_string()],
                Duration::from_millis(200),
                Duration::ZERO,
                tokio::time::sleep(Duration::from_millis(10)),
            )
            .await;

        assert_eq!(runner.started.load(Ordering::SeqCst), 1);
        assert_eq!(runner.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_count_strictly_increases() {
        let scheduler = Scheduler::new();
        let runner = Arc::new(CountingRunner::new(Duration::ZERO));
        scheduler
            .start(
                runner.clone(),
                vec![],
                Duration::from_millis(25),
                Duration::ZERO,
                tokio::time::sleep(Duration::from_millis(90)),
            )
            .await;

        let count = scheduler.run_count();
        assert!(count >= 3, "expected >=3 cycles, got {}", count);
        assert_eq!(runner.completed.load(Ordering::SeqCst) as u64, count);
    }
}
