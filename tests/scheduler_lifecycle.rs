//! Scheduler behavior over real timers: cycle cadence, shutdown between
//! cycles, and survival of failing cycles.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tradepilot::application::scheduler::{CycleRunner, Scheduler};

struct CountingRunner {
    completed: AtomicUsize,
}

#[async_trait]
impl CycleRunner for CountingRunner {
    async fn run(&self, _symbols: &[String]) -> Result<()> {
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_shutdown_after_three_cycles() {
    let scheduler = Scheduler::new();
    let runner = Arc::new(CountingRunner {
        completed: AtomicUsize::new(0),
    });

    // Cycles land at ~0ms, ~100ms, ~200ms; the signal at 250ms stops the
    // timer before the fourth.
    scheduler
        .start(
            runner.clone(),
            vec!["BTC/USDT".to_string()],
            Duration::from_millis(100),
            Duration::ZERO,
            tokio::time::sleep(Duration::from_millis(250)),
        )
        .await;

    let completed = runner.completed.load(Ordering::SeqCst);
    assert_eq!(completed, 3, "expected 3 completed cycles, got {completed}");
    assert_eq!(scheduler.run_count(), 3);

    // The timer is gone: waiting another interval adds nothing.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(runner.completed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    struct SlowRunner;

    #[async_trait]
    impl CycleRunner for SlowRunner {
        async fn run(&self, _symbols: &[String]) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }

    let scheduler = Arc::new(Scheduler::new());
    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .start(
                    Arc::new(SlowRunner),
                    vec![],
                    Duration::from_millis(500),
                    Duration::ZERO,
                    tokio::time::sleep(Duration::from_millis(200)),
                )
                .await;
        })
    };

    // Give the first start a moment to claim the scheduler, then try again.
    tokio::time::sleep(Duration::from_millis(20)).await;
    scheduler
        .start(
            Arc::new(SlowRunner),
            vec![],
            Duration::from_millis(10),
            Duration::ZERO,
            tokio::time::sleep(Duration::ZERO),
        )
        .await;

    first.await.unwrap();
    // Only the first scheduler loop ran cycles.
    assert_eq!(scheduler.run_count(), 1);
}
