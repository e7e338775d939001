use dugong_client_sdk::{remaining_secs, ExpiryLatch};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

const TICK: Duration = Duration::from_secs(1);

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Background countdown for the active upload session.
///
/// Ticks once per second, publishes the remaining seconds, and sends a single
/// expiry signal the first time the countdown reaches zero. Dropping the
/// handle stops the task.
pub struct SessionTimer {
    remaining: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl SessionTimer {
    pub fn start(started_at_ms: i64, duration_secs: u64) -> (Self, mpsc::Receiver<()>) {
        Self::start_with_clock(started_at_ms, duration_secs, now_ms)
    }

    pub fn start_with_clock<C>(
        started_at_ms: i64,
        duration_secs: u64,
        clock: C,
    ) -> (Self, mpsc::Receiver<()>)
    where
        C: Fn() -> i64 + Send + 'static,
    {
        let initial = remaining_secs(started_at_ms, clock(), duration_secs);
        let (remaining_tx, remaining_rx) = watch::channel(initial);
        let (expired_tx, expired_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut latch = ExpiryLatch::new();
            loop {
                ticker.tick().await;
                let remaining = remaining_secs(started_at_ms, clock(), duration_secs);
                remaining_tx.send_replace(remaining);
                if latch.observe(remaining) {
                    info!("upload session expired");
                    let _ = expired_tx.try_send(());
                }
            }
        });

        (
            Self {
                remaining: remaining_rx,
                task,
            },
            expired_rx,
        )
    }

    pub fn remaining(&self) -> u64 {
        *self.remaining.borrow()
    }

    /// Waits for the next tick. Returns `false` once the task is gone.
    pub async fn tick(&mut self) -> bool {
        self.remaining.changed().await.is_ok()
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
