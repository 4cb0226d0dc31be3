//! Scheduled execution of the batch runner.
//!
//! One background task: run, sleep, repeat. An interval of 0 runs once and
//! stops (cron-style external triggering). Shutdown wakes the sleeper and
//! sets the runner's cancellation flag so a run in flight stops after the
//! current connection instead of being aborted mid-conversation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use ebridge_core::config::BatchConfig;

use crate::runner::BatchRunner;

pub struct BatchScheduler {
    shutdown_tx: mpsc::Sender<()>,
    cancel: Arc<AtomicBool>,
}

impl BatchScheduler {
    /// Spawn the scheduler loop. The first run starts immediately.
    pub fn start(runner: Arc<BatchRunner>, config: BatchConfig) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let cancel = runner.cancel_flag();
        let flag = cancel.clone();

        tokio::spawn(async move {
            loop {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = runner.run(None, None, None).await {
                    tracing::error!("scheduled batch run failed: {}", err);
                }
                if config.interval_seconds == 0 {
                    tracing::info!("one-shot batch run complete, scheduler stopping");
                    break;
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("batch scheduler shutting down");
                        break;
                    }
                    _ = sleep(Duration::from_secs(config.interval_seconds)) => {}
                }
            }
        });

        Self {
            shutdown_tx,
            cancel,
        }
    }

    /// Signal the loop to stop. Does not wait for a run in flight; the
    /// runner stops after the connection it is currently sweeping.
    pub fn shutdown(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.try_send(());
    }
}
