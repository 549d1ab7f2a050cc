//! Periodic driver for the reconciliation engine
//!
//! - Fixed-period ticks, late ticks are skipped rather than bunched
//! - At most one tick in flight (ticks run inline in the loop task)
//! - Out-of-band ticks on request
//! - Shutdown abandons an in-flight tick

use crate::engine::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle to a running sync loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    trigger: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Ask for a tick now. Coalesces with a pending request.
    pub fn trigger(&self) {
        if self.trigger.try_send(()).is_err() {
            debug!("Sync already requested");
        }
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "Sync loop ended abnormally");
        }
    }
}

/// Spawn the periodic loop; the first tick runs immediately
pub fn spawn_sync_loop(engine: Arc<SyncEngine>, period: Duration) -> SyncHandle {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let (trigger, trigger_rx) = mpsc::channel(1);
    let task = tokio::spawn(run_loop(engine, period, shutdown_rx, trigger_rx));

    SyncHandle {
        shutdown,
        trigger,
        task,
    }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut trigger: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(period_ms = period.as_millis() as u64, "Channel sync loop started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
            Some(()) = trigger.recv() => {
                debug!("Out-of-band sync requested");
            }
        }

        tokio::select! {
            result = engine.sync_channels() => {
                if let Err(err) = result {
                    // Already logged by the engine; next tick retries.
                    debug!(error = %err, "Sync tick failed");
                }
            }
            _ = shutdown.changed() => {
                info!("Shutdown during sync tick, tick abandoned");
                break;
            }
        }
    }

    info!("Channel sync loop stopped");
}
