//! Periodic Trigger
//!
//! Two tasks cooperate:
//!
//! - the **timer** ticks every period and offers a request into a channel of capacity
//!   one with `try_send`. It never awaits anything but the next tick, so it cannot be
//!   held up by storage I/O.
//! - the **worker** owns the [`Pipeline`] and runs each request to completion.
//!
//! At most one request is pending while a cycle runs. A tick that finds the slot full
//! is an overrun: it is counted, logged and dropped. Since only the worker can run the
//! pipeline, two cycles never overlap.
//!
//! ```text
//! timer ──try_send──> [ 1 slot ] ──recv──> worker ──run_cycle──> report
//!          │ full
//!          └──> overrun (dropped)
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::pipeline::{CycleReport, Pipeline};

/// Request handed from the timer to the worker
#[derive(Debug, Clone, Copy)]
struct CycleRequest {
    tick: u64,
}

/// Counters shared between the timer, the worker and the handle
#[derive(Debug, Default)]
pub struct TriggerStats {
    ticks: AtomicU64,
    overruns: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Point-in-time copy of [`TriggerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerSnapshot {
    /// Timer ticks observed
    pub ticks: u64,
    /// Ticks dropped because a request was already pending
    pub overruns: u64,
    /// Cycles the worker began
    pub started: u64,
    /// Cycles the worker finished
    pub completed: u64,
    /// Finished cycles that carried an error
    pub failed: u64,
    /// Highest number of cycles ever running at once
    pub max_in_flight: usize,
}

impl TriggerStats {
    /// Copy all counters
    pub fn snapshot(&self) -> TriggerSnapshot {
        TriggerSnapshot {
            ticks: self.ticks.load(Ordering::SeqCst),
            overruns: self.overruns.load(Ordering::SeqCst),
            started: self.started.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Fixed-period trigger for a pipeline
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTrigger {
    period: Duration,
}

impl PeriodicTrigger {
    /// Trigger with the given period. The first tick fires immediately.
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Configured period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm the timer and hand `pipeline` to the worker. Runs until `shutdown`.
    pub fn start<const N: usize>(self, pipeline: Pipeline<N>) -> TriggerHandle {
        let (tx, rx) = mpsc::channel::<CycleRequest>(1);
        let (latest_tx, latest_rx) = watch::channel(None);
        let stats = Arc::new(TriggerStats::default());

        let timer = tokio::spawn(run_timer(self.period, tx, stats.clone()));
        let worker = tokio::spawn(run_worker(pipeline, rx, latest_tx, stats.clone()));

        info!(period_ms = self.period.as_millis() as u64, "periodic trigger armed");
        TriggerHandle {
            period: self.period,
            stats,
            latest: latest_rx,
            timer,
            worker,
        }
    }
}

async fn run_timer(period: Duration, tx: mpsc::Sender<CycleRequest>, stats: Arc<TriggerStats>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let tick = stats.ticks.fetch_add(1, Ordering::SeqCst) + 1;

        match tx.try_send(CycleRequest { tick }) {
            Ok(()) => debug!(tick, "cycle requested"),
            Err(TrySendError::Full(_)) => {
                let overruns = stats.overruns.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(tick, overruns, "cycle still pending, dropping trigger");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(tick, "worker gone, timer stopping");
                break;
            }
        }
    }
}

async fn run_worker<const N: usize>(
    mut pipeline: Pipeline<N>,
    mut rx: mpsc::Receiver<CycleRequest>,
    latest: watch::Sender<Option<Arc<CycleReport>>>,
    stats: Arc<TriggerStats>,
) {
    while let Some(request) = rx.recv().await {
        let in_flight = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        stats.started.fetch_add(1, Ordering::SeqCst);
        debug!(tick = request.tick, "cycle started");

        let report = pipeline.run_cycle().await;

        if report.error.is_some() {
            stats.failed.fetch_add(1, Ordering::SeqCst);
        }
        stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        stats.completed.fetch_add(1, Ordering::SeqCst);
        latest.send_replace(Some(Arc::new(report)));
    }
    debug!("trigger worker stopped");
}

/// Running trigger
pub struct TriggerHandle {
    period: Duration,
    stats: Arc<TriggerStats>,
    latest: watch::Receiver<Option<Arc<CycleReport>>>,
    timer: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl TriggerHandle {
    /// Trigger period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Current counters
    pub fn stats(&self) -> TriggerSnapshot {
        self.stats.snapshot()
    }

    /// Most recent finished cycle
    pub fn latest_report(&self) -> Option<Arc<CycleReport>> {
        self.latest.borrow().clone()
    }

    /// Receiver that changes each time a cycle finishes
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CycleReport>>> {
        self.latest.clone()
    }

    /// Stop the timer, let an in-flight or pending cycle finish, and return the final
    /// counters.
    pub async fn shutdown(self) -> TriggerSnapshot {
        self.timer.abort();
        // Aborting drops the sender; the worker drains and exits.
        let _ = self.timer.await;
        let _ = self.worker.await;

        let snapshot = self.stats.snapshot();
        info!(
            ticks = snapshot.ticks,
            completed = snapshot.completed,
            overruns = snapshot.overruns,
            "periodic trigger stopped"
        );
        snapshot
    }
}
