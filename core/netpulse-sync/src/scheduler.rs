//! Periodic collect and evaluate-and-flush loops.
//!
//! Both loops run as independent tokio tasks. A tick that has started always
//! runs to completion; shutdown is only observed between ticks (or inside a
//! connection retry wait, which aborts cleanly).

use crate::collector::Collector;
use crate::error::SyncError;
use crate::relay::Relay;
use crate::retry::wait_for_shutdown;
use netpulse_types::MetricKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const DEFAULT_TICK: Duration = Duration::from_secs(300);

pub struct RelayScheduler {
    relay: Arc<Relay>,
    collector: Arc<dyn Collector>,
    collect_interval: Duration,
    evaluate_interval: Duration,
}

impl RelayScheduler {
    pub fn new(relay: Arc<Relay>, collector: Arc<dyn Collector>) -> Self {
        Self {
            relay,
            collector,
            collect_interval: DEFAULT_TICK,
            evaluate_interval: DEFAULT_TICK,
        }
    }

    #[must_use]
    pub fn with_intervals(mut self, collect: Duration, evaluate: Duration) -> Self {
        self.collect_interval = collect;
        self.evaluate_interval = evaluate;
        self
    }

    /// Spawns both loops. The first tick of each runs immediately.
    pub fn start(self) -> SchedulerHandle {
        info!(
            "Starting relay scheduler (collect every {:?}, evaluate every {:?}, sink {})",
            self.collect_interval,
            self.evaluate_interval,
            self.relay.sink().provider_name()
        );

        let collect = tokio::spawn(run_collect_loop(
            Arc::clone(&self.relay),
            self.collector,
            self.collect_interval,
        ));
        let evaluate = tokio::spawn(run_evaluate_loop(
            Arc::clone(&self.relay),
            self.evaluate_interval,
        ));

        SchedulerHandle {
            relay: self.relay,
            tasks: vec![collect, evaluate],
        }
    }
}

/// Handle to running scheduler loops.
pub struct SchedulerHandle {
    relay: Arc<Relay>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops both loops and waits for in-flight ticks to finish.
    pub async fn shutdown(self) {
        info!("Shutting down relay scheduler");
        self.relay.request_shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Scheduler task ended abnormally: {e}");
            }
        }
        info!("Relay scheduler stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}

async fn run_collect_loop(relay: Arc<Relay>, collector: Arc<dyn Collector>, period: Duration) {
    let mut shutdown = relay.subscribe_shutdown();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        // Kinds are collected independently; one failing does not skip the other.
        for kind in MetricKind::ALL {
            match relay.collect(collector.as_ref(), kind).await {
                Ok(Some(id)) => debug!("Collected {kind} record {id}"),
                Ok(None) => {}
                Err(e) => warn!("Skipping {kind} collection this tick: {e}"),
            }
        }
    }

    debug!("Collect loop stopped");
}

async fn run_evaluate_loop(relay: Arc<Relay>, period: Duration) {
    let mut shutdown = relay.subscribe_shutdown();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        for kind in MetricKind::ALL {
            match relay.evaluate(kind).await {
                Ok(Some(report)) => debug!("{kind} flush finished: {report:?}"),
                Ok(None) => {}
                Err(SyncError::Cancelled) => {
                    info!("{kind} flush cancelled by shutdown");
                    break;
                }
                Err(e @ SyncError::Schema(_)) => {
                    error!("{kind} flush skipped, remote schema mismatch: {e}");
                }
                Err(e) => warn!("{kind} flush failed, will retry next tick: {e}"),
            }
        }
    }

    debug!("Evaluate loop stopped");
}
