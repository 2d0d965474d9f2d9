//! Reconcile background worker.
//!
//! Ticks every stored deployment on a periodic interval. Deployments are
//! ticked concurrently; a deployment that hits a fatal error is skipped
//! until the process restarts.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use keel_reconcile::{PlanExecutor, StatusStore, StoreError, TickOutcome};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Counters for one pass over all deployments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub deployments: usize,
    pub committed: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub halted: usize,
    pub actions_started: usize,
    pub actions_completed: usize,
    pub actions_failed: usize,
}

pub struct ReconcileWorker {
    executor: Arc<PlanExecutor>,
    store: Arc<dyn StatusStore>,
    interval: Duration,
    halted: Mutex<BTreeSet<String>>,
}

impl ReconcileWorker {
    pub fn new(executor: Arc<PlanExecutor>, store: Arc<dyn StatusStore>, interval: Duration) -> Self {
        Self {
            executor,
            store,
            interval,
            halted: Mutex::new(BTreeSet::new()),
        }
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting reconcile worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile_all().await {
                        error!(error = %e, "Reconcile pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconcile worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Ticks every deployment once.
    pub async fn reconcile_all(&self) -> Result<WorkerStats, StoreError> {
        let names = self.store.list().await?;
        let mut stats = WorkerStats::default();
        let mut ticks = JoinSet::new();

        for name in names {
            if self.is_halted(&name) {
                stats.halted += 1;
                continue;
            }
            stats.deployments += 1;
            let executor = self.executor.clone();
            ticks.spawn(async move {
                let result = executor.tick(&name).await;
                (name, result)
            });
        }

        while let Some(joined) = ticks.join_next().await {
            let (name, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "Tick task panicked");
                    stats.failed += 1;
                    continue;
                }
            };

            match result {
                Ok(report) => {
                    match report.outcome {
                        TickOutcome::Committed { .. } => stats.committed += 1,
                        TickOutcome::Conflict => stats.conflicts += 1,
                        TickOutcome::Unchanged => {}
                    }
                    stats.actions_started += report.stats.started;
                    stats.actions_completed += report.stats.completed;
                    stats.actions_failed += report.stats.aborted + report.stats.timed_out;
                }
                Err(e) if e.is_fatal() => {
                    error!(deployment = %name, error = %e, "Deployment halted until restart");
                    self.halted
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(name);
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!(deployment = %name, error = %e, "Tick failed, will retry");
                    stats.failed += 1;
                }
            }
        }

        if stats.actions_started > 0 || stats.actions_completed > 0 || stats.actions_failed > 0 {
            info!(
                deployments = stats.deployments,
                committed = stats.committed,
                conflicts = stats.conflicts,
                actions_started = stats.actions_started,
                actions_completed = stats.actions_completed,
                actions_failed = stats.actions_failed,
                "Reconcile pass complete"
            );
        }

        Ok(stats)
    }

    pub fn is_halted(&self, deployment: &str) -> bool {
        self.halted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(deployment)
    }
}
