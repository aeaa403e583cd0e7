//! The orchestration loop.
//!
//! Every member runs [`DistributedScheduler::run`]. A cycle only proceeds
//! on the member that wins the cluster lock, and only once the
//! cluster-shared schedule time has passed (unless forced, as on startup).
//!
//! Phases go out in order. A workload whose removal was not acknowledged
//! is held back from every later phase, so it is never added elsewhere
//! while its old context may still be running.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use workgrid_cluster::{ClusterManager, ReportInstruction, ShutdownInstruction, WorkloadActionsInstruction};
use workgrid_core::{ClusterMember, SchedulerConfig, Workload};

use crate::error::{SchedulerError, SchedulerResult};
use crate::lock::{DistributedLock, LockGuard};
use crate::repository::WorkloadRepository;
use crate::strategy::SchedulerStrategy;

/// What one call to [`DistributedScheduler::schedule`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another member holds the lock.
    LockHeld,
    /// The last successful cycle was too recent.
    NotDue,
    /// Instructions were submitted.
    Completed { removals: usize, additions: usize },
}

pub struct DistributedScheduler {
    /// Report collection and instruction delivery.
    cluster: ClusterManager,
    /// The desired inventory.
    repository: Arc<dyn WorkloadRepository>,
    /// Turns inventory plus reports into ordered instruction phases.
    strategy: Arc<dyn SchedulerStrategy>,
    /// Shared by every member's scheduler; held for the whole cycle.
    lock: Arc<dyn DistributedLock>,
    /// Interval, poll timings and lock lease.
    config: SchedulerConfig,
}

impl DistributedScheduler {
    pub fn new(
        cluster: ClusterManager,
        repository: Arc<dyn WorkloadRepository>,
        strategy: Arc<dyn SchedulerStrategy>,
        lock: Arc<dyn DistributedLock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            cluster,
            repository,
            strategy,
            lock,
            config,
        }
    }

    /// Run one rebalance cycle if this member wins the lock.
    pub async fn schedule(&self, force: bool) -> SchedulerResult<CycleOutcome> {
        let lease = self
            .lock
            .supports_leases()
            .then_some(self.config.lock_lease);
        let Some(token) = self.lock.try_lock(Duration::ZERO, lease).await? else {
            debug!(lock = %self.lock.name(), "lock held elsewhere, skipping cycle");
            return Ok(CycleOutcome::LockHeld);
        };

        let guard = LockGuard::new(Arc::clone(&self.lock), token);
        let outcome = self.rebalance(force).await;
        guard.release().await;
        outcome
    }

    async fn rebalance(&self, force: bool) -> SchedulerResult<CycleOutcome> {
        if !force && !self.is_time_to_schedule().await? {
            debug!("rebalance not due yet");
            return Ok(CycleOutcome::NotDue);
        }

        let inventory = self.repository.workloads().await;
        let reports = self.cluster.submit_to_all(&ReportInstruction).await?;
        if reports.is_empty() {
            return Err(SchedulerError::NoReports);
        }

        let phases = self.strategy.schedule(&inventory, &reports);

        let mut removals = 0;
        let mut additions = 0;
        let mut unconfirmed: HashSet<Workload> = HashSet::new();
        for phase in phases {
            let phase = hold_back(phase, &unconfirmed);
            if phase.is_empty() {
                continue;
            }

            let mut removing: Vec<(ClusterMember, Vec<Workload>)> = Vec::new();
            for (member, instruction) in &phase {
                let mut targets = Vec::new();
                for action in &instruction.actions {
                    if action.action.is_removal() {
                        removals += 1;
                        targets.push(action.workload.clone());
                    } else {
                        additions += 1;
                    }
                }
                if !targets.is_empty() {
                    removing.push((member.clone(), targets));
                }
            }

            let targets = phase.len();
            let responses = self.cluster.submit(phase).await?;
            debug!(targets, responded = responses.len(), "phase submitted");

            for (member, workloads) in removing {
                if !responses.contains_key(&member) {
                    warn!(
                        member = %member,
                        workloads = workloads.len(),
                        "removal not confirmed, holding back re-placement until next cycle"
                    );
                    unconfirmed.extend(workloads);
                }
            }
        }

        let next = epoch_millis().saturating_add(self.config.rebalance_interval.as_millis() as u64);
        self.cluster.set_schedule_time(next).await?;

        info!(
            inventory = inventory.len(),
            members = reports.len(),
            removals,
            additions,
            "rebalance cycle completed"
        );
        Ok(CycleOutcome::Completed {
            removals,
            additions,
        })
    }

    async fn is_time_to_schedule(&self) -> SchedulerResult<bool> {
        Ok(match self.cluster.schedule_time().await? {
            Some(due) => epoch_millis() >= due,
            None => true,
        })
    }

    /// Force a cycle now, then poll until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.rebalance_interval.as_secs(),
            poll_delay_secs = self.config.rebalance_poll_delay.as_secs(),
            poll_interval_secs = self.config.rebalance_poll_interval.as_secs(),
            "scheduler started"
        );

        self.tick(true).await;

        let mut wait = self.config.rebalance_poll_delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.tick(false).await;
                }
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
            wait = self.config.rebalance_poll_interval;
        }
    }

    async fn tick(&self, force: bool) {
        match self.schedule(force).await {
            Ok(outcome) => debug!(?outcome, force, "scheduler tick"),
            Err(e) => error!(error = %e, "rebalance cycle failed"),
        }
    }

    /// Ask every member to stop all of its workloads. Returns how many
    /// members acknowledged.
    pub async fn shutdown_cluster(&self) -> SchedulerResult<usize> {
        let acks = self.cluster.submit_to_all(&ShutdownInstruction).await?;
        info!(members = acks.len(), "cluster shutdown broadcast");
        Ok(acks.len())
    }
}

/// Drop actions on workloads in `unconfirmed`, and members left with none.
fn hold_back(
    phase: HashMap<ClusterMember, WorkloadActionsInstruction>,
    unconfirmed: &HashSet<Workload>,
) -> HashMap<ClusterMember, WorkloadActionsInstruction> {
    if unconfirmed.is_empty() {
        return phase;
    }
    phase
        .into_iter()
        .filter_map(|(member, mut instruction)| {
            instruction
                .actions
                .retain(|action| !unconfirmed.contains(&action.workload));
            (!instruction.is_empty()).then_some((member, instruction))
        })
        .collect()
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
