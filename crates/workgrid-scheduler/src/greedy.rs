//! Greedy rebalancing.
//!
//! Steps, all against a [`SchedulerStrategyContext`] copy of the reports:
//!
//! 1. Remove orphans (reported but no longer in the inventory).
//! 2. Resolve duplicates: keep the first holder, remove from the rest.
//! 3. Place unassigned workloads on the least busy member.
//! 4. Level load while the busiest member has at least two more entries
//!    than the idlest, preferring to move terminated entries.
//! 5. Restart every terminated entry in place.
//! 6. Compile removals and additions into two phases.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use workgrid_cluster::WorkloadActionsInstruction;
use workgrid_core::{ClusterMember, Workload, WorkloadReport};

use crate::strategy::{SchedulerStrategy, SchedulerStrategyContext};

#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyStrategy;

impl GreedyStrategy {
    pub fn new() -> Self {
        Self
    }

    fn remove_orphans(ctx: &mut SchedulerStrategyContext, inventory: &HashSet<Workload>) {
        let orphans: Vec<(ClusterMember, Workload)> = ctx
            .mapping()
            .iter()
            .flat_map(|(member, report)| {
                report
                    .workloads()
                    .filter(|w| !inventory.contains(*w))
                    .map(move |w| (member.clone(), w.clone()))
            })
            .collect();

        for (member, workload) in orphans {
            debug!(member = %member, %workload, "removing orphaned workload");
            ctx.remove_workload(&member, &workload);
        }
    }

    fn resolve_duplicates(ctx: &mut SchedulerStrategyContext, inventory: &HashSet<Workload>) {
        for workload in sorted(inventory) {
            let holders = ctx.holders(workload);
            for member in holders.iter().skip(1) {
                debug!(member = %member, %workload, "removing duplicate assignment");
                ctx.remove_workload(member, workload);
            }
        }
    }

    fn place_new(ctx: &mut SchedulerStrategyContext, inventory: &HashSet<Workload>) {
        for workload in sorted(inventory) {
            if ctx.is_assigned(workload) {
                continue;
            }
            let Some(member) = ctx.least_busy().cloned() else {
                return;
            };
            debug!(member = %member, %workload, "placing new workload");
            ctx.add_workload(&member, workload.clone());
        }
    }

    fn level(ctx: &mut SchedulerStrategyContext) {
        loop {
            let (Some(busy), Some(idle)) = (ctx.most_busy().cloned(), ctx.least_busy().cloned())
            else {
                return;
            };
            if ctx.load(&busy) < ctx.load(&idle) + 2 {
                return;
            }

            let candidate = ctx.mapping()[&busy]
                .entries
                .iter()
                .min_by(|a, b| a.state.expendability_cmp(b.state))
                .map(|e| e.workload.clone());
            let Some(workload) = candidate else {
                return;
            };

            debug!(from = %busy, to = %idle, %workload, "moving workload to level load");
            ctx.remove_workload(&busy, &workload);
            ctx.add_workload(&idle, workload);
        }
    }

    fn restart_terminated(ctx: &mut SchedulerStrategyContext) {
        let mut restarts = Vec::new();
        for (member, report) in ctx.mapping() {
            let mut seen = HashSet::new();
            for entry in &report.entries {
                if entry.state.is_terminated() && seen.insert(&entry.workload) {
                    restarts.push((member.clone(), entry.workload.clone()));
                }
            }
        }

        for (member, workload) in restarts {
            debug!(member = %member, %workload, "restarting terminated workload");
            ctx.restart_workload(&member, &workload);
        }
    }
}

impl SchedulerStrategy for GreedyStrategy {
    fn schedule(
        &self,
        inventory: &HashSet<Workload>,
        reports: &HashMap<ClusterMember, WorkloadReport>,
    ) -> Vec<HashMap<ClusterMember, WorkloadActionsInstruction>> {
        let mut ctx = SchedulerStrategyContext::new(reports);
        if ctx.is_empty() {
            return Vec::new();
        }

        Self::remove_orphans(&mut ctx, inventory);
        Self::resolve_duplicates(&mut ctx, inventory);
        Self::place_new(&mut ctx, inventory);
        Self::level(&mut ctx);
        Self::restart_terminated(&mut ctx);

        ctx.into_instructions()
    }
}

fn sorted(inventory: &HashSet<Workload>) -> Vec<&Workload> {
    let mut workloads: Vec<_> = inventory.iter().collect();
    workloads.sort();
    workloads
}
