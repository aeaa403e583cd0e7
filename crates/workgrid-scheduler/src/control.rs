//! Operator controls: status snapshots and per-workload stop/fail/restart.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use workgrid_cluster::{ClusterManager, ReportInstruction, WorkloadActionsInstruction};
use workgrid_core::{ActionType, ClusterMember, SchedulerAction, WorkloadReport};

use crate::error::{SchedulerError, SchedulerResult};
use crate::repository::WorkloadRepository;

#[derive(Clone)]
pub struct WorkloadControl {
    cluster: ClusterManager,
    repository: Arc<dyn WorkloadRepository>,
}

impl WorkloadControl {
    pub fn new(cluster: ClusterManager, repository: Arc<dyn WorkloadRepository>) -> Self {
        Self {
            cluster,
            repository,
        }
    }

    /// Every responding member's current report.
    pub async fn status(&self) -> SchedulerResult<HashMap<ClusterMember, WorkloadReport>> {
        Ok(self.cluster.submit_to_all(&ReportInstruction).await?)
    }

    pub async fn stop(&self, urn: &str) -> SchedulerResult<Vec<ClusterMember>> {
        self.apply(urn, ActionType::Stop).await
    }

    pub async fn fail(&self, urn: &str) -> SchedulerResult<Vec<ClusterMember>> {
        self.apply(urn, ActionType::Fail).await
    }

    pub async fn restart(&self, urn: &str) -> SchedulerResult<Vec<ClusterMember>> {
        self.apply(urn, ActionType::Restart).await
    }

    /// Send `action` to the members servicing `urn`. Returns the members
    /// that acknowledged, in urn order.
    async fn apply(&self, urn: &str, action: ActionType) -> SchedulerResult<Vec<ClusterMember>> {
        let workload = self
            .repository
            .lookup(urn)
            .await
            .ok_or_else(|| SchedulerError::UnknownWorkload(urn.to_string()))?;

        let batch: HashMap<_, _> = self
            .status()
            .await?
            .into_iter()
            .filter(|(_, report)| report.contains(&workload))
            .map(|(member, _)| {
                let instruction = WorkloadActionsInstruction::single(SchedulerAction::new(
                    workload.clone(),
                    action,
                ));
                (member, instruction)
            })
            .collect();

        let mut acked: Vec<_> = self.cluster.submit(batch).await?.into_keys().collect();
        acked.sort();
        info!(%workload, %action, members = acked.len(), "operator action applied");
        Ok(acked)
    }
}
