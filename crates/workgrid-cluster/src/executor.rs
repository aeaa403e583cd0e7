//! Node-side instruction execution.

use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use workgrid_core::{ActionType, WorkloadReport};
use workgrid_lifecycle::{LifecycleTask, WorkloadContextManager};

use crate::error::{InstructionError, InstructionResult};
use crate::instruction::{
    Instruction, InstructionEnvelope, ReportInstruction, ShutdownInstruction,
    WorkloadActionsInstruction,
};

/// Runs instructions addressed to one member against that member's
/// context manager.
#[derive(Clone)]
pub struct NodeExecutor {
    manager: WorkloadContextManager,
}

impl NodeExecutor {
    pub fn new(manager: WorkloadContextManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &WorkloadContextManager {
        &self.manager
    }

    /// Decode the envelope by kind, run it, and encode the output.
    pub async fn execute(&self, envelope: &InstructionEnvelope) -> InstructionResult<String> {
        let kind = envelope.kind.as_str();
        if kind == ReportInstruction::KIND {
            let _: ReportInstruction = envelope.decode()?;
            Ok(serde_json::to_string(&self.report().await)?)
        } else if kind == WorkloadActionsInstruction::KIND {
            let instruction: WorkloadActionsInstruction = envelope.decode()?;
            Ok(serde_json::to_string(&self.apply_actions(&instruction).await?)?)
        } else if kind == ShutdownInstruction::KIND {
            let _: ShutdownInstruction = envelope.decode()?;
            self.shutdown().await;
            Ok(serde_json::to_string(&())?)
        } else {
            Err(InstructionError::UnknownKind(kind.to_string()))
        }
    }

    pub async fn report(&self) -> WorkloadReport {
        self.manager.report().await
    }

    /// Apply each action in order.
    ///
    /// ADD always starts a context. STOP, REMOVE, RESTART and FAIL only
    /// touch workloads this node is servicing. An unsupported action aborts
    /// the rest of the instruction; any other fault is logged and the next
    /// action runs. Stop and restart work is awaited before returning.
    pub async fn apply_actions(
        &self,
        instruction: &WorkloadActionsInstruction,
    ) -> InstructionResult<bool> {
        let mut pending: Vec<LifecycleTask> = Vec::new();

        for action in &instruction.actions {
            let workload = &action.workload;
            let kind = action.action;

            if kind == ActionType::Unsupported {
                error!(%workload, action = %kind, "unsupported action");
                return Err(InstructionError::UnsupportedAction(workload.urn().to_string()));
            }

            if kind == ActionType::Add {
                if let Err(e) = self.manager.start(workload).await {
                    error!(%workload, action = %kind, error = %e, "action failed");
                }
                continue;
            }

            if !self.manager.is_servicing(workload).await {
                debug!(%workload, action = %kind, "not servicing workload, skipping");
                continue;
            }

            match kind {
                ActionType::Stop => pending.push(self.manager.stop(workload).await),
                ActionType::Remove => pending.push(self.manager.remove(workload).await),
                ActionType::Restart => pending.push(self.manager.restart(workload)),
                ActionType::Fail => {
                    self.manager.fail(workload).await;
                }
                ActionType::Add | ActionType::Unsupported => {}
            }
            debug!(%workload, action = %kind, "action applied");
        }

        for outcome in join_all(pending).await {
            if let Err(e) = outcome {
                warn!(error = %e, "lifecycle task did not complete");
            }
        }
        Ok(true)
    }

    pub async fn shutdown(&self) {
        info!("shutdown instruction received");
        if let Err(e) = self.manager.shutdown().await.await {
            warn!(error = %e, "shutdown task did not complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use workgrid_core::{LifecycleConfig, RunningState, SchedulerAction, Workload};
    use workgrid_lifecycle::{CancelSignal, FnContextFactory, WorkloadRunnable};

    struct Idle;

    #[async_trait]
    impl WorkloadRunnable for Idle {
        async fn run(&self, _workload: &Workload, mut cancel: CancelSignal) -> anyhow::Result<()> {
            cancel.cancelled().await;
            Ok(())
        }
    }

    fn executor() -> NodeExecutor {
        let factory = FnContextFactory::new("idle", |_: &Workload| {
            Ok(Arc::new(Idle) as Arc<dyn WorkloadRunnable>)
        });
        let config = LifecycleConfig {
            stop_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
        };
        NodeExecutor::new(WorkloadContextManager::new(vec![Arc::new(factory)], config))
    }

    async fn run(executor: &NodeExecutor, actions: Vec<SchedulerAction>) -> InstructionResult<bool> {
        let envelope = InstructionEnvelope::encode(&WorkloadActionsInstruction::new(actions))?;
        let output = executor.execute(&envelope).await?;
        Ok(serde_json::from_str(&output)?)
    }

    #[tokio::test]
    async fn add_then_report() {
        let executor = executor();
        let a = Workload::new("idle", "a");
        assert!(run(&executor, vec![SchedulerAction::add(a.clone())]).await.unwrap());

        let envelope = InstructionEnvelope::encode(&ReportInstruction).unwrap();
        let output = executor.execute(&envelope).await.unwrap();
        let report: WorkloadReport = serde_json::from_str(&output).unwrap();
        assert!(report.contains(&a));
    }

    #[tokio::test]
    async fn remove_ignores_unserviced_workload() {
        let executor = executor();
        let result = run(&executor, vec![SchedulerAction::remove(Workload::new("idle", "ghost"))]).await;
        assert!(result.unwrap());
        assert!(executor.report().await.is_empty());
    }

    #[tokio::test]
    async fn remove_is_awaited_before_returning() {
        let executor = executor();
        let a = Workload::new("idle", "a");
        run(&executor, vec![SchedulerAction::add(a.clone())]).await.unwrap();
        let ctx = executor.manager().contexts_for(a.urn()).await.remove(0);

        run(&executor, vec![SchedulerAction::remove(a.clone())]).await.unwrap();
        assert!(!executor.manager().is_servicing(&a).await);
        assert_eq!(ctx.running_state(), RunningState::Stopped);
    }

    #[tokio::test]
    async fn unsupported_action_aborts_remaining_actions() {
        let executor = executor();
        let a = Workload::new("idle", "a");
        let b = Workload::new("idle", "b");
        let actions = vec![
            SchedulerAction::add(a.clone()),
            SchedulerAction::new(b.clone(), ActionType::Unsupported),
            SchedulerAction::add(b.clone()),
        ];

        let err = run(&executor, actions).await.unwrap_err();
        assert!(matches!(err, InstructionError::UnsupportedAction(_)));
        assert!(executor.manager().is_servicing(&a).await);
        assert!(!executor.manager().is_servicing(&b).await);
    }

    #[tokio::test]
    async fn failing_action_does_not_stop_siblings() {
        let executor = executor();
        let unknown = Workload::new("nobody-runs-this", "x");
        let a = Workload::new("idle", "a");
        let actions = vec![SchedulerAction::add(unknown), SchedulerAction::add(a.clone())];

        assert!(run(&executor, actions).await.unwrap());
        assert!(executor.manager().is_servicing(&a).await);
    }

    #[tokio::test]
    async fn fail_action_marks_error() {
        let executor = executor();
        let a = Workload::new("idle", "a");
        run(&executor, vec![SchedulerAction::add(a.clone())]).await.unwrap();
        run(&executor, vec![SchedulerAction::new(a.clone(), ActionType::Fail)])
            .await
            .unwrap();
        assert_eq!(executor.report().await.entries[0].state, RunningState::Error);
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let executor = executor();
        let envelope = InstructionEnvelope {
            kind: "reboot".to_string(),
            payload: "null".to_string(),
        };
        let err = executor.execute(&envelope).await.unwrap_err();
        assert!(matches!(err, InstructionError::UnknownKind(k) if k == "reboot"));
    }

    #[tokio::test]
    async fn shutdown_clears_node() {
        let executor = executor();
        run(&executor, vec![SchedulerAction::add(Workload::new("idle", "a"))])
            .await
            .unwrap();
        let envelope = InstructionEnvelope::encode(&ShutdownInstruction).unwrap();
        executor.execute(&envelope).await.unwrap();
        assert!(executor.report().await.is_empty());
    }
}
