//! Context factories, matched against a workload by capability.

use std::fmt;
use std::sync::Arc;

use workgrid_core::Workload;

use crate::context::{TaskWorkloadContext, WorkloadContext};
use crate::error::{LifecycleError, LifecycleResult};
use crate::runnable::WorkloadRunnable;

/// Builds contexts for the workload kinds it understands.
pub trait WorkloadContextFactory: Send + Sync {
    fn supports(&self, workload: &Workload) -> bool;

    fn create_context(&self, workload: &Workload) -> LifecycleResult<Arc<dyn WorkloadContext>>;
}

/// Factory for a single workload kind, backed by a closure that builds the
/// runnable from the workload's params.
pub struct FnContextFactory<F> {
    kind: String,
    make: F,
}

impl<F> FnContextFactory<F>
where
    F: Fn(&Workload) -> anyhow::Result<Arc<dyn WorkloadRunnable>> + Send + Sync,
{
    pub fn new(kind: impl Into<String>, make: F) -> Self {
        Self {
            kind: kind.into(),
            make,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl<F> fmt::Debug for FnContextFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnContextFactory")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<F> WorkloadContextFactory for FnContextFactory<F>
where
    F: Fn(&Workload) -> anyhow::Result<Arc<dyn WorkloadRunnable>> + Send + Sync,
{
    fn supports(&self, workload: &Workload) -> bool {
        workload.kind() == self.kind
    }

    fn create_context(&self, workload: &Workload) -> LifecycleResult<Arc<dyn WorkloadContext>> {
        let runnable = (self.make)(workload).map_err(|e| LifecycleError::CreateContext {
            urn: workload.urn().to_string(),
            reason: format!("{e:#}"),
        })?;
        Ok(Arc::new(TaskWorkloadContext::new(workload.clone(), runnable)))
    }
}
