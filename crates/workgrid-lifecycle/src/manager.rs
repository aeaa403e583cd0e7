//! Node-local context manager.
//!
//! Registry mutations happen under one write lock; readers take a snapshot
//! of the registered contexts and work on that, so a report never misses or
//! duplicates an entry while a start or remove is in flight.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use workgrid_core::{LifecycleConfig, Workload, WorkloadReport};

use crate::context::WorkloadContext;
use crate::error::{LifecycleError, LifecycleResult};
use crate::factory::WorkloadContextFactory;

/// Background stop/remove/restart work. Awaiting it waits for completion.
pub type LifecycleTask = JoinHandle<()>;

/// All workload contexts on this node.
#[derive(Clone)]
pub struct WorkloadContextManager {
    factories: Arc<Vec<Arc<dyn WorkloadContextFactory>>>,
    contexts: Arc<RwLock<Vec<Arc<dyn WorkloadContext>>>>,
    config: LifecycleConfig,
}

impl WorkloadContextManager {
    pub fn new(factories: Vec<Arc<dyn WorkloadContextFactory>>, config: LifecycleConfig) -> Self {
        Self {
            factories: Arc::new(factories),
            contexts: Arc::new(RwLock::new(Vec::new())),
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Create, start and register a context for every factory that
    /// supports the workload. Returns how many contexts were started.
    pub async fn start(&self, workload: &Workload) -> LifecycleResult<usize> {
        let factories: Vec<_> = self
            .factories
            .iter()
            .filter(|f| f.supports(workload))
            .cloned()
            .collect();
        if factories.is_empty() {
            return Err(LifecycleError::NoFactory(workload.urn().to_string()));
        }

        let mut contexts = self.contexts.write().await;
        let mut started = 0;
        for factory in factories {
            let context = match factory.create_context(workload) {
                Ok(c) => c,
                Err(e) => {
                    error!(%workload, error = %e, "failed to create workload context");
                    continue;
                }
            };
            // Registered even if start fails so the rebalancer sees the
            // ERROR entry and restarts it.
            if let Err(e) = context.start() {
                error!(%workload, error = %e, "failed to start workload context");
            } else {
                started += 1;
            }
            contexts.push(context);
        }

        debug!(%workload, started, "workload start processed");
        Ok(started)
    }

    /// Stop the workload's contexts but keep them registered.
    pub async fn stop(&self, workload: &Workload) -> LifecycleTask {
        let targets = self.contexts_for(workload.urn()).await;
        info!(%workload, contexts = targets.len(), "stopping workload");
        tokio::spawn(stop_all(targets, self.config.clone()))
    }

    /// De-register the workload's contexts immediately, then stop them.
    pub async fn remove(&self, workload: &Workload) -> LifecycleTask {
        let removed = {
            let mut contexts = self.contexts.write().await;
            let (removed, kept): (Vec<_>, Vec<_>) = contexts
                .drain(..)
                .partition(|c| c.workload().urn() == workload.urn());
            *contexts = kept;
            removed
        };
        info!(%workload, contexts = removed.len(), "removing workload");
        tokio::spawn(stop_all(removed, self.config.clone()))
    }

    /// Remove then start again. A failed or cancelled removal aborts the
    /// restart without starting anything.
    pub fn restart(&self, workload: &Workload) -> LifecycleTask {
        let manager = self.clone();
        let workload = workload.clone();
        tokio::spawn(async move {
            let removal = manager.remove(&workload).await;
            if let Err(e) = removal.await {
                error!(%workload, error = %e, "restart aborted: removal did not complete");
                return;
            }
            match manager.start(&workload).await {
                Ok(started) => info!(%workload, started, "workload restarted"),
                Err(e) => error!(%workload, error = %e, "restart failed to start workload"),
            }
        })
    }

    /// Force every context of the workload into ERROR. Returns the count.
    pub async fn fail(&self, workload: &Workload) -> usize {
        let targets = self.contexts_for(workload.urn()).await;
        for context in &targets {
            context.fail();
        }
        targets.len()
    }

    pub async fn is_servicing(&self, workload: &Workload) -> bool {
        self.contexts
            .read()
            .await
            .iter()
            .any(|c| c.workload().urn() == workload.urn())
    }

    pub async fn contexts_for(&self, urn: &str) -> Vec<Arc<dyn WorkloadContext>> {
        self.contexts
            .read()
            .await
            .iter()
            .filter(|c| c.workload().urn() == urn)
            .cloned()
            .collect()
    }

    pub async fn context_count(&self) -> usize {
        self.contexts.read().await.len()
    }

    /// One entry per registered context.
    pub async fn report(&self) -> WorkloadReport {
        let snapshot: Vec<_> = self.contexts.read().await.iter().cloned().collect();
        snapshot.iter().map(|c| c.report_entry()).collect()
    }

    /// De-register and stop everything on this node.
    pub async fn shutdown(&self) -> LifecycleTask {
        let all: Vec<_> = self.contexts.write().await.drain(..).collect();
        info!(contexts = all.len(), "shutting down all workloads");
        tokio::spawn(stop_all(all, self.config.clone()))
    }
}

async fn stop_all(contexts: Vec<Arc<dyn WorkloadContext>>, config: LifecycleConfig) {
    join_all(contexts.into_iter().map(|c| stop_context(c, config.clone()))).await;
}

/// Graceful stop, escalating to terminate after `stop_timeout`.
async fn stop_context(context: Arc<dyn WorkloadContext>, config: LifecycleConfig) {
    context.stop();

    let converged = tokio::time::timeout(config.stop_timeout, async {
        while !context.is_stopped() {
            tokio::time::sleep(config.poll_interval).await;
        }
    })
    .await;

    if converged.is_err() {
        warn!(
            workload = %context.workload(),
            timeout_ms = config.stop_timeout.as_millis() as u64,
            "workload did not stop in time, terminating"
        );
        context.terminate().await;
    }
}
