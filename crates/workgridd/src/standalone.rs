//! Standalone mode: a whole cluster of simulated members in one process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use workgrid_cluster::{ClusterManager, LocalTransport, NodeExecutor};
use workgrid_core::{ClusterMember, WorkgridConfig};
use workgrid_lifecycle::WorkloadContextManager;
use workgrid_scheduler::{
    CachingWorkloadRepository, DistributedScheduler, GreedyStrategy, LocalLock,
    SimpleWorkloadRepository, StaticWorkloadSource, WorkloadControl, WorkloadRepository,
};

use crate::ticker;

const MEMBER_KIND: &str = "standalone";

pub async fn run(config_path: Option<PathBuf>, members: usize) -> anyhow::Result<()> {
    info!("WorkGrid daemon starting in standalone mode");

    let config = match &config_path {
        Some(path) => WorkgridConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WorkgridConfig::default(),
    };
    let workloads = config.workloads()?;
    let members = members.max(1);
    info!(members, workloads = workloads.len(), "configuration loaded");

    // ── Cluster members ────────────────────────────────────────

    let transport = Arc::new(LocalTransport::new());
    let mut managers = Vec::with_capacity(members);
    for i in 0..members {
        let manager = WorkloadContextManager::new(vec![ticker::factory()], config.lifecycle.clone());
        let member = ClusterMember::new(MEMBER_KIND, format!("node-{i}"));
        transport.join(member, NodeExecutor::new(manager.clone())).await;
        managers.push(manager);
    }
    let cluster = ClusterManager::new(transport, config.dispatch.clone());

    // ── Inventory ──────────────────────────────────────────────

    let source = StaticWorkloadSource::new("config", workloads);
    let repository: Arc<dyn WorkloadRepository> = Arc::new(CachingWorkloadRepository::new(
        SimpleWorkloadRepository::new(vec![Arc::new(source)]),
        config.inventory.cache_ttl,
    ));

    // ── Scheduler loops, one per member ────────────────────────

    let lock = Arc::new(LocalLock::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops = Vec::with_capacity(members);
    for _ in 0..members {
        let scheduler = DistributedScheduler::new(
            cluster.clone(),
            Arc::clone(&repository),
            Arc::new(GreedyStrategy::new()),
            lock.clone(),
            config.scheduler.clone(),
        );
        let shutdown = shutdown_rx.clone();
        loops.push(tokio::spawn(async move { scheduler.run(shutdown).await }));
    }

    // ── Wait for Ctrl-C ────────────────────────────────────────

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    for handle in loops {
        let _ = handle.await;
    }

    let control = WorkloadControl::new(cluster, repository);
    if let Ok(status) = control.status().await {
        for (member, report) in status {
            info!(member = %member, workloads = report.len(), "final member status");
        }
    }

    // ── Stop local workloads ───────────────────────────────────

    let grace = config.lifecycle.stop_timeout + config.lifecycle.poll_interval;
    stop_members(&managers, grace).await;

    info!("WorkGrid daemon stopped");
    Ok(())
}

/// Shut down every member's workloads, waiting at most `grace`. Returns
/// false if the window closed first; the stops carry on in the background.
async fn stop_members(managers: &[WorkloadContextManager], grace: Duration) -> bool {
    let stopping = join_all(managers.iter().map(|m| async move {
        if let Err(e) = m.shutdown().await.await {
            warn!(error = %e, "workload shutdown task failed");
        }
    }));
    if tokio::time::timeout(grace, stopping).await.is_err() {
        warn!(
            timeout_ms = grace.as_millis() as u64,
            "workloads did not stop within the shutdown window"
        );
        return false;
    }
    true
}
