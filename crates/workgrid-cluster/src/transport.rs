//! Member discovery and point-to-point delivery.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

use workgrid_core::ClusterMember;

use crate::error::{ClusterError, ClusterResult};
use crate::executor::NodeExecutor;
use crate::instruction::InstructionEnvelope;

/// How instructions reach members.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Live members, including this node.
    async fn members(&self) -> ClusterResult<Vec<ClusterMember>>;

    /// Deliver one envelope and return the member's encoded output.
    async fn dispatch(
        &self,
        member: &ClusterMember,
        envelope: InstructionEnvelope,
    ) -> ClusterResult<String>;

    /// Cluster-shared "next rebalance due" marker, epoch millis.
    async fn schedule_time(&self) -> ClusterResult<Option<u64>>;

    async fn set_schedule_time(&self, epoch_millis: u64) -> ClusterResult<()>;
}

/// In-process cluster: every member is a [`NodeExecutor`] in this process.
///
/// Payloads still cross as JSON strings, exactly as a remote backend
/// would carry them. Members can be partitioned to simulate a node that
/// stops answering; deliveries to it park until it heals or leaves.
#[derive(Default)]
pub struct LocalTransport {
    members: RwLock<BTreeMap<ClusterMember, NodeExecutor>>,
    partitioned: RwLock<HashSet<ClusterMember>>,
    /// Wakes parked deliveries on heal and leave.
    reachability: Notify,
    schedule_time: Mutex<Option<u64>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, member: ClusterMember, executor: NodeExecutor) {
        info!(member = %member, "member joined local cluster");
        self.members.write().await.insert(member, executor);
    }

    pub async fn leave(&self, member: &ClusterMember) -> Option<NodeExecutor> {
        self.partitioned.write().await.remove(member);
        let removed = self.members.write().await.remove(member);
        if removed.is_some() {
            info!(member = %member, "member left local cluster");
        }
        self.reachability.notify_waiters();
        removed
    }

    /// Deliveries to a partitioned member hang until [`heal`](Self::heal)
    /// or [`leave`](Self::leave).
    pub async fn partition(&self, member: &ClusterMember) {
        self.partitioned.write().await.insert(member.clone());
    }

    pub async fn heal(&self, member: &ClusterMember) {
        self.partitioned.write().await.remove(member);
        self.reachability.notify_waiters();
    }

    /// Park until `member` is reachable. Errors if it left meanwhile.
    async fn await_reachable(&self, member: &ClusterMember) -> ClusterResult<NodeExecutor> {
        loop {
            // Registered before the check so a heal in between is not lost.
            let woken = self.reachability.notified();
            let executor = self
                .executor(member)
                .await
                .ok_or_else(|| ClusterError::Transport(format!("{member} left before delivery")))?;
            if !self.partitioned.read().await.contains(member) {
                return Ok(executor);
            }
            woken.await;
        }
    }

    pub async fn executor(&self, member: &ClusterMember) -> Option<NodeExecutor> {
        self.members.read().await.get(member).cloned()
    }
}

#[async_trait]
impl ClusterTransport for LocalTransport {
    async fn members(&self) -> ClusterResult<Vec<ClusterMember>> {
        Ok(self.members.read().await.keys().cloned().collect())
    }

    async fn dispatch(
        &self,
        member: &ClusterMember,
        envelope: InstructionEnvelope,
    ) -> ClusterResult<String> {
        if self.executor(member).await.is_none() {
            return Err(ClusterError::UnknownMember(member.urn().to_string()));
        }
        if self.partitioned.read().await.contains(member) {
            debug!(member = %member, kind = %envelope.kind, "member partitioned, holding instruction");
        }

        let executor = self.await_reachable(member).await?;
        Ok(executor.execute(&envelope).await?)
    }

    async fn schedule_time(&self) -> ClusterResult<Option<u64>> {
        Ok(*self.schedule_time.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn set_schedule_time(&self, epoch_millis: u64) -> ClusterResult<()> {
        *self.schedule_time.lock().unwrap_or_else(PoisonError::into_inner) = Some(epoch_millis);
        Ok(())
    }
}
