//! Fan-out/fan-in instruction dispatch.
//!
//! Every (member, instruction) pair is delivered on its own task; results
//! come back over one channel and are collected until a single deadline.
//! A member that has not answered by then is logged and left out of the
//! result map. Callers treat a missing member as "status unknown", never
//! as a failed batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use workgrid_core::{ClusterMember, DispatchConfig};

use crate::error::{ClusterError, ClusterResult};
use crate::instruction::{Instruction, InstructionEnvelope};
use crate::transport::ClusterTransport;

/// Submits instructions to members and gathers their answers.
#[derive(Clone)]
pub struct ClusterManager {
    /// Member discovery and delivery.
    transport: Arc<dyn ClusterTransport>,
    /// Holds `poll_timeout`, the single deadline for every batch.
    config: DispatchConfig,
}

impl ClusterManager {
    pub fn new(transport: Arc<dyn ClusterTransport>, config: DispatchConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &Arc<dyn ClusterTransport> {
        &self.transport
    }

    pub async fn members(&self) -> ClusterResult<Vec<ClusterMember>> {
        self.transport.members().await
    }

    pub async fn schedule_time(&self) -> ClusterResult<Option<u64>> {
        self.transport.schedule_time().await
    }

    pub async fn set_schedule_time(&self, epoch_millis: u64) -> ClusterResult<()> {
        self.transport.set_schedule_time(epoch_millis).await
    }

    /// Send the same instruction to every known member.
    pub async fn submit_to_all<I>(
        &self,
        instruction: &I,
    ) -> ClusterResult<HashMap<ClusterMember, I::Output>>
    where
        I: Instruction + Clone,
    {
        let members = self.members().await?;
        let batch = members
            .into_iter()
            .map(|m| (m, instruction.clone()))
            .collect();
        self.submit(batch).await
    }

    /// Run each member's instruction concurrently and collect whatever
    /// answers arrive before `poll_timeout`.
    pub async fn submit<I: Instruction>(
        &self,
        instructions: HashMap<ClusterMember, I>,
    ) -> ClusterResult<HashMap<ClusterMember, I::Output>> {
        let mut results = HashMap::with_capacity(instructions.len());
        if instructions.is_empty() {
            return Ok(results);
        }

        let (tx, mut rx) = mpsc::channel(instructions.len());
        let mut outstanding = HashSet::with_capacity(instructions.len());

        for (member, instruction) in instructions {
            let envelope = InstructionEnvelope::encode(&instruction)?;
            let transport = Arc::clone(&self.transport);
            let tx = tx.clone();
            outstanding.insert(member.clone());
            tokio::spawn(async move {
                let result = transport.dispatch(&member, envelope).await;
                let _ = tx.send((member, result)).await;
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.config.poll_timeout;
        while !outstanding.is_empty() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((member, result))) => {
                    outstanding.remove(&member);
                    match result.and_then(|payload| decode::<I>(&payload)) {
                        Ok(output) => {
                            debug!(member = %member, kind = I::KIND, "instruction completed");
                            results.insert(member, output);
                        }
                        Err(e) => {
                            warn!(member = %member, kind = I::KIND, error = %e, "instruction failed on member");
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    for member in &outstanding {
                        warn!(
                            member = %member,
                            kind = I::KIND,
                            timeout_ms = self.config.poll_timeout.as_millis() as u64,
                            "member did not respond before deadline"
                        );
                    }
                    break;
                }
            }
        }

        Ok(results)
    }
}

fn decode<I: Instruction>(payload: &str) -> ClusterResult<I::Output> {
    serde_json::from_str(payload).map_err(ClusterError::Codec)
}
