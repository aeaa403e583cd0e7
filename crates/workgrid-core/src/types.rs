//! Identity types: cluster members and workloads.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

const MEMBER_URN_PREFIX: &str = "urn:cluster-member";
const WORKLOAD_URN_PREFIX: &str = "urn:workload";

// ── ClusterMember ──────────────────────────────────────────────────

/// One node participating in the cluster.
///
/// `kind` names the transport backend that discovered the member
/// (e.g. `local`), `id` is unique within that backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "MemberParts", into = "MemberParts")]
pub struct ClusterMember {
    kind: String,
    id: String,
    urn: String,
}

#[derive(Serialize, Deserialize)]
struct MemberParts {
    kind: String,
    id: String,
}

impl ClusterMember {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        let kind = kind.into();
        let id = id.into();
        let urn = format!("{MEMBER_URN_PREFIX}:{kind}:{id}");
        Self { kind, id, urn }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }
}

impl From<MemberParts> for ClusterMember {
    fn from(parts: MemberParts) -> Self {
        ClusterMember::new(parts.kind, parts.id)
    }
}

impl From<ClusterMember> for MemberParts {
    fn from(member: ClusterMember) -> Self {
        MemberParts {
            kind: member.kind,
            id: member.id,
        }
    }
}

impl PartialEq for ClusterMember {
    fn eq(&self, other: &Self) -> bool {
        self.urn == other.urn
    }
}

impl Eq for ClusterMember {}

impl Hash for ClusterMember {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.urn.hash(state);
    }
}

impl PartialOrd for ClusterMember {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClusterMember {
    fn cmp(&self, other: &Self) -> Ordering {
        self.urn.cmp(&other.urn)
    }
}

impl fmt::Display for ClusterMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn)
    }
}

// ── Workload ───────────────────────────────────────────────────────

/// A unit of work the cluster keeps running on exactly one member.
///
/// `kind` is the variant tag that context factories match on; `params`
/// carries whatever the variant needs and never takes part in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "WorkloadParts", into = "WorkloadParts")]
pub struct Workload {
    kind: String,
    id: String,
    params: serde_json::Value,
    urn: String,
}

#[derive(Serialize, Deserialize)]
struct WorkloadParts {
    kind: String,
    id: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    params: serde_json::Value,
}

impl Workload {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        let kind = kind.into();
        let id = id.into();
        let urn = format!("{WORKLOAD_URN_PREFIX}:{kind}:{id}");
        Self {
            kind,
            id,
            params: serde_json::Value::Null,
            urn,
        }
    }

    /// Attach a variant-specific payload.
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }
}

impl From<WorkloadParts> for Workload {
    fn from(parts: WorkloadParts) -> Self {
        Workload::new(parts.kind, parts.id).with_params(parts.params)
    }
}

impl From<Workload> for WorkloadParts {
    fn from(workload: Workload) -> Self {
        WorkloadParts {
            kind: workload.kind,
            id: workload.id,
            params: workload.params,
        }
    }
}

impl PartialEq for Workload {
    fn eq(&self, other: &Self) -> bool {
        self.urn == other.urn
    }
}

impl Eq for Workload {}

impl Hash for Workload {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.urn.hash(state);
    }
}

impl PartialOrd for Workload {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Workload {
    fn cmp(&self, other: &Self) -> Ordering {
        self.urn.cmp(&other.urn)
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn)
    }
}
