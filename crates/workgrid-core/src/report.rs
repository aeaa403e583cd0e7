//! Per-member workload reports.

use serde::{Deserialize, Serialize};

use crate::state::RunningState;
use crate::types::Workload;

/// Status of one workload context on a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadReportEntry {
    pub workload: Workload,
    pub state: RunningState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkloadReportEntry {
    pub fn new(workload: Workload, state: RunningState) -> Self {
        Self {
            workload,
            state,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Everything a member is currently servicing, one entry per context.
///
/// `Clone` produces an independent copy of every entry; the scheduler
/// uses that copy as scratch space while planning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadReport {
    pub entries: Vec<WorkloadReportEntry>,
}

impl WorkloadReport {
    pub fn new(entries: Vec<WorkloadReportEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: WorkloadReportEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, workload: &Workload) -> bool {
        self.entries.iter().any(|e| &e.workload == workload)
    }

    /// Drop every entry for `workload`, returning how many were removed.
    pub fn remove_workload(&mut self, workload: &Workload) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| &e.workload != workload);
        before - self.entries.len()
    }

    pub fn workloads(&self) -> impl Iterator<Item = &Workload> {
        self.entries.iter().map(|e| &e.workload)
    }
}

impl FromIterator<WorkloadReportEntry> for WorkloadReport {
    fn from_iter<I: IntoIterator<Item = WorkloadReportEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
