//! Scheduler actions, the commands a member executes against its
//! local workload contexts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Workload;

/// What to do with a workload on the receiving member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Create and start a context.
    Add,
    /// De-register the contexts, then stop them.
    Remove,
    /// Remove then start again.
    Restart,
    /// Stop the contexts but keep them registered.
    Stop,
    /// Force the contexts into ERROR.
    Fail,
    /// Any tag this build does not know.
    #[serde(other)]
    Unsupported,
}

impl ActionType {
    /// Removals run in the first phase of a rebalance, before anything
    /// is started anywhere.
    pub fn is_removal(self) -> bool {
        matches!(self, ActionType::Remove)
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionType::Add => "ADD",
            ActionType::Remove => "REMOVE",
            ActionType::Restart => "RESTART",
            ActionType::Stop => "STOP",
            ActionType::Fail => "FAIL",
            ActionType::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single command for one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerAction {
    pub workload: Workload,
    pub action: ActionType,
}

impl SchedulerAction {
    pub fn new(workload: Workload, action: ActionType) -> Self {
        Self { workload, action }
    }

    pub fn add(workload: Workload) -> Self {
        Self::new(workload, ActionType::Add)
    }

    pub fn remove(workload: Workload) -> Self {
        Self::new(workload, ActionType::Remove)
    }

    pub fn restart(workload: Workload) -> Self {
        Self::new(workload, ActionType::Restart)
    }
}
