//! Running state of a workload.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a workload on the member that services it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunningState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl RunningState {
    /// Stopping or already done.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunningState::Stopping | RunningState::Stopped | RunningState::Error
        )
    }

    /// Fully finished, successfully or not.
    pub fn is_terminated(self) -> bool {
        matches!(self, RunningState::Stopped | RunningState::Error)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: RunningState) -> bool {
        use RunningState::*;
        matches!(
            (self, next),
            (NotStarted, Starting)
                | (NotStarted, Stopped)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Error)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Running, Error)
                | (Stopping, Stopped)
                | (Stopping, Error)
        )
    }

    /// Order by how cheap an entry is to move during rebalancing.
    ///
    /// Terminated entries come first; every other pair compares equal so
    /// a stable min keeps report order among peers.
    pub fn expendability_cmp(self, other: RunningState) -> Ordering {
        match (self.is_terminated(), other.is_terminated()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RunningState::NotStarted => "NOT_STARTED",
            RunningState::Starting => "STARTING",
            RunningState::Running => "RUNNING",
            RunningState::Stopping => "STOPPING",
            RunningState::Stopped => "STOPPED",
            RunningState::Error => "ERROR",
        }
    }
}

impl fmt::Display for RunningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
