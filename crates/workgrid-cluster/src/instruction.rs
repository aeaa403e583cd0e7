//! Instructions: serializable commands executed on a member.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use workgrid_core::{SchedulerAction, WorkloadReport};

use crate::error::{InstructionError, InstructionResult};

/// A unit of remotely executable work with a typed result.
///
/// Instructions in one batch may run in any order relative to each other.
pub trait Instruction: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Tag the receiving executor dispatches on.
    const KIND: &'static str;

    type Output: Serialize + DeserializeOwned + Send + 'static;
}

/// Wire form of an instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstructionEnvelope {
    pub kind: String,
    pub payload: String,
}

impl InstructionEnvelope {
    pub fn encode<I: Instruction>(instruction: &I) -> InstructionResult<Self> {
        Ok(Self {
            kind: I::KIND.to_string(),
            payload: serde_json::to_string(instruction)?,
        })
    }

    pub fn decode<I: Instruction>(&self) -> InstructionResult<I> {
        if self.kind != I::KIND {
            return Err(InstructionError::KindMismatch {
                expected: I::KIND.to_string(),
                actual: self.kind.clone(),
            });
        }
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Ask a member for its current [`WorkloadReport`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReportInstruction;

impl Instruction for ReportInstruction {
    const KIND: &'static str = "report";
    type Output = WorkloadReport;
}

/// Apply scheduler actions to the member's local contexts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadActionsInstruction {
    pub actions: Vec<SchedulerAction>,
}

impl WorkloadActionsInstruction {
    pub fn new(actions: Vec<SchedulerAction>) -> Self {
        Self { actions }
    }

    pub fn single(action: SchedulerAction) -> Self {
        Self {
            actions: vec![action],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Instruction for WorkloadActionsInstruction {
    const KIND: &'static str = "workload-actions";
    type Output = bool;
}

/// Stop every workload on the member.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ShutdownInstruction;

impl Instruction for ShutdownInstruction {
    const KIND: &'static str = "shutdown";
    type Output = ();
}
