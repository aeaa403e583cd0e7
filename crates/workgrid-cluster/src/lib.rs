//! workgrid-cluster — instruction dispatch across cluster members.
//!
//! Instructions are plain serde data wrapped in an [`InstructionEnvelope`]
//! (`kind` + JSON payload). The receiving node's [`NodeExecutor`] matches on
//! the kind and runs the instruction against its own
//! `WorkloadContextManager`; nothing live travels with the instruction.
//!
//! # Architecture
//!
//! ```text
//! ClusterManager::submit({member → instruction})
//!   ├── one task per member → ClusterTransport::dispatch(envelope)
//!   │                             └── LocalTransport → NodeExecutor (per member)
//!   └── mpsc fan-in, single deadline (DispatchConfig::poll_timeout)
//!         → {member → output}   (late or failed members are absent)
//! ```

pub mod error;
pub mod executor;
pub mod instruction;
pub mod manager;
pub mod transport;

pub use error::{ClusterError, ClusterResult, InstructionError, InstructionResult};
pub use executor::NodeExecutor;
pub use instruction::{
    Instruction, InstructionEnvelope, ReportInstruction, ShutdownInstruction,
    WorkloadActionsInstruction,
};
pub use manager::ClusterManager;
pub use transport::{ClusterTransport, LocalTransport};
