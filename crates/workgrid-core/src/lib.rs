//! workgrid-core — shared data model for WorkGrid.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! ```text
//! ClusterMember   urn:cluster-member:{kind}:{id}
//! Workload        urn:workload:{kind}:{id}   (+ opaque JSON params)
//! RunningState    NOT_STARTED → STARTING → RUNNING → STOPPING → STOPPED
//!                                            └──────────┴──→ ERROR
//! WorkloadReport  [(workload, state, error?)]  one per member
//! SchedulerAction (workload, ADD | REMOVE | RESTART | STOP | FAIL)
//! ```
//!
//! Identity types compare, hash and order by urn only, so two values that
//! share a urn are interchangeable regardless of their payloads.

pub mod action;
pub mod config;
pub mod error;
pub mod report;
pub mod state;
pub mod types;

pub use action::{ActionType, SchedulerAction};
pub use config::{
    DispatchConfig, InventoryConfig, LifecycleConfig, SchedulerConfig, WorkgridConfig,
    WorkloadSpec, parse_duration,
};
pub use error::{CoreError, CoreResult};
pub use report::{WorkloadReport, WorkloadReportEntry};
pub use state::RunningState;
pub use types::{ClusterMember, Workload};
