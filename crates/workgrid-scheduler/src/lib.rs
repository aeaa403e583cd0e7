//! workgrid-scheduler — cluster-wide workload rebalancing.
//!
//! One rebalance cycle, run by whichever member wins the lock:
//!
//! - Broadcast a report request and gather every member's workloads
//! - Compare against the inventory and plan removals, additions, moves
//!   and restarts with a [`SchedulerStrategy`]
//! - Submit removals, wait for them, then submit additions and restarts
//!
//! # Architecture
//!
//! ```text
//! DistributedScheduler
//!   ├── DistributedLock       (try-lock, skip cycle if held elsewhere)
//!   ├── WorkloadRepository    (inventory, optionally cached)
//!   ├── ClusterManager        (report broadcast, phased submission)
//!   └── SchedulerStrategy
//!       └── GreedyStrategy → SchedulerStrategyContext (scratch copy)
//!
//! WorkloadControl → stop / fail / restart(urn) on the servicing members
//! ```

pub mod control;
pub mod error;
pub mod greedy;
pub mod lock;
pub mod repository;
pub mod scheduler;
pub mod strategy;

pub use control::WorkloadControl;
pub use error::{SchedulerError, SchedulerResult};
pub use greedy::GreedyStrategy;
pub use lock::{DistributedLock, LocalLock, LockGuard, LockToken};
pub use repository::{
    CachingWorkloadRepository, SimpleWorkloadRepository, StaticWorkloadSource,
    WorkloadRepository, WorkloadSource,
};
pub use scheduler::{CycleOutcome, DistributedScheduler};
pub use strategy::{SchedulerStrategy, SchedulerStrategyContext};
