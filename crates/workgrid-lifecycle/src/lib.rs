//! workgrid-lifecycle — running workloads on a single node.
//!
//! A [`WorkloadContext`] owns one workload and the tokio task that executes
//! it. The [`WorkloadContextManager`] keeps every context registered on this
//! node and implements bounded stop/restart: signal cooperative
//! cancellation, poll until the context reports stopped, and abort the task
//! once the configured stop timeout passes.
//!
//! # Architecture
//!
//! ```text
//! WorkloadContextManager
//!   ├── factories: [WorkloadContextFactory]  (supports(workload)?)
//!   ├── contexts:  RwLock<[WorkloadContext]>  (snapshot-on-read)
//!   └── stop / remove / restart / shutdown → spawned LifecycleTask
//!
//! TaskWorkloadContext
//!   ├── WorkloadRunnable (business logic)
//!   ├── watch::Sender<bool>  (cooperative cancel)
//!   └── JoinHandle<()>       (forced abort)
//! ```

pub mod context;
pub mod error;
pub mod factory;
pub mod manager;
pub mod runnable;

pub use context::{TaskWorkloadContext, WorkloadContext};
pub use error::{LifecycleError, LifecycleResult};
pub use factory::{FnContextFactory, WorkloadContextFactory};
pub use manager::{LifecycleTask, WorkloadContextManager};
pub use runnable::{CancelSignal, WorkloadRunnable};
