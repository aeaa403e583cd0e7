//! Scheduler error types.

use thiserror::Error;

use workgrid_cluster::ClusterError;

/// Errors that can occur during a rebalance cycle or an operator action.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no cluster member responded to the report request")]
    NoReports,

    #[error("workload not found: {0}")]
    UnknownWorkload(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
