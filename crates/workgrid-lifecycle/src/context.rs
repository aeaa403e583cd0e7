//! Workload contexts: one workload plus its execution unit.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use workgrid_core::{RunningState, Workload, WorkloadReportEntry};

use crate::error::{LifecycleError, LifecycleResult};
use crate::runnable::{CancelSignal, WorkloadRunnable};

/// Owns exactly one workload and whatever executes it.
#[async_trait]
pub trait WorkloadContext: Send + Sync {
    fn workload(&self) -> &Workload;

    /// Launch a fresh execution unit.
    ///
    /// Fails with [`LifecycleError::AlreadyRunning`] while a previous unit
    /// is still alive.
    fn start(&self) -> LifecycleResult<()>;

    /// Request cooperative cancellation. Never blocks; safe to repeat.
    fn stop(&self);

    /// True when nothing is executing any more.
    fn is_stopped(&self) -> bool;

    /// Abort the execution unit and wait for it to exit.
    async fn terminate(&self);

    /// Force the workload into ERROR.
    fn fail(&self);

    fn running_state(&self) -> RunningState;

    fn report_entry(&self) -> WorkloadReportEntry;
}

#[derive(Debug)]
struct Status {
    state: RunningState,
    error: Option<String>,
}

struct ExecutionUnit {
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
}

/// Runs a [`WorkloadRunnable`] on its own tokio task.
pub struct TaskWorkloadContext {
    workload: Workload,
    /// Business logic, shared by every execution unit this context starts.
    runnable: Arc<dyn WorkloadRunnable>,
    /// Written by the execution unit as well as by stop/fail.
    status: Arc<Mutex<Status>>,
    /// The live task and its cancel switch. `None` until started and
    /// again once the task is reaped.
    unit: Mutex<Option<ExecutionUnit>>,
}

impl TaskWorkloadContext {
    pub fn new(workload: Workload, runnable: Arc<dyn WorkloadRunnable>) -> Self {
        Self {
            workload,
            runnable,
            status: Arc::new(Mutex::new(Status {
                state: RunningState::NotStarted,
                error: None,
            })),
            unit: Mutex::new(None),
        }
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.status).error.clone()
    }
}

#[async_trait]
impl WorkloadContext for TaskWorkloadContext {
    fn workload(&self) -> &Workload {
        &self.workload
    }

    fn start(&self) -> LifecycleResult<()> {
        let mut unit = lock(&self.unit);
        if unit.as_ref().is_some_and(|u| !u.handle.is_finished()) {
            return Err(LifecycleError::AlreadyRunning(self.workload.urn().to_string()));
        }

        {
            let mut status = lock(&self.status);
            status.state = RunningState::Starting;
            status.error = None;
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(execute(
            self.workload.clone(),
            Arc::clone(&self.runnable),
            Arc::clone(&self.status),
            CancelSignal::new(cancel_rx),
        ));

        *unit = Some(ExecutionUnit { handle, cancel });
        info!(workload = %self.workload, "workload started");
        Ok(())
    }

    fn stop(&self) {
        let unit = lock(&self.unit);
        let mut status = lock(&self.status);
        if status.state.is_terminal() {
            return;
        }

        match unit.as_ref() {
            Some(u) => {
                status.state = RunningState::Stopping;
                let _ = u.cancel.send(true);
                debug!(workload = %self.workload, "stop requested");
            }
            None => {
                // Never started: nothing to wind down.
                status.state = RunningState::Stopped;
            }
        }
    }

    fn is_stopped(&self) -> bool {
        let mut unit = lock(&self.unit);
        let finished = match unit.as_ref() {
            None => return true,
            Some(u) => u.handle.is_finished(),
        };

        let mut status = lock(&self.status);
        if finished {
            *unit = None;
            if !status.state.is_terminated() {
                status.state = RunningState::Stopped;
            }
            return true;
        }
        status.state.is_terminated()
    }

    async fn terminate(&self) {
        let unit = lock(&self.unit).take();
        if let Some(unit) = unit {
            let _ = unit.cancel.send(true);
            unit.handle.abort();
            match unit.handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(workload = %self.workload, error = %e, "execution unit ended abnormally"),
            }
            warn!(workload = %self.workload, "workload terminated");
        }

        let mut status = lock(&self.status);
        if !status.state.is_terminated() {
            status.state = RunningState::Stopped;
        }
    }

    fn fail(&self) {
        let unit = lock(&self.unit);
        let mut status = lock(&self.status);
        status.state = RunningState::Error;
        if status.error.is_none() {
            status.error = Some("workload failed on request".to_string());
        }
        if let Some(u) = unit.as_ref() {
            let _ = u.cancel.send(true);
        }
        warn!(workload = %self.workload, "workload forced into error state");
    }

    fn running_state(&self) -> RunningState {
        lock(&self.status).state
    }

    fn report_entry(&self) -> WorkloadReportEntry {
        let status = lock(&self.status);
        WorkloadReportEntry {
            workload: self.workload.clone(),
            state: status.state,
            error: status.error.clone(),
        }
    }
}

/// Body of the execution unit's task.
async fn execute(
    workload: Workload,
    runnable: Arc<dyn WorkloadRunnable>,
    status: Arc<Mutex<Status>>,
    cancel: CancelSignal,
) {
    {
        let mut status = lock(&status);
        if status.state == RunningState::Starting {
            status.state = RunningState::Running;
        }
    }

    let outcome = AssertUnwindSafe(runnable.run(&workload, cancel))
        .catch_unwind()
        .await;

    let mut status = lock(&status);
    match outcome {
        Ok(Ok(())) => {
            if !status.state.is_terminated() {
                status.state = RunningState::Stopped;
            }
            info!(%workload, "workload stopped");
        }
        Ok(Err(e)) => {
            if status.state != RunningState::Error {
                status.state = RunningState::Error;
                status.error = Some(format!("{e:#}"));
            }
            error!(%workload, error = %format!("{e:#}"), "workload failed");
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            status.state = RunningState::Error;
            status.error = Some(message.clone());
            error!(%workload, error = %message, "workload panicked");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
