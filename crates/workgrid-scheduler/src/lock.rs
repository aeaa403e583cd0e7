//! Cluster-wide mutual exclusion for rebalance cycles.
//!
//! A successful `try_lock` hands back a [`LockToken`]. Only that token
//! unlocks, so a holder whose lease ran out cannot release the lock out
//! from under the member that took it next.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{SchedulerError, SchedulerResult};

/// Lock name shared by every scheduler in the cluster.
pub const SCHEDULER_LOCK_NAME: &str = "distributed-scheduler-lock";

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Identifies one acquisition of a [`DistributedLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(u64);

impl LockToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A lock every member of the cluster contends on.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    fn name(&self) -> &str;

    /// Try to take the lock, waiting at most `wait`. A `lease` bounds how
    /// long the lock stays held if the holder never unlocks; it is ignored
    /// unless [`supports_leases`](Self::supports_leases) is true.
    async fn try_lock(&self, wait: Duration, lease: Option<Duration>) -> SchedulerResult<Option<LockToken>>;

    /// Release the acquisition identified by `token`. Fails with
    /// [`SchedulerError::Lock`] when someone else holds the lock now.
    async fn unlock(&self, token: LockToken) -> SchedulerResult<()>;

    async fn is_locked(&self) -> bool;

    fn supports_leases(&self) -> bool;
}

#[derive(Debug)]
struct Held {
    token: LockToken,
    expires: Option<Instant>,
}

impl Held {
    fn is_live(&self) -> bool {
        self.expires.is_none_or(|at| Instant::now() < at)
    }
}

/// In-process lock shared by simulated members. Supports leases.
#[derive(Debug)]
pub struct LocalLock {
    name: String,
    held: Mutex<Option<Held>>,
    next_token: AtomicU64,
}

impl LocalLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            held: Mutex::new(None),
            next_token: AtomicU64::new(1),
        }
    }

    fn held(&self) -> MutexGuard<'_, Option<Held>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, lease: Option<Duration>) -> Option<LockToken> {
        let mut held = self.held();
        if held.as_ref().is_some_and(Held::is_live) {
            return None;
        }
        let token = LockToken::new(self.next_token.fetch_add(1, Ordering::Relaxed));
        *held = Some(Held {
            token,
            expires: lease.map(|l| Instant::now() + l),
        });
        Some(token)
    }
}

impl Default for LocalLock {
    fn default() -> Self {
        Self::new(SCHEDULER_LOCK_NAME)
    }
}

#[async_trait]
impl DistributedLock for LocalLock {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_lock(&self, wait: Duration, lease: Option<Duration>) -> SchedulerResult<Option<LockToken>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(token) = self.acquire(lease) {
                debug!(lock = %self.name, ?token, "lock acquired");
                return Ok(Some(token));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RETRY_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn unlock(&self, token: LockToken) -> SchedulerResult<()> {
        let mut held = self.held();
        match held.as_ref() {
            Some(current) if current.token == token => {
                *held = None;
                debug!(lock = %self.name, ?token, "lock released");
                Ok(())
            }
            Some(current) => Err(SchedulerError::Lock(format!(
                "{} was re-acquired as {:?} after {:?} expired",
                self.name, current.token, token
            ))),
            None => Ok(()),
        }
    }

    async fn is_locked(&self) -> bool {
        self.held().as_ref().is_some_and(Held::is_live)
    }

    fn supports_leases(&self) -> bool {
        true
    }
}

/// Releases a held lock when dropped, including when the owning future
/// is cancelled. Prefer [`release`](Self::release) on the normal path so
/// unlock errors are observed.
pub struct LockGuard {
    held: Option<(Arc<dyn DistributedLock>, LockToken)>,
}

impl LockGuard {
    /// Wrap an acquisition returned by [`DistributedLock::try_lock`].
    pub fn new(lock: Arc<dyn DistributedLock>, token: LockToken) -> Self {
        Self {
            held: Some((lock, token)),
        }
    }

    pub async fn release(mut self) {
        if let Some((lock, token)) = self.held.take() {
            if let Err(e) = lock.unlock(token).await {
                warn!(lock = %lock.name(), error = %e, "failed to release lock");
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some((lock, token)) = self.held.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.unlock(token).await {
                        warn!(lock = %lock.name(), error = %e, "failed to release lock");
                    }
                });
            }
            Err(_) => warn!(lock = %lock.name(), "lock guard dropped outside a runtime, lock not released"),
        }
    }
}
