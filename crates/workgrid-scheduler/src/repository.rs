//! Workload inventory: sources, aggregation and caching.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use workgrid_core::Workload;

/// Something that knows which workloads should exist.
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    fn name(&self) -> &str;

    async fn workloads(&self) -> anyhow::Result<HashSet<Workload>>;
}

/// The inventory the scheduler balances.
#[async_trait]
pub trait WorkloadRepository: Send + Sync {
    async fn workloads(&self) -> HashSet<Workload>;

    async fn lookup(&self, urn: &str) -> Option<Workload> {
        self.workloads().await.into_iter().find(|w| w.urn() == urn)
    }
}

/// A fixed set of workloads, typically from the config file.
#[derive(Debug, Clone)]
pub struct StaticWorkloadSource {
    name: String,
    workloads: HashSet<Workload>,
}

impl StaticWorkloadSource {
    pub fn new(name: impl Into<String>, workloads: impl IntoIterator<Item = Workload>) -> Self {
        Self {
            name: name.into(),
            workloads: workloads.into_iter().collect(),
        }
    }
}

#[async_trait]
impl WorkloadSource for StaticWorkloadSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn workloads(&self) -> anyhow::Result<HashSet<Workload>> {
        Ok(self.workloads.clone())
    }
}

/// Union of every source. A failing source is logged and skipped.
#[derive(Clone, Default)]
pub struct SimpleWorkloadRepository {
    sources: Vec<Arc<dyn WorkloadSource>>,
}

impl SimpleWorkloadRepository {
    pub fn new(sources: Vec<Arc<dyn WorkloadSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl WorkloadRepository for SimpleWorkloadRepository {
    async fn workloads(&self) -> HashSet<Workload> {
        let mut all = HashSet::new();
        for source in &self.sources {
            match source.workloads().await {
                Ok(workloads) => {
                    debug!(source = source.name(), count = workloads.len(), "workloads loaded");
                    all.extend(workloads);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %format!("{e:#}"), "workload source failed");
                }
            }
        }
        all
    }
}

/// Remembers the inner repository's answer for `ttl`.
pub struct CachingWorkloadRepository<R> {
    inner: R,
    ttl: Duration,
    cache: Mutex<Option<(Instant, HashSet<Workload>)>>,
}

impl<R: WorkloadRepository> CachingWorkloadRepository<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }
}

#[async_trait]
impl<R: WorkloadRepository> WorkloadRepository for CachingWorkloadRepository<R> {
    async fn workloads(&self) -> HashSet<Workload> {
        let mut cache = self.cache.lock().await;
        if let Some((loaded_at, workloads)) = cache.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return workloads.clone();
            }
        }

        let workloads = self.inner.workloads().await;
        *cache = Some((Instant::now(), workloads.clone()));
        workloads
    }
}
