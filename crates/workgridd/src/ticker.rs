//! Demo workload: logs a tick every `period`.
//!
//! Params (all optional):
//! - `period`: duration string, default `"5s"`
//! - `fail_after`: number of ticks after which the run returns an error,
//!   which puts the workload into ERROR so the scheduler restarts it

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};

use workgrid_core::{Workload, parse_duration};
use workgrid_lifecycle::{CancelSignal, FnContextFactory, WorkloadContextFactory, WorkloadRunnable};

pub const TICKER_KIND: &str = "ticker";

const DEFAULT_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    period: Duration,
    fail_after: Option<u64>,
}

impl Ticker {
    pub fn from_workload(workload: &Workload) -> anyhow::Result<Self> {
        let params = workload.params();

        let period = match params.get("period") {
            None => DEFAULT_PERIOD,
            Some(v) => {
                let raw = v
                    .as_str()
                    .with_context(|| format!("{workload}: period must be a string"))?;
                parse_duration(raw).with_context(|| format!("{workload}: bad period"))?
            }
        };
        if period.is_zero() {
            anyhow::bail!("{workload}: period must be positive");
        }

        let fail_after = match params.get("fail_after") {
            None => None,
            Some(v) => Some(
                v.as_u64()
                    .with_context(|| format!("{workload}: fail_after must be a positive integer"))?,
            ),
        };

        Ok(Self { period, fail_after })
    }
}

#[async_trait]
impl WorkloadRunnable for Ticker {
    async fn run(&self, workload: &Workload, mut cancel: CancelSignal) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.period);
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    ticks += 1;
                    debug!(%workload, ticks, "tick");
                    if self.fail_after.is_some_and(|limit| ticks >= limit) {
                        anyhow::bail!("gave up after {ticks} ticks");
                    }
                }
                _ = cancel.cancelled() => {
                    info!(%workload, ticks, "ticker stopped");
                    return Ok(());
                }
            }
        }
    }
}

pub fn factory() -> Arc<dyn WorkloadContextFactory> {
    Arc::new(FnContextFactory::new(TICKER_KIND, |workload: &Workload| {
        Ok(Arc::new(Ticker::from_workload(workload)?) as Arc<dyn WorkloadRunnable>)
    }))
}
