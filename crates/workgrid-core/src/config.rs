//! workgrid.toml configuration.
//!
//! Durations are written as human strings (`"250ms"`, `"30s"`, `"3m"`,
//! `"1h"`); a bare number is read as seconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::Workload;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkgridConfig {
    pub scheduler: SchedulerConfig,
    pub dispatch: DispatchConfig,
    pub lifecycle: LifecycleConfig,
    pub inventory: InventoryConfig,
    pub workloads: Vec<WorkloadSpec>,
}

/// Orchestration loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum time between two successful rebalance cycles cluster-wide.
    #[serde(with = "duration_str")]
    pub rebalance_interval: Duration,
    /// Delay before the first periodic poll after startup.
    #[serde(with = "duration_str")]
    pub rebalance_poll_delay: Duration,
    /// How often each node checks whether a rebalance is due.
    #[serde(with = "duration_str")]
    pub rebalance_poll_interval: Duration,
    /// Lease requested from lock providers that support one.
    #[serde(with = "duration_str")]
    pub lock_lease: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rebalance_interval: Duration::from_secs(180),
            rebalance_poll_delay: Duration::from_secs(30),
            rebalance_poll_interval: Duration::from_secs(30),
            lock_lease: Duration::from_secs(600),
        }
    }
}

/// Instruction fan-out settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deadline for collecting responses from one batch of instructions.
    #[serde(with = "duration_str")]
    pub poll_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(120),
        }
    }
}

/// Node-local stop/restart settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long a graceful stop may take before forced termination.
    #[serde(with = "duration_str")]
    pub stop_timeout: Duration,
    /// How often a stopping context is checked.
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Inventory caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    #[serde(with = "duration_str")]
    pub cache_ttl: Duration,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// A workload declared directly in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub params: Option<toml::Value>,
}

impl WorkloadSpec {
    pub fn to_workload(&self) -> CoreResult<Workload> {
        if self.id.trim().is_empty() || self.kind.trim().is_empty() {
            return Err(CoreError::InvalidId(format!(
                "workload kind and id must be non-empty (kind={:?}, id={:?})",
                self.kind, self.id
            )));
        }
        let mut workload = Workload::new(self.kind.clone(), self.id.clone());
        if let Some(params) = &self.params {
            let json = serde_json::to_value(params)
                .map_err(|e| CoreError::InvalidId(format!("{}: params: {e}", self.id)))?;
            workload = workload.with_params(json);
        }
        Ok(workload)
    }
}

impl WorkgridConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> CoreResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Every declared workload, validated.
    pub fn workloads(&self) -> CoreResult<Vec<Workload>> {
        self.workloads.iter().map(WorkloadSpec::to_workload).collect()
    }
}

/// Parse a duration string like `"250ms"`, `"30s"`, `"3m"` or `"1h"`.
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let invalid = || CoreError::InvalidDuration(s.to_string());

    let (digits, millis_per_unit) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    let millis = value.checked_mul(millis_per_unit).ok_or_else(invalid)?;
    Ok(Duration::from_millis(millis))
}

fn format_duration(d: &Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{ms}ms")
    } else if ms % 3_600_000 == 0 && ms > 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 && ms > 0 {
        format!("{}m", ms / 60_000)
    } else {
        format!("{}s", ms / 1000)
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("3m").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 45 ").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn format_duration_picks_largest_whole_unit() {
        assert_eq!(format_duration(&Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(&Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(&Duration::from_secs(180)), "3m");
        assert_eq!(format_duration(&Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(&Duration::ZERO), "0s");
    }

    #[test]
    fn defaults_when_empty() {
        let config = WorkgridConfig::parse("").unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.lifecycle.poll_interval, Duration::from_millis(250));
        assert_eq!(config.dispatch.poll_timeout, Duration::from_secs(120));
        assert_eq!(config.inventory.cache_ttl, Duration::from_secs(60));
        assert!(config.workloads.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[scheduler]
rebalance_interval = "1m"
rebalance_poll_delay = "5s"
rebalance_poll_interval = "10s"

[dispatch]
poll_timeout = "15s"

[lifecycle]
stop_timeout = "20s"
poll_interval = "100ms"

[[workloads]]
kind = "ticker"
id = "a"

[[workloads]]
kind = "ticker"
id = "b"
params = { period = "2s" }
"#;
        let config = WorkgridConfig::parse(toml_str).unwrap();
        assert_eq!(config.scheduler.rebalance_interval, Duration::from_secs(60));
        assert_eq!(config.scheduler.lock_lease, Duration::from_secs(600));
        assert_eq!(config.dispatch.poll_timeout, Duration::from_secs(15));
        assert_eq!(config.lifecycle.poll_interval, Duration::from_millis(100));

        let workloads = config.workloads().unwrap();
        assert_eq!(workloads.len(), 2);
        assert_eq!(workloads[1].urn(), "urn:workload:ticker:b");
        assert_eq!(workloads[1].params()["period"], "2s");
    }

    #[test]
    fn empty_workload_id_is_rejected() {
        let spec = WorkloadSpec {
            kind: "ticker".to_string(),
            id: " ".to_string(),
            params: None,
        };
        assert!(matches!(spec.to_workload(), Err(CoreError::InvalidId(_))));
    }

    #[test]
    fn section_round_trips_through_toml() {
        let scheduler = SchedulerConfig::default();
        let text = toml::to_string(&scheduler).unwrap();
        assert!(text.contains("rebalance_interval = \"3m\""));
        let back: SchedulerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, scheduler);
    }
}
