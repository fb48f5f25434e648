//! reach.toml configuration parser.
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below. Durations are written as strings like `"100ms"`,
//! `"2s"` or `"1m"`.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachConfig {
    pub probe: ProbeSection,
    pub scheduler: SchedulerSection,
    pub guard: GuardSection,
    pub report: ReportSection,
    pub targets: TargetsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    /// Number of concurrent probe workers.
    pub workers: usize,
    pub speculative_timeout: String,
    pub awaited_timeout: String,
    /// Every Nth probe of a given target uses the awaited timeout.
    pub awaited_every: u64,
    /// Pause used when there is nothing to probe.
    pub idle_backoff: String,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            workers: 10,
            speculative_timeout: "100ms".to_string(),
            awaited_timeout: "2s".to_string(),
            awaited_every: 5,
            idle_backoff: "250ms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Added to every recent success fraction so no target starves.
    pub bias: f64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { bias: 0.1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSection {
    pub enabled: bool,
    /// Endpoint returning the caller's IP as plain text.
    pub lookup_url: String,
    pub lookup_timeout: String,
    /// Re-check the egress IP every this many drawn targets.
    pub check_every: u64,
    /// Trusted addresses in addition to the one observed at startup.
    pub allowed: Vec<String>,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            enabled: true,
            lookup_url: "https://icanhazip.com".to_string(),
            lookup_timeout: "5s".to_string(),
            check_every: 2000,
            allowed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Emit a report every this many recorded outcomes.
    pub every: u64,
    pub path: PathBuf,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            every: 50,
            path: PathBuf::from("result.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsSection {
    pub file: PathBuf,
}

impl Default for TargetsSection {
    fn default() -> Self {
        Self {
            file: PathBuf::from("urls.txt"),
        }
    }
}

impl ReachConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ReachConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the probe loop cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.probe.workers == 0 {
            bail!("probe.workers must be at least 1");
        }
        if self.probe.awaited_every == 0 {
            bail!("probe.awaited_every must be at least 1");
        }
        if !(self.scheduler.bias.is_finite() && self.scheduler.bias > 0.0) {
            bail!("scheduler.bias must be a positive number");
        }
        if self.guard.check_every == 0 {
            bail!("guard.check_every must be at least 1");
        }
        if self.report.every == 0 {
            bail!("report.every must be at least 1");
        }
        self.probe.speculative_timeout()?;
        self.probe.awaited_timeout()?;
        self.probe.idle_backoff()?;
        self.guard.lookup_timeout()?;
        self.guard.allowed_ips()?;
        Ok(())
    }
}

impl ProbeSection {
    pub fn speculative_timeout(&self) -> anyhow::Result<Duration> {
        duration_field("probe.speculative_timeout", &self.speculative_timeout)
    }

    pub fn awaited_timeout(&self) -> anyhow::Result<Duration> {
        duration_field("probe.awaited_timeout", &self.awaited_timeout)
    }

    pub fn idle_backoff(&self) -> anyhow::Result<Duration> {
        duration_field("probe.idle_backoff", &self.idle_backoff)
    }
}

impl GuardSection {
    pub fn lookup_timeout(&self) -> anyhow::Result<Duration> {
        duration_field("guard.lookup_timeout", &self.lookup_timeout)
    }

    pub fn allowed_ips(&self) -> anyhow::Result<Vec<IpAddr>> {
        self.allowed
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<IpAddr>()
                    .with_context(|| format!("guard.allowed: invalid IP address {raw:?}"))
            })
            .collect()
    }
}

fn duration_field(name: &str, value: &str) -> anyhow::Result<Duration> {
    parse_duration(value).with_context(|| format!("{name}: invalid duration {value:?}"))
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
