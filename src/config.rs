use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Url;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::monitors::retry::RetryPolicy;

/// One distributed compute process and the node replicas serving it
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MonitoredProcess {
    pub id: String,
    pub kind: String,
    /// Node base URLs, probed in the listed order
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub scheduler_url: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Largest tolerated `scheduler_slot - node_slot`
    #[serde(default = "default_latency_threshold")]
    pub latency_threshold: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Number of (process, node) pairs evaluated at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    pub backoff_cap_secs: Option<u64>,

    #[serde(default)]
    pub processes: Vec<MonitoredProcess>,

    #[serde(default)]
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

/// Validated configuration, ready to drive a scan
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub scheduler_url: String,
    pub policy: RetryPolicy,
    pub timeout: Duration,
    pub concurrency: usize,
    pub processes: Vec<MonitoredProcess>,
    pub alerts: Vec<Alert>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_latency_threshold() -> u64 {
    5
}

fn default_timeout() -> u64 {
    10
}

fn default_concurrency() -> usize {
    1
}

fn default_backoff_base_secs() -> u64 {
    1
}

impl Config {
    /// Validate the raw configuration
    pub fn resolve(self) -> anyhow::Result<ResolvedConfig> {
        Url::parse(&self.scheduler_url)
            .with_context(|| format!("invalid scheduler_url '{}'", self.scheduler_url))?;

        if self.max_retries == 0 {
            bail!("max_retries must be greater than 0");
        }
        if self.timeout == 0 {
            bail!("timeout must be greater than 0");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be greater than 0");
        }
        if self.concurrency > Semaphore::MAX_PERMITS {
            bail!(
                "concurrency {} exceeds the maximum of {}",
                self.concurrency,
                Semaphore::MAX_PERMITS
            );
        }
        if self.backoff_base_secs == 0 {
            bail!("backoff_base_secs must be greater than 0");
        }
        if let Some(cap) = self.backoff_cap_secs
            && cap < self.backoff_base_secs
        {
            bail!("backoff_cap_secs ({cap}) must not be below backoff_base_secs");
        }

        for process in &self.processes {
            if process.id.trim().is_empty() {
                bail!("process ids must not be empty");
            }
            for node in &process.nodes {
                Url::parse(node).with_context(|| {
                    format!("invalid node url '{node}' for process {}", process.id)
                })?;
            }
        }

        let policy = RetryPolicy {
            max_retries: self.max_retries,
            latency_threshold: self.latency_threshold,
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            backoff_cap: self.backoff_cap_secs.map(Duration::from_secs),
        };

        Ok(ResolvedConfig {
            scheduler_url: self.scheduler_url,
            policy,
            timeout: Duration::from_secs(self.timeout),
            concurrency: self.concurrency,
            processes: self.processes,
            alerts: self.alerts,
        })
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .context("Invalid configuration file provided!")
        .inspect(|config| trace!("loaded config: {config:?}"))
}
