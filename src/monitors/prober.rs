//! Slot probes against the scheduler and node replicas
//!
//! ## Endpoints
//!
//! ```text
//! scheduler: GET {scheduler_url}/{process_id}~process@1.0/slot/current
//! node:      GET {node_url}/{process_id}~process@1.0/compute/at-slot
//! ```
//!
//! Both answer with the slot as a plain-text integer. A prober performs exactly
//! one request per call; retrying is the retrier's job.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::trace;

use crate::Slot;
use crate::error::{ProbeError, ProbeResult};
use crate::util::join_url;

/// Source of scheduler and node slots
///
/// Implementations must be `Send + Sync`, a single prober is shared by every
/// pair of a scan.
#[async_trait]
pub trait SlotProber: Send + Sync {
    /// Canonical current slot of `process_id` according to the scheduler
    async fn scheduler_slot(&self, process_id: &str) -> ProbeResult<Slot>;

    /// Last slot `node` computed for `process_id`
    async fn node_slot(&self, process_id: &str, node: &str) -> ProbeResult<Slot>;
}

pub fn scheduler_slot_url(scheduler_url: &str, process_id: &str) -> String {
    join_url(scheduler_url, &format!("{process_id}~process@1.0/slot/current"))
}

pub fn node_slot_url(node: &str, process_id: &str) -> String {
    join_url(node, &format!("{process_id}~process@1.0/compute/at-slot"))
}

/// Parse a plain-text slot body
///
/// Surrounding whitespace is ignored. Negative numbers and values that do not
/// fit into an `i64` are rejected so drift is always representable.
pub fn parse_slot(body: &str) -> ProbeResult<Slot> {
    let trimmed = body.trim();
    let slot: Slot = trimmed
        .parse()
        .map_err(|e| ProbeError::parse(format!("invalid slot {trimmed:?}: {e}")))?;

    if slot > i64::MAX as Slot {
        return Err(ProbeError::parse(format!("slot {slot} out of range")));
    }

    Ok(slot)
}

/// HTTP implementation of [`SlotProber`]
#[derive(Debug, Clone)]
pub struct HttpSlotProber {
    /// HTTP client (reused across requests)
    client: reqwest::Client,

    scheduler_url: String,
}

impl HttpSlotProber {
    pub fn new(scheduler_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            scheduler_url: scheduler_url.into(),
        })
    }

    async fn fetch_slot(&self, url: &str) -> ProbeResult<Slot> {
        trace!("requesting slot from {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::network(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::status(status.as_u16(), url));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::network(format!("failed to read body from {url}: {e}")))?;

        parse_slot(&body)
    }
}

#[async_trait]
impl SlotProber for HttpSlotProber {
    async fn scheduler_slot(&self, process_id: &str) -> ProbeResult<Slot> {
        self.fetch_slot(&scheduler_slot_url(&self.scheduler_url, process_id))
            .await
    }

    async fn node_slot(&self, process_id: &str, node: &str) -> ProbeResult<Slot> {
        self.fetch_slot(&node_slot_url(node, process_id)).await
    }
}
