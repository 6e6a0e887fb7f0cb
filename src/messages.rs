//! Values produced by a scan
//!
//! 1. **Alerts**: one per (process, node) pair that stayed behind or unreachable
//! 2. **Attempt events**: broadcast after every probe round for live visibility
//! 3. **Scan results**: alerts plus counters, returned to the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Slot,
    config::MonitoredProcess,
    error::ProbeError,
    monitors::drift::{DriftEvaluation, SlotPair},
};

/// Why an alert was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertReason {
    /// Drift stayed above the threshold for the whole attempt budget
    Lagging {
        drift: i64,
        node_slot: Slot,
        scheduler_slot: Slot,
        attempts: u32,
    },

    /// The final attempt of the budget could not obtain both slots
    Unreachable { attempts: u32, error: String },
}

/// A node confirmed behind (or unreachable) for one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub process_id: String,
    pub kind: String,
    pub node: String,
    pub message: String,
    pub reason: AlertReason,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn lagging(
        process: &MonitoredProcess,
        node: &str,
        slots: SlotPair,
        evaluation: DriftEvaluation,
        attempts: u32,
    ) -> Self {
        let message = format!(
            "process {} ({}) on node {node} is {} slots behind the scheduler (node slot {}, scheduler slot {})",
            process.id, process.kind, evaluation.drift, slots.node_slot, slots.scheduler_slot
        );

        Self {
            process_id: process.id.clone(),
            kind: process.kind.clone(),
            node: node.to_string(),
            message,
            reason: AlertReason::Lagging {
                drift: evaluation.drift,
                node_slot: slots.node_slot,
                scheduler_slot: slots.scheduler_slot,
                attempts,
            },
            raised_at: Utc::now(),
        }
    }

    pub fn unreachable(
        process: &MonitoredProcess,
        node: &str,
        attempts: u32,
        error: &ProbeError,
    ) -> Self {
        let message = format!(
            "process {} ({}) on node {node} failed after {attempts} attempts: {error}",
            process.id, process.kind
        );

        Self {
            process_id: process.id.clone(),
            kind: process.kind.clone(),
            node: node.to_string(),
            message,
            reason: AlertReason::Unreachable {
                attempts,
                error: error.to_string(),
            },
            raised_at: Utc::now(),
        }
    }
}

/// Outcome of a single probe round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    WithinThreshold { drift: i64 },
    ThresholdBreach { drift: i64 },
    ProbeFailure { error: String },
}

/// Published after every attempt of every pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptEvent {
    pub process_id: String,
    pub node: String,
    pub attempt: u32,
    pub max_retries: u32,
    pub status: AttemptStatus,
    pub timestamp: DateTime<Utc>,
}

/// Terminal state of one (process, node) evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Healthy,
    Alerted(Alert),
    Cancelled,
}

/// Everything a scan produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Alerts in registry order (process order, then node order)
    pub alerts: Vec<Alert>,

    /// Pairs that ran to completion (healthy or alerted)
    pub pairs_evaluated: usize,

    /// Pairs stopped by cancellation before reaching a verdict
    pub pairs_cancelled: usize,

    /// Pairs whose evaluation failed unexpectedly
    pub pairs_failed: usize,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }

    /// True when every pair reached a verdict
    pub fn is_complete(&self) -> bool {
        self.pairs_cancelled == 0 && self.pairs_failed == 0
    }
}
