//! BackoffRetrier - drives probe rounds for one (process, node) pair
//!
//! ## State Machine
//!
//! ```text
//! Probing ──within threshold──────────────→ Healthy (no alert)
//!    │
//!    ├──drift > threshold──→ Escalating ─┐
//!    │                                   ├─ budget left → sleep 2^(attempt-1) → Probing
//!    └──probe error────────→ Failing ────┘
//!                                        └─ budget exhausted → Alerted
//! ```
//!
//! A success on any attempt short-circuits the remaining budget. Every attempt
//! that does not succeed counts as a consecutive failure, so a pair ends in
//! exactly one of: no alert, one alert, or cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::{
    config::MonitoredProcess,
    error::ProbeError,
    messages::{Alert, AttemptEvent, AttemptStatus, PairOutcome},
};

use super::{
    drift::{DriftEvaluation, SlotPair},
    prober::SlotProber,
};

/// Delay between attempts
///
/// Injected so tests can record delays instead of waiting them out.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt budget, threshold and backoff timing for every pair of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub latency_threshold: u64,
    /// Delay after the first failed attempt; doubled for every further attempt
    pub backoff_base: Duration,
    /// Upper bound for a single delay
    pub backoff_cap: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            latency_threshold: 5,
            backoff_base: Duration::from_secs(1),
            backoff_cap: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, latency_threshold: u64) -> Self {
        Self {
            max_retries,
            latency_threshold,
            ..Default::default()
        }
    }

    /// Delay applied after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let delay = self.backoff_base.saturating_mul(factor);

        match self.backoff_cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Per-pair counters, discarded once the pair resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub consecutive_failures: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self {
            attempt: 1,
            consecutive_failures: 0,
        }
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    fn advance(&mut self) {
        self.attempt += 1;
    }
}

/// Result of one probe round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success {
        slots: SlotPair,
        evaluation: DriftEvaluation,
    },
    ThresholdBreach {
        slots: SlotPair,
        evaluation: DriftEvaluation,
    },
    ProbeFailure(ProbeError),
}

impl AttemptOutcome {
    fn status(&self) -> AttemptStatus {
        match self {
            AttemptOutcome::Success { evaluation, .. } => AttemptStatus::WithinThreshold {
                drift: evaluation.drift,
            },
            AttemptOutcome::ThresholdBreach { evaluation, .. } => AttemptStatus::ThresholdBreach {
                drift: evaluation.drift,
            },
            AttemptOutcome::ProbeFailure(err) => AttemptStatus::ProbeFailure {
                error: err.to_string(),
            },
        }
    }
}

/// Drives attempts for one (process, node) pair at a time
///
/// Cheap to clone; all clones share the prober, sleeper and event channel.
#[derive(Clone)]
pub struct BackoffRetrier {
    prober: Arc<dyn SlotProber>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    event_tx: Option<broadcast::Sender<AttemptEvent>>,
}

impl BackoffRetrier {
    pub fn new(prober: Arc<dyn SlotProber>, policy: RetryPolicy) -> Self {
        Self {
            prober,
            sleeper: Arc::new(TokioSleeper),
            policy,
            event_tx: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Publish an [`AttemptEvent`] for every attempt
    pub fn with_events(mut self, event_tx: broadcast::Sender<AttemptEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Evaluate one pair until it is healthy, alerted or cancelled
    ///
    /// Never fails: probe errors are retried and only surface inside an alert.
    #[instrument(skip_all, fields(process = %process.id, node = %node))]
    pub async fn evaluate(
        &self,
        process: &MonitoredProcess,
        node: &str,
        cancel: &CancellationToken,
    ) -> PairOutcome {
        let max_retries = self.policy.max_retries;
        let mut state = RetryState::new();

        loop {
            if cancel.is_cancelled() {
                debug!("cancelled before attempt {}", state.attempt);
                return PairOutcome::Cancelled;
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("cancelled during attempt {}", state.attempt);
                    return PairOutcome::Cancelled;
                }
                outcome = self.attempt(&process.id, node) => outcome,
            };

            self.publish(process, node, &state, &outcome);

            match outcome {
                AttemptOutcome::Success { evaluation, .. } => {
                    debug!(
                        "drift {} within threshold on attempt {}/{max_retries}",
                        evaluation.drift, state.attempt
                    );
                    return PairOutcome::Healthy;
                }
                AttemptOutcome::ThresholdBreach { slots, evaluation } => {
                    state.record_failure();
                    warn!(
                        "drift {} exceeds threshold {} on attempt {}/{max_retries}",
                        evaluation.drift, self.policy.latency_threshold, state.attempt
                    );
                    if state.consecutive_failures >= max_retries {
                        let alert =
                            Alert::lagging(process, node, slots, evaluation, state.attempt);
                        return PairOutcome::Alerted(alert);
                    }
                }
                AttemptOutcome::ProbeFailure(err) => {
                    state.record_failure();
                    warn!("probe failed on attempt {}/{max_retries}: {err}", state.attempt);
                    if state.attempt >= max_retries {
                        let alert = Alert::unreachable(process, node, state.attempt, &err);
                        return PairOutcome::Alerted(alert);
                    }
                }
            }

            let delay = self.policy.delay_after(state.attempt);
            trace!("backing off for {delay:?}");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("cancelled during backoff after attempt {}", state.attempt);
                    return PairOutcome::Cancelled;
                }
                _ = self.sleeper.sleep(delay) => {}
            }

            state.advance();
        }
    }

    /// One probe round: scheduler slot, then node slot, then drift
    async fn attempt(&self, process_id: &str, node: &str) -> AttemptOutcome {
        let scheduler_slot = match self.prober.scheduler_slot(process_id).await {
            Ok(slot) => slot,
            Err(err) => return AttemptOutcome::ProbeFailure(err),
        };

        let node_slot = match self.prober.node_slot(process_id, node).await {
            Ok(slot) => slot,
            Err(err) => return AttemptOutcome::ProbeFailure(err),
        };

        let slots = SlotPair {
            scheduler_slot,
            node_slot,
        };
        let evaluation = slots.evaluate(self.policy.latency_threshold);

        if evaluation.within_threshold {
            AttemptOutcome::Success { slots, evaluation }
        } else {
            AttemptOutcome::ThresholdBreach { slots, evaluation }
        }
    }

    fn publish(
        &self,
        process: &MonitoredProcess,
        node: &str,
        state: &RetryState,
        outcome: &AttemptOutcome,
    ) {
        let Some(event_tx) = &self.event_tx else {
            return;
        };

        let event = AttemptEvent {
            process_id: process.id.clone(),
            node: node.to_string(),
            attempt: state.attempt,
            max_retries: self.policy.max_retries,
            status: outcome.status(),
            timestamp: Utc::now(),
        };

        // no subscribers is fine
        if event_tx.send(event).is_err() {
            trace!("no receivers for attempt event");
        }
    }
}
