//! ScanOrchestrator - evaluates every (process, node) pair of the registry
//!
//! ## Flow
//!
//! ```text
//! registry → for each process → for each node → BackoffRetrier → PairOutcome
//!                                                                    │
//!                            ScanResult (alerts in registry order) ←─┘
//! ```
//!
//! Pairs run as tasks bounded by a semaphore. With the default concurrency of 1
//! they run strictly one after another in registry order. A panic inside one
//! pair is caught and counted; it never discards alerts of other pairs.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

use crate::{
    config::MonitoredProcess,
    messages::{AttemptEvent, PairOutcome, ScanResult},
};

use super::{
    prober::SlotProber,
    retry::{BackoffRetrier, RetryPolicy, Sleeper},
};

/// Terminal state of a pair task, including unexpected failures
enum PairResult {
    Finished(PairOutcome),
    Panicked(String),
}

#[derive(Clone)]
pub struct ScanOrchestrator {
    retrier: BackoffRetrier,
    concurrency: usize,
}

impl ScanOrchestrator {
    pub fn new(prober: Arc<dyn SlotProber>, policy: RetryPolicy) -> Self {
        Self {
            retrier: BackoffRetrier::new(prober, policy),
            concurrency: 1,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retrier = self.retrier.with_sleeper(sleeper);
        self
    }

    /// Evaluate up to `concurrency` pairs at the same time
    ///
    /// Clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn with_events(mut self, event_tx: broadcast::Sender<AttemptEvent>) -> Self {
        self.retrier = self.retrier.with_events(event_tx);
        self
    }

    /// Run one complete scan
    pub async fn scan(&self, processes: &[MonitoredProcess]) -> ScanResult {
        self.scan_with_cancel(processes, &CancellationToken::new())
            .await
    }

    /// Run one complete scan, stopping pending pairs once `cancel` fires
    ///
    /// Alerts raised before cancellation are kept.
    #[instrument(skip_all, fields(processes = processes.len()))]
    pub async fn scan_with_cancel(
        &self,
        processes: &[MonitoredProcess],
        cancel: &CancellationToken,
    ) -> ScanResult {
        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut pairs: Vec<(String, String)> = Vec::new();

        debug!(
            "starting scan with max_retries {} and threshold {}",
            self.retrier.policy().max_retries,
            self.retrier.policy().latency_threshold
        );

        for process in processes {
            for node in &process.nodes {
                let index = pairs.len();
                pairs.push((process.id.clone(), node.clone()));

                // acquiring before spawning keeps registry order when concurrency is 1
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("worker pool closed: {e}");
                        break;
                    }
                };

                let retrier = self.retrier.clone();
                let process = process.clone();
                let node = node.clone();
                let cancel = cancel.clone();

                tasks.spawn(
                    async move {
                        let evaluation =
                            AssertUnwindSafe(retrier.evaluate(&process, &node, &cancel))
                                .catch_unwind()
                                .await;
                        drop(permit);

                        let result = match evaluation {
                            Ok(outcome) => PairResult::Finished(outcome),
                            Err(panic) => PairResult::Panicked(panic_message(panic.as_ref())),
                        };
                        (index, result)
                    }
                    .instrument(Span::current()),
                );
            }
        }

        let mut results: Vec<Option<PairResult>> = pairs.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("pair task did not complete: {e}"),
            }
        }

        let mut scan = ScanResult {
            alerts: Vec::new(),
            pairs_evaluated: 0,
            pairs_cancelled: 0,
            pairs_failed: 0,
            started_at,
            finished_at: started_at,
        };

        for ((process_id, node), result) in pairs.iter().zip(results) {
            match result {
                Some(PairResult::Finished(PairOutcome::Healthy)) => scan.pairs_evaluated += 1,
                Some(PairResult::Finished(PairOutcome::Alerted(alert))) => {
                    scan.pairs_evaluated += 1;
                    scan.alerts.push(alert);
                }
                Some(PairResult::Finished(PairOutcome::Cancelled)) => scan.pairs_cancelled += 1,
                Some(PairResult::Panicked(message)) => {
                    error!("evaluation of {process_id} on {node} failed: {message}");
                    scan.pairs_failed += 1;
                }
                None => {
                    warn!("no result for {process_id} on {node}");
                    scan.pairs_failed += 1;
                }
            }
        }

        scan.finished_at = Utc::now();
        info!(
            "scan finished: {} pairs evaluated, {} alerts, {} cancelled, {} failed",
            scan.pairs_evaluated,
            scan.alerts.len(),
            scan.pairs_cancelled,
            scan.pairs_failed
        );

        scan
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
