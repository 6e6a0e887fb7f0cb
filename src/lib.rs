pub mod alerts;
pub mod config;
pub mod discord;
pub mod error;
pub mod messages;
pub mod monitors;
pub mod util;

/// Progress counter of a distributed compute process
pub type Slot = u64;

pub use config::MonitoredProcess;
pub use error::{ProbeError, ProbeErrorKind, ProbeResult};
pub use messages::{Alert, AlertReason, AttemptEvent, AttemptStatus, PairOutcome, ScanResult};
pub use monitors::{
    drift::{DriftEvaluation, SlotPair},
    prober::{HttpSlotProber, SlotProber},
    retry::{AttemptOutcome, BackoffRetrier, RetryPolicy, RetryState, Sleeper, TokioSleeper},
    scan::ScanOrchestrator,
};
