//! Slot-drift monitoring core
//!
//! - **prober**: raw scheduler / node slot lookups
//! - **drift**: drift computation against a threshold
//! - **retry**: per-pair retry state machine with exponential backoff
//! - **scan**: registry-wide orchestration and alert aggregation

pub mod drift;
pub mod prober;
pub mod retry;
pub mod scan;
