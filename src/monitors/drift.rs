use serde::{Deserialize, Serialize};

use crate::Slot;

/// Slots observed in one probe round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPair {
    pub scheduler_slot: Slot,
    pub node_slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftEvaluation {
    pub within_threshold: bool,
    /// `scheduler_slot - node_slot`; positive means the node is behind.
    /// Saturates at the `i64` bounds.
    pub drift: i64,
}

impl DriftEvaluation {
    pub fn evaluate(scheduler_slot: Slot, node_slot: Slot, threshold: u64) -> DriftEvaluation {
        // exact in i128 for any pair of u64 slots
        let exact = i128::from(scheduler_slot) - i128::from(node_slot);
        let within_threshold = exact <= i128::from(threshold);

        DriftEvaluation {
            within_threshold,
            drift: exact.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64,
        }
    }
}

impl SlotPair {
    pub fn evaluate(&self, threshold: u64) -> DriftEvaluation {
        DriftEvaluation::evaluate(self.scheduler_slot, self.node_slot, threshold)
    }
}
