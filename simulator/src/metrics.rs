use holdem_client::ActionError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionMetricsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub unavailable: u64,
    pub invalid: u64,
}

/// Outcome counters for actions submitted through the API.
#[derive(Default)]
pub struct ActionMetrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
    invalid: AtomicU64,
}

impl ActionMetrics {
    pub fn record<T>(&self, result: &Result<T, ActionError>) {
        let counter = match result {
            Ok(_) => &self.accepted,
            Err(ActionError::Rejected { .. }) => &self.rejected,
            Err(ActionError::Unavailable { .. }) => &self.unavailable,
            Err(ActionError::Validation { .. } | ActionError::InvalidResponse { .. }) => {
                &self.invalid
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ActionMetricsSnapshot {
        ActionMetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
        }
    }
}
