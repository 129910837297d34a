//! Serializable summary of one batch.

use serde::Serialize;
use uuid::Uuid;

use crate::executor::{FailurePolicy, Outcome};

/// Unique identifier for a batch, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one slot, in launch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotReport<V> {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<V>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<V> {
    pub batch_id: BatchId,
    pub policy: FailurePolicy,
    pub elapsed_ms: u64,
    pub slots: Vec<SlotReport<V>>,
}

impl<V> BatchReport<V> {
    pub fn from_outcomes(
        batch_id: BatchId,
        policy: FailurePolicy,
        elapsed_ms: u64,
        outcomes: Vec<Outcome<V>>,
    ) -> Self {
        let slots = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| match outcome {
                Ok(value) => SlotReport {
                    index,
                    value: Some(value),
                    error: None,
                },
                Err(err) => SlotReport {
                    index,
                    value: None,
                    error: Some(err.to_string()),
                },
            })
            .collect();
        Self {
            batch_id,
            policy,
            elapsed_ms,
            slots,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.slots.iter().filter(|s| s.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.slots.iter().filter(|s| s.error.is_some()).count()
    }

    /// Values of successful slots, still in launch order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.slots.iter().filter_map(|s| s.value.as_ref())
    }
}
