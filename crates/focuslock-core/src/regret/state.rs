use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivationReason {
    /// A recurring or custom time window is open.
    TimeWindow,
    /// The countdown after a completed focus session.
    PostSession,
}

impl fmt::Display for ActivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationReason::TimeWindow => write!(f, "time window"),
            ActivationReason::PostSession => write!(f, "post-session"),
        }
    }
}

/// The protection currently in force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionState {
    pub window_id: String,
    pub message: String,
    pub reason: ActivationReason,
    pub started_at: DateTime<Utc>,
    /// Only post-session protection expires on its own.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acknowledged: bool,
    /// Whether the regret restriction set was actually applied.
    #[serde(default)]
    pub enforced: bool,
}

impl ProtectionState {
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|end| (end - now).max(Duration::zero()))
    }

    pub(crate) fn same_occurrence(&self, other: &ProtectionState) -> bool {
        self.window_id == other.window_id && self.started_at == other.started_at
    }
}
