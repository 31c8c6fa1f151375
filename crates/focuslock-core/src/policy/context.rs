use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named, isolated reason for applying restrictions.
///
/// The set is closed: each variant owns exactly one slot in the
/// [`BlockPolicyStore`](super::BlockPolicyStore) and one named scope in the
/// OS restriction capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockingContext {
    /// A manually started focus timer.
    Timer,
    /// A recurring schedule, applied by the monitor process.
    Schedule,
    /// An auto-activated regret prevention window.
    RegretPrevention,
    /// A committed (hard mode) session.
    Commitment,
    /// Restrictions requested by an accountability partner.
    Accountability,
}

impl BlockingContext {
    pub const ALL: [BlockingContext; 5] = [
        BlockingContext::Timer,
        BlockingContext::Schedule,
        BlockingContext::RegretPrevention,
        BlockingContext::Commitment,
        BlockingContext::Accountability,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockingContext::Timer => "timer",
            BlockingContext::Schedule => "schedule",
            BlockingContext::RegretPrevention => "regretPrevention",
            BlockingContext::Commitment => "commitment",
            BlockingContext::Accountability => "accountability",
        }
    }

    /// Name of the OS-managed restriction scope owned by this context.
    pub fn scope_name(self) -> String {
        format!("focuslock.{}", self.as_str())
    }
}

impl fmt::Display for BlockingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockingContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "timer" => Ok(BlockingContext::Timer),
            "schedule" => Ok(BlockingContext::Schedule),
            "regretprevention" | "regret" => Ok(BlockingContext::RegretPrevention),
            "commitment" | "hardmode" => Ok(BlockingContext::Commitment),
            "accountability" => Ok(BlockingContext::Accountability),
            other => Err(format!("unknown blocking context: {other}")),
        }
    }
}
