use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum focused time before an emergency exit can be bought.
///
/// Ordered from most to least lenient; `Never` means no exit at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommitmentTier {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "60m")]
    OneHour,
    #[serde(rename = "never")]
    Never,
}

impl CommitmentTier {
    pub const ALL: [CommitmentTier; 6] = [
        CommitmentTier::FiveMinutes,
        CommitmentTier::TenMinutes,
        CommitmentTier::FifteenMinutes,
        CommitmentTier::ThirtyMinutes,
        CommitmentTier::OneHour,
        CommitmentTier::Never,
    ];

    /// `None` for [`CommitmentTier::Never`].
    pub fn minimum_duration(self) -> Option<Duration> {
        let minutes = match self {
            CommitmentTier::FiveMinutes => 5,
            CommitmentTier::TenMinutes => 10,
            CommitmentTier::FifteenMinutes => 15,
            CommitmentTier::ThirtyMinutes => 30,
            CommitmentTier::OneHour => 60,
            CommitmentTier::Never => return None,
        };
        Some(Duration::minutes(minutes))
    }

    fn label(self) -> &'static str {
        match self {
            CommitmentTier::FiveMinutes => "5m",
            CommitmentTier::TenMinutes => "10m",
            CommitmentTier::FifteenMinutes => "15m",
            CommitmentTier::ThirtyMinutes => "30m",
            CommitmentTier::OneHour => "60m",
            CommitmentTier::Never => "never",
        }
    }
}

impl Default for CommitmentTier {
    fn default() -> Self {
        CommitmentTier::FifteenMinutes
    }
}

impl fmt::Display for CommitmentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CommitmentTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let normalized = normalized.trim_end_matches("in").trim_end_matches("inutes");
        match normalized {
            "5" | "5m" => Ok(CommitmentTier::FiveMinutes),
            "10" | "10m" => Ok(CommitmentTier::TenMinutes),
            "15" | "15m" => Ok(CommitmentTier::FifteenMinutes),
            "30" | "30m" => Ok(CommitmentTier::ThirtyMinutes),
            "60" | "60m" | "1h" => Ok(CommitmentTier::OneHour),
            "never" | "infinite" => Ok(CommitmentTier::Never),
            other => Err(format!(
                "unknown commitment tier '{other}' (expected one of 5m, 10m, 15m, 30m, 60m, never)"
            )),
        }
    }
}
