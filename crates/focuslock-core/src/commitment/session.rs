//! Committed session state machine.
//!
//! ```text
//! Locked -> ExitAvailable -> Exited
//!    \            \
//!     +------------+-------> Completed
//! ```
//!
//! `ExitAvailable` is reached once focused time meets the tier captured when
//! the session began, and only if commitment was enabled at that point.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::CommitmentTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Locked,
    ExitAvailable,
    /// Ended early by a paid emergency exit.
    Exited,
    /// Ran for its full planned duration.
    Completed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Exited | SessionPhase::Completed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Locked => write!(f, "locked"),
            SessionPhase::ExitAvailable => write!(f, "exit available"),
            SessionPhase::Exited => write!(f, "exited"),
            SessionPhase::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub tier: CommitmentTier,
    pub exit_enabled: bool,
    /// Set once the session reaches a terminal phase.
    #[serde(default)]
    pub outcome: Option<SessionPhase>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl CommitmentSession {
    pub fn new(
        session_id: String,
        started_at: DateTime<Utc>,
        planned: Duration,
        tier: CommitmentTier,
        exit_enabled: bool,
    ) -> Self {
        Self {
            session_id,
            started_at,
            ends_at: started_at + planned,
            tier,
            exit_enabled,
            outcome: None,
            ended_at: None,
        }
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now.min(self.ends_at) - self.started_at).max(Duration::zero())
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.ends_at - now).max(Duration::zero())
    }

    /// Phase at `now`. A session past its end reports `Completed` even
    /// before it has been finalized.
    pub fn phase_at(&self, now: DateTime<Utc>) -> SessionPhase {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        if now >= self.ends_at {
            return SessionPhase::Completed;
        }
        if !self.exit_enabled {
            return SessionPhase::Locked;
        }
        match self.tier.minimum_duration() {
            Some(minimum) if self.elapsed(now) >= minimum => SessionPhase::ExitAvailable,
            _ => SessionPhase::Locked,
        }
    }

    /// Time until the exit unlocks, if it ever will.
    pub fn time_until_exit(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.exit_enabled || self.outcome.is_some() {
            return None;
        }
        let unlock_at = self.started_at + self.tier.minimum_duration()?;
        if unlock_at >= self.ends_at {
            return None;
        }
        Some((unlock_at - now).max(Duration::zero()))
    }

    pub(crate) fn finish(&mut self, outcome: SessionPhase, at: DateTime<Utc>) {
        self.outcome = Some(outcome);
        self.ended_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn session(tier: CommitmentTier, enabled: bool) -> CommitmentSession {
        CommitmentSession::new("s1".into(), start(), Duration::minutes(60), tier, enabled)
    }

    #[test]
    fn unlocks_at_tier() {
        let s = session(CommitmentTier::FifteenMinutes, true);
        assert_eq!(s.phase_at(start() + Duration::minutes(10)), SessionPhase::Locked);
        assert_eq!(s.phase_at(start() + Duration::minutes(15)), SessionPhase::ExitAvailable);
        assert_eq!(s.time_until_exit(start() + Duration::minutes(10)), Some(Duration::minutes(5)));
    }

    #[test]
    fn never_tier_stays_locked() {
        let s = session(CommitmentTier::Never, true);
        assert_eq!(s.phase_at(start() + Duration::minutes(59)), SessionPhase::Locked);
        assert_eq!(s.time_until_exit(start()), None);
    }

    #[test]
    fn disabled_commitment_stays_locked() {
        let s = session(CommitmentTier::FiveMinutes, false);
        assert_eq!(s.phase_at(start() + Duration::minutes(30)), SessionPhase::Locked);
    }

    #[test]
    fn past_end_reports_completed() {
        let s = session(CommitmentTier::FiveMinutes, true);
        assert_eq!(s.phase_at(start() + Duration::minutes(60)), SessionPhase::Completed);
        assert_eq!(s.remaining(start() + Duration::minutes(61)), Duration::zero());
        assert_eq!(s.elapsed(start() + Duration::minutes(90)), Duration::minutes(60));
    }

    #[test]
    fn terminal_outcome_wins() {
        let mut s = session(CommitmentTier::FiveMinutes, true);
        s.finish(SessionPhase::Exited, start() + Duration::minutes(20));
        assert_eq!(s.phase_at(start() + Duration::minutes(21)), SessionPhase::Exited);
        assert!(SessionPhase::Exited.is_terminal());
    }
}
