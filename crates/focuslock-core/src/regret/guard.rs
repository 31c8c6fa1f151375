use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use super::state::{ActivationReason, ProtectionState};
use super::window::{RegretWindow, WindowKind};
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::lock;
use crate::policy::{BlockPolicyStore, BlockingContext, RestrictionSet};
use crate::storage::Database;

const PROTECTION_KEY: &str = "regret.protection";
const LAST_COMPLETION_KEY: &str = "regret.last_completion";

struct GuardState {
    windows: Vec<RegretWindow>,
    protection: Option<ProtectionState>,
    last_completion: Option<DateTime<Utc>>,
}

/// Activates the `regretPrevention` context during protection windows.
///
/// Time windows (recurring and custom) can only be acknowledged; only the
/// post-session countdown can be ended early.
pub struct RegretGuard {
    store: Arc<BlockPolicyStore>,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    restrictions: RestrictionSet,
    state: Mutex<GuardState>,
}

impl RegretGuard {
    pub fn open(
        store: Arc<BlockPolicyStore>,
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        restrictions: RestrictionSet,
    ) -> Result<Self> {
        let windows = db.list_regret_windows()?;
        let protection = db.kv_get_json(PROTECTION_KEY)?;
        let last_completion = db.kv_get_json(LAST_COMPLETION_KEY)?;
        if restrictions.is_empty() {
            tracing::debug!("no regret restriction set configured; protection will not block");
        }
        Ok(Self {
            store,
            db,
            clock,
            restrictions,
            state: Mutex::new(GuardState {
                windows,
                protection,
                last_completion,
            }),
        })
    }

    // ── Windows ───────────────────────────────────────────────────────

    pub fn windows(&self) -> Vec<RegretWindow> {
        lock(&self.state).windows.clone()
    }

    pub fn window(&self, id: &str) -> Option<RegretWindow> {
        lock(&self.state).windows.iter().find(|w| w.id == id).cloned()
    }

    /// Append a window to the end of the list and re-evaluate protection.
    pub fn add_window(&self, kind: WindowKind, message: &str) -> Result<RegretWindow> {
        let window = RegretWindow::new(kind, message.trim());
        window.validate()?;

        let mut state = lock(&self.state);
        let mut windows = state.windows.clone();
        windows.push(window.clone());
        self.db.save_regret_windows(&windows)?;
        state.windows = windows;
        tracing::info!(window_id = %window.id, kind = window.kind.label(), "regret window added");
        self.evaluate(&mut state)?;
        Ok(window)
    }

    /// Replace a window's kind and message, keeping its id and position.
    pub fn update_window(&self, id: &str, kind: WindowKind, message: &str) -> Result<RegretWindow> {
        let mut state = lock(&self.state);
        self.ensure_not_protecting(&state, id)?;
        let mut windows = state.windows.clone();
        let window = windows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| CoreError::WindowNotFound(id.to_string()))?;
        window.kind = kind;
        window.message = message.trim().to_string();
        window.validate()?;
        let updated = window.clone();

        self.db.save_regret_windows(&windows)?;
        state.windows = windows;
        self.evaluate(&mut state)?;
        Ok(updated)
    }

    pub fn set_window_enabled(&self, id: &str, enabled: bool) -> Result<RegretWindow> {
        let mut state = lock(&self.state);
        if !enabled {
            self.ensure_not_protecting(&state, id)?;
        }
        let mut windows = state.windows.clone();
        let window = windows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| CoreError::WindowNotFound(id.to_string()))?;
        window.is_enabled = enabled;
        let updated = window.clone();

        self.db.save_regret_windows(&windows)?;
        state.windows = windows;
        tracing::info!(window_id = id, enabled, "regret window toggled");
        self.evaluate(&mut state)?;
        Ok(updated)
    }

    pub fn remove_window(&self, id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        self.ensure_not_protecting(&state, id)?;
        let mut windows = state.windows.clone();
        let before = windows.len();
        windows.retain(|w| w.id != id);
        if windows.len() == before {
            return Err(CoreError::WindowNotFound(id.to_string()));
        }

        self.db.save_regret_windows(&windows)?;
        state.windows = windows;
        tracing::info!(window_id = id, "regret window removed");
        self.evaluate(&mut state)?;
        Ok(())
    }

    // ── Protection ────────────────────────────────────────────────────

    pub fn protection(&self) -> Option<ProtectionState> {
        lock(&self.state).protection.clone()
    }

    /// Re-evaluate every enabled window against the clock.
    pub fn check_protection(&self) -> Result<Option<ProtectionState>> {
        let mut state = lock(&self.state);
        self.evaluate(&mut state)?;
        Ok(state.protection.clone())
    }

    /// Record a completed focus session, starting any post-session countdown.
    pub fn on_session_completed(&self) -> Result<Option<ProtectionState>> {
        self.record_completion(self.clock.now())
    }

    /// Record a focus session that completed at `at`, which may lie in the
    /// past. An older completion never replaces a newer one.
    pub fn record_completion(&self, at: DateTime<Utc>) -> Result<Option<ProtectionState>> {
        let mut state = lock(&self.state);
        if state.last_completion.map_or(true, |last| at > last) {
            self.db.kv_set_json(LAST_COMPLETION_KEY, &at)?;
            state.last_completion = Some(at);
        }
        self.evaluate(&mut state)?;
        Ok(state.protection.clone())
    }

    /// Time left on post-session protection.
    pub fn remaining(&self) -> Option<Duration> {
        let state = lock(&self.state);
        state
            .protection
            .as_ref()
            .and_then(|p| p.remaining(self.clock.now()))
    }

    /// End post-session protection now.
    pub fn end_protection_early(&self) -> Result<()> {
        let mut state = lock(&self.state);
        let protection = state.protection.clone().ok_or(CoreError::NoActiveProtection)?;
        if protection.reason == ActivationReason::TimeWindow {
            return Err(CoreError::CannotEndEarly);
        }

        self.db.kv_delete(LAST_COMPLETION_KEY)?;
        state.last_completion = None;
        self.set_protection(&mut state, None)?;
        self.store.remove_context(BlockingContext::RegretPrevention);
        tracing::info!(window_id = %protection.window_id, "post-session protection ended early");

        // A time window may still be open underneath.
        self.evaluate(&mut state)?;
        Ok(())
    }

    /// Mark the current protection as seen. Enforcement is unchanged.
    pub fn acknowledge(&self) -> Result<ProtectionState> {
        let mut state = lock(&self.state);
        let mut protection = state.protection.clone().ok_or(CoreError::NoActiveProtection)?;
        protection.acknowledged = true;
        self.set_protection(&mut state, Some(protection.clone()))?;
        Ok(protection)
    }

    fn ensure_not_protecting(&self, state: &GuardState, id: &str) -> Result<()> {
        match &state.protection {
            Some(p) if p.window_id == id && p.reason == ActivationReason::TimeWindow => {
                Err(CoreError::CannotEndEarly)
            }
            _ => Ok(()),
        }
    }

    fn evaluate(&self, state: &mut GuardState) -> Result<()> {
        let local = self.clock.local_now();
        let chosen = state
            .windows
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_enabled)
            .filter_map(|(index, w)| w.match_at(local, state.last_completion).map(|m| (index, w, m)))
            .min_by_key(|(index, w, _)| (w.kind.priority(), *index));

        let Some((_, window, matched)) = chosen else {
            if let Some(previous) = state.protection.clone() {
                self.set_protection(state, None)?;
                tracing::info!(window_id = %previous.window_id, "regret protection ended");
            }
            // Clear whatever an earlier occurrence left applied, even if the
            // latest one could not be enforced.
            if self.store.is_active(BlockingContext::RegretPrevention) {
                self.store.remove_context(BlockingContext::RegretPrevention);
            }
            return Ok(());
        };

        let mut next = ProtectionState {
            window_id: window.id.clone(),
            message: window.message.clone(),
            reason: if window.kind.is_time_window() {
                ActivationReason::TimeWindow
            } else {
                ActivationReason::PostSession
            },
            started_at: matched.started_at,
            expires_at: matched.expires_at,
            acknowledged: false,
            enforced: false,
        };
        if let Some(current) = &state.protection {
            if current.same_occurrence(&next) {
                next.acknowledged = current.acknowledged;
                next.enforced = current.enforced;
            } else {
                tracing::info!(window_id = %next.window_id, reason = %next.reason, "regret protection started");
            }
        } else {
            tracing::info!(window_id = %next.window_id, reason = %next.reason, "regret protection started");
        }

        if !next.enforced {
            next.enforced = self.enforce() || self.store.is_active(BlockingContext::RegretPrevention);
        }
        if state.protection.as_ref() != Some(&next) {
            self.set_protection(state, Some(next))?;
        }
        Ok(())
    }

    /// Apply the regret restriction set. Returns whether anything was applied.
    fn enforce(&self) -> bool {
        if self.restrictions.is_empty() {
            tracing::warn!("regret protection active but no restriction set is configured");
            return false;
        }
        match self
            .store
            .apply_context(BlockingContext::RegretPrevention, &self.restrictions)
        {
            Ok(report) => !report.applied.is_empty(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to apply regret restrictions");
                false
            }
        }
    }

    fn set_protection(&self, state: &mut GuardState, protection: Option<ProtectionState>) -> Result<()> {
        match &protection {
            Some(p) => self.db.kv_set_json(PROTECTION_KEY, p)?,
            None => self.db.kv_delete(PROTECTION_KEY)?,
        }
        state.protection = protection;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::{AuthorizationStatus, InMemoryCapability, RestrictionCapability};
    use crate::time::{TimeRange, WeekdaySet};
    use chrono::TimeZone;

    struct Fixture {
        guard: RegretGuard,
        store: Arc<BlockPolicyStore>,
        capability: Arc<InMemoryCapability>,
        clock: Arc<ManualClock>,
    }

    fn fixture_at(now: DateTime<Utc>) -> Fixture {
        let clock = Arc::new(ManualClock::new(now));
        let capability = Arc::new(InMemoryCapability::granted());
        let store = Arc::new(BlockPolicyStore::new(capability.clone()));
        let guard = RegretGuard::open(
            store.clone(),
            Arc::new(Database::open_memory().unwrap()),
            clock.clone(),
            RestrictionSet::new().with_categories(["shopping"]),
        )
        .unwrap();
        Fixture {
            guard,
            store,
            capability,
            clock,
        }
    }

    fn night() -> WindowKind {
        WindowKind::Recurring {
            range: TimeRange::hm(23, 0, 6, 0).unwrap(),
            weekdays: WeekdaySet::EVERY_DAY,
        }
    }

    #[test]
    fn time_window_activates_and_cannot_end_early() {
        let f = fixture_at(Utc.with_ymd_and_hms(2026, 3, 2, 23, 30, 0).unwrap());
        let window = f.guard.add_window(night(), "sleep on it").unwrap();

        let state = f.guard.protection().unwrap();
        assert_eq!(state.window_id, window.id);
        assert!(state.enforced);
        assert!(f.store.is_active(BlockingContext::RegretPrevention));

        assert!(matches!(f.guard.end_protection_early(), Err(CoreError::CannotEndEarly)));
        assert!(matches!(
            f.guard.set_window_enabled(&window.id, false),
            Err(CoreError::CannotEndEarly)
        ));
        assert!(matches!(f.guard.remove_window(&window.id), Err(CoreError::CannotEndEarly)));

        let acked = f.guard.acknowledge().unwrap();
        assert!(acked.acknowledged);
        assert!(f.store.is_active(BlockingContext::RegretPrevention));

        // acknowledgement survives re-evaluation of the same occurrence
        f.clock.advance(Duration::minutes(10));
        assert!(f.guard.check_protection().unwrap().unwrap().acknowledged);
    }

    #[test]
    fn window_closing_removes_context() {
        let f = fixture_at(Utc.with_ymd_and_hms(2026, 3, 3, 5, 50, 0).unwrap());
        f.guard.add_window(night(), "").unwrap();
        assert!(f.store.is_active(BlockingContext::RegretPrevention));

        f.clock.advance(Duration::minutes(15));
        assert!(f.guard.check_protection().unwrap().is_none());
        assert!(!f.store.is_active(BlockingContext::RegretPrevention));
    }

    #[test]
    fn post_session_can_end_early() {
        let f = fixture_at(Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap());
        f.guard
            .add_window(WindowKind::PostSession { duration_minutes: 20 }, "take a breath")
            .unwrap();
        assert!(f.guard.protection().is_none());

        let state = f.guard.on_session_completed().unwrap().unwrap();
        assert_eq!(state.reason, ActivationReason::PostSession);
        f.clock.advance(Duration::minutes(5));
        assert_eq!(f.guard.remaining(), Some(Duration::minutes(15)));

        f.guard.end_protection_early().unwrap();
        assert!(f.guard.protection().is_none());
        assert!(!f.store.is_active(BlockingContext::RegretPrevention));
        assert!(f.guard.check_protection().unwrap().is_none());
    }

    #[test]
    fn past_completion_counts_from_when_it_happened() {
        let f = fixture_at(Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap());
        f.guard
            .add_window(WindowKind::PostSession { duration_minutes: 20 }, "")
            .unwrap();

        let ended = f.clock.now() - Duration::minutes(5);
        let state = f.guard.record_completion(ended).unwrap().unwrap();
        assert_eq!(state.expires_at, Some(ended + Duration::minutes(20)));
        assert_eq!(f.guard.remaining(), Some(Duration::minutes(15)));

        // an older completion does not rewind the countdown
        f.guard.record_completion(ended - Duration::minutes(10)).unwrap();
        assert_eq!(f.guard.remaining(), Some(Duration::minutes(15)));

        assert!(f.guard.record_completion(ended - Duration::hours(1)).unwrap().is_some());
        f.clock.advance(Duration::minutes(16));
        assert!(f.guard.check_protection().unwrap().is_none());
    }

    #[test]
    fn unauthorized_protection_is_tracked_but_not_enforced() {
        let f = fixture_at(Utc.with_ymd_and_hms(2026, 3, 2, 23, 30, 0).unwrap());
        f.capability.set_status(AuthorizationStatus::Denied);
        f.guard.add_window(night(), "").unwrap();

        let state = f.guard.protection().unwrap();
        assert!(!state.enforced);
        assert!(f.store.effective_policy().is_empty());

        // enforcement is retried once authorization returns
        f.capability.set_status(AuthorizationStatus::Approved);
        assert!(f.guard.check_protection().unwrap().unwrap().enforced);
    }

    #[test]
    fn block_from_earlier_occurrence_is_cleared_when_windows_close() {
        let f = fixture_at(Utc.with_ymd_and_hms(2026, 3, 2, 22, 50, 0).unwrap());
        f.guard
            .add_window(WindowKind::PostSession { duration_minutes: 30 }, "")
            .unwrap();
        f.guard.add_window(night(), "").unwrap();
        assert!(f.guard.on_session_completed().unwrap().unwrap().enforced);

        // the night window takes over while re-applying is refused
        f.capability.set_status(AuthorizationStatus::Denied);
        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 2, 23, 5, 0).unwrap());
        let state = f.guard.check_protection().unwrap().unwrap();
        assert_eq!(state.reason, ActivationReason::TimeWindow);
        assert!(state.enforced);
        assert!(f.store.is_active(BlockingContext::RegretPrevention));

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 3, 6, 5, 0).unwrap());
        assert!(f.guard.check_protection().unwrap().is_none());
        assert!(!f.store.is_active(BlockingContext::RegretPrevention));
        assert!(f.capability.current(BlockingContext::RegretPrevention).unwrap().is_empty());
    }

    #[test]
    fn missing_window_errors() {
        let f = fixture_at(Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap());
        assert!(matches!(f.guard.remove_window("nope"), Err(CoreError::WindowNotFound(_))));
        assert!(matches!(f.guard.acknowledge(), Err(CoreError::NoActiveProtection)));
    }
}
