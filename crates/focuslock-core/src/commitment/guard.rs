use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::config::YearMonth;
use super::entitlement::{EntitlementService, PurchaseOutcome};
use super::history::{pattern_warning, ExitRecord};
use super::pricing::ExitPricing;
use super::session::{CommitmentSession, SessionPhase};
use super::{CommitmentConfig, CommitmentTier};
use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::lock;
use crate::policy::{BlockPolicyStore, BlockingContext, RestrictionSet};
use crate::storage::{CommitmentSettings, Database, PricingSettings};

const CONFIG_KEY: &str = "commitment.config";
const SESSION_KEY: &str = "commitment.session";
/// End time of a session that ran out unattended, kept until the engine
/// hands it to regret protection.
const COMPLETION_KEY: &str = "commitment.completion_pending";
const PAID_EXIT_KEY: &str = "commitment.paid_exit";

/// Result of a paid emergency exit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitReceipt {
    pub record: ExitRecord,
    pub transaction_id: String,
    pub next_price_cents: u64,
}

/// A purchase that succeeded but whose exit was never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PaidExit {
    session_id: String,
    transaction_id: String,
    price_cents: u64,
}

struct GuardState {
    config: CommitmentConfig,
    session: Option<CommitmentSession>,
    paid_exit: Option<PaidExit>,
}

/// Gates escape from committed focus sessions.
///
/// Owns the `commitment` blocking context. Every operation holds the state
/// lock for its whole read-modify-write, including the purchase call, so
/// two exit requests can never both be charged.
pub struct CommitmentGuard {
    store: Arc<BlockPolicyStore>,
    entitlements: Arc<dyn EntitlementService>,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    pricing: ExitPricing,
    product_prefix: String,
    settings: CommitmentSettings,
    state: Mutex<GuardState>,
}

impl CommitmentGuard {
    /// Load commitment state from `db`, creating a fresh config on first use.
    pub fn open(
        store: Arc<BlockPolicyStore>,
        entitlements: Arc<dyn EntitlementService>,
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        pricing: &PricingSettings,
        settings: CommitmentSettings,
    ) -> Result<Self> {
        let exit_pricing = pricing.pricing();
        let config = match db.kv_get_json::<CommitmentConfig>(CONFIG_KEY)? {
            Some(config) => config,
            None => {
                let config = CommitmentConfig::new(&exit_pricing, YearMonth::of(clock.local_now()));
                db.kv_set_json(CONFIG_KEY, &config)?;
                config
            }
        };
        let session = db.kv_get_json::<CommitmentSession>(SESSION_KEY)?;
        let paid_exit = db.kv_get_json::<PaidExit>(PAID_EXIT_KEY)?;

        Ok(Self {
            store,
            entitlements,
            db,
            clock,
            pricing: exit_pricing,
            product_prefix: pricing.product_prefix.clone(),
            settings,
            state: Mutex::new(GuardState {
                config,
                session,
                paid_exit,
            }),
        })
    }

    pub fn config(&self) -> CommitmentConfig {
        lock(&self.state).config.clone()
    }

    /// Change whether exits are offered and the minimum tier.
    ///
    /// Rejected while a session is locked. The new values apply to the next
    /// session; a running session keeps the tier it started with.
    pub fn update_config(&self, is_enabled: bool, minimum_tier: CommitmentTier) -> Result<CommitmentConfig> {
        let mut state = lock(&self.state);
        self.settle(&mut state)?;
        if let Some(session) = &state.session {
            if session.phase_at(self.clock.now()) == SessionPhase::Locked {
                return Err(CoreError::CommitmentLocked);
            }
        }

        let mut config = state.config.clone();
        config.is_enabled = is_enabled;
        config.minimum_tier = minimum_tier;
        self.db.kv_set_json(CONFIG_KEY, &config)?;
        state.config = config.clone();
        tracing::info!(is_enabled, tier = %minimum_tier, "commitment config updated");
        Ok(config)
    }

    /// Price of the next emergency exit, in cents.
    ///
    /// The first query in a new calendar month resets the counters.
    pub fn current_price(&self) -> Result<u64> {
        let mut state = lock(&self.state);
        self.roll_month(&mut state)?;
        Ok(state.config.current_exit_price_cents)
    }

    pub fn product_id_for(&self, price_cents: u64) -> String {
        ExitPricing::product_id(&self.product_prefix, price_cents)
    }

    /// Start a committed session and apply the `commitment` context.
    ///
    /// The tier and enabled flag are captured now; later config changes do
    /// not affect this session.
    pub fn begin_session(
        &self,
        session_id: &str,
        planned: Duration,
        restrictions: &RestrictionSet,
    ) -> Result<CommitmentSession> {
        if planned <= Duration::zero() {
            return Err(ValidationError::InvalidValue {
                field: "planned_duration".into(),
                message: "must be positive".into(),
            }
            .into());
        }

        let mut state = lock(&self.state);
        self.settle(&mut state)?;
        if let Some(active) = &state.session {
            if active.outcome.is_none() {
                return Err(CoreError::SessionAlreadyActive(active.session_id.clone()));
            }
        }

        let report = self.store.apply_context(BlockingContext::Commitment, restrictions)?;
        if report.applied.is_empty() {
            let reason = report
                .failed
                .iter()
                .map(|f| format!("{}: {}", f.facet, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CoreError::NothingApplied {
                context: BlockingContext::Commitment,
                reason,
            });
        }
        if !report.is_complete() {
            tracing::warn!(failed = report.failed.len(), "commitment restrictions partially applied");
        }

        let session = CommitmentSession::new(
            session_id.to_string(),
            self.clock.now(),
            planned,
            state.config.minimum_tier,
            state.config.is_enabled,
        );
        self.db.kv_set_json(SESSION_KEY, &session)?;
        state.session = Some(session.clone());
        tracing::info!(session_id, tier = %session.tier, ends_at = %session.ends_at, "commitment session started");
        Ok(session)
    }

    /// The current or most recent session.
    pub fn session(&self) -> Result<Option<CommitmentSession>> {
        let mut state = lock(&self.state);
        self.settle(&mut state)?;
        Ok(state.session.clone())
    }

    /// Phase of the current or most recent session at the clock's now.
    pub fn session_phase(&self) -> Result<Option<SessionPhase>> {
        let mut state = lock(&self.state);
        self.settle(&mut state)?;
        let now = self.clock.now();
        Ok(state.session.as_ref().map(|s| s.phase_at(now)))
    }

    /// Pay to end the session early.
    ///
    /// Valid only while the session is `ExitAvailable`. A cancelled or
    /// failed purchase leaves every piece of state untouched and can be
    /// retried. If the purchase succeeds but storing the exit fails, the
    /// charge is remembered and the next request for the same session
    /// stores it without buying again.
    pub fn request_emergency_exit(
        &self,
        session_id: &str,
        focused: Duration,
        remaining: Duration,
    ) -> Result<ExitReceipt> {
        let mut state = lock(&self.state);
        self.settle(&mut state)?;
        let now = self.clock.now();

        let mut session = match &state.session {
            Some(s) if s.session_id == session_id => s.clone(),
            _ => return Err(CoreError::SessionNotFound(session_id.to_string())),
        };
        let phase = session.phase_at(now);
        if phase != SessionPhase::ExitAvailable {
            return Err(CoreError::ExitNotAvailable { phase });
        }

        self.roll_month(&mut state)?;
        let (price, transaction_id) = match state.paid_exit.clone().filter(|p| p.session_id == session_id) {
            Some(paid) => {
                tracing::info!(session_id, transaction_id = %paid.transaction_id, "recording already charged exit");
                (paid.price_cents, paid.transaction_id)
            }
            None => {
                let price = state.config.current_exit_price_cents;
                (price, self.purchase(session_id, price)?)
            }
        };

        let mut record = ExitRecord {
            id: 0,
            session_id: session_id.to_string(),
            focused_secs: focused.num_seconds().max(0),
            remaining_secs: remaining.num_seconds().max(0),
            timestamp: now,
            price_paid_cents: price,
            rating: None,
        };
        let mut config = state.config.clone();
        config.record_exit(&self.pricing);
        session.finish(SessionPhase::Exited, now);

        let committed = self.db.commit_exit(
            &record,
            self.settings.history_cap,
            &[
                (CONFIG_KEY, serde_json::to_string(&config)?),
                (SESSION_KEY, serde_json::to_string(&session)?),
            ],
        );
        record.id = match committed {
            Ok(id) => id,
            Err(source) => {
                tracing::error!(session_id, transaction_id = %transaction_id, "exit charged but not recorded: {source}");
                let paid = PaidExit {
                    session_id: session_id.to_string(),
                    transaction_id: transaction_id.clone(),
                    price_cents: price,
                };
                if let Err(e) = self.db.kv_set_json(PAID_EXIT_KEY, &paid) {
                    tracing::warn!(session_id, "could not persist pending exit charge: {e}");
                }
                state.paid_exit = Some(paid);
                return Err(CoreError::ExitNotRecorded { transaction_id, source });
            }
        };
        if state.paid_exit.take().is_some() {
            if let Err(e) = self.db.kv_delete(PAID_EXIT_KEY) {
                tracing::warn!(session_id, "could not clear pending exit charge: {e}");
            }
        }
        let next_price_cents = config.current_exit_price_cents;
        state.config = config;
        state.session = Some(session);

        self.store.remove_context(BlockingContext::Commitment);
        tracing::info!(
            session_id,
            price_cents = price,
            next_price_cents,
            "emergency exit completed"
        );
        Ok(ExitReceipt {
            record,
            transaction_id,
            next_price_cents,
        })
    }

    /// Mark the session as having run its full duration.
    ///
    /// Completing an already finished session is a no-op that reports its
    /// terminal phase.
    pub fn complete_session(&self, session_id: &str) -> Result<SessionPhase> {
        let mut state = lock(&self.state);
        let mut session = match &state.session {
            Some(s) if s.session_id == session_id => s.clone(),
            _ => return Err(CoreError::SessionNotFound(session_id.to_string())),
        };
        if let Some(outcome) = session.outcome {
            return Ok(outcome);
        }

        session.finish(SessionPhase::Completed, self.clock.now());
        self.db.kv_set_json(SESSION_KEY, &session)?;
        state.session = Some(session);
        self.store.remove_context(BlockingContext::Commitment);
        tracing::info!(session_id, "commitment session completed");
        Ok(SessionPhase::Completed)
    }

    /// End time of a session that ran its full length without an explicit
    /// completion call, until [`clear_completion`](Self::clear_completion).
    pub fn pending_completion(&self) -> Result<Option<DateTime<Utc>>> {
        let mut state = lock(&self.state);
        self.settle(&mut state)?;
        Ok(self.db.kv_get_json::<DateTime<Utc>>(COMPLETION_KEY)?)
    }

    pub fn clear_completion(&self) -> Result<()> {
        let _state = lock(&self.state);
        self.db.kv_delete(COMPLETION_KEY)?;
        Ok(())
    }

    /// Exit records, oldest first.
    pub fn history(&self) -> Result<Vec<ExitRecord>> {
        Ok(self.db.list_exits()?)
    }

    /// Attach a 1..=5 rating to exit record `exit_id`. Each exit can be
    /// rated once.
    pub fn rate_exit(&self, exit_id: i64, rating: u8) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(ValidationError::InvalidValue {
                field: "rating".into(),
                message: format!("{rating} is outside 1..=5"),
            }
            .into());
        }
        let _state = lock(&self.state);
        let record = self
            .db
            .list_exits()?
            .into_iter()
            .find(|r| r.id == exit_id)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "exit_id".into(),
                message: format!("no exit record {exit_id}"),
            })?;
        if record.rating.is_some() {
            return Err(ValidationError::InvalidValue {
                field: "rating".into(),
                message: "exit already rated".into(),
            }
            .into());
        }
        self.db.rate_exit(exit_id, rating)?;
        Ok(())
    }

    /// Advisory shown when exits cluster. Never affects enforcement.
    pub fn pattern_warning(&self) -> Result<Option<String>> {
        let history = self.db.list_exits()?;
        Ok(pattern_warning(
            &history,
            self.clock.now(),
            self.settings.advisory_window_days,
            self.settings.advisory_threshold,
        ))
    }

    fn purchase(&self, session_id: &str, price: u64) -> Result<String> {
        let product_id = self.product_id_for(price);
        tracing::info!(session_id, product_id = %product_id, "requesting emergency exit purchase");
        match self.entitlements.purchase(&product_id) {
            PurchaseOutcome::Purchased { transaction_id } => Ok(transaction_id),
            PurchaseOutcome::Cancelled => {
                tracing::info!(session_id, "emergency exit purchase cancelled");
                Err(CoreError::PaymentCancelled)
            }
            PurchaseOutcome::Failed(reason) => {
                tracing::warn!(session_id, reason = %reason, "emergency exit purchase failed");
                Err(CoreError::PaymentFailed(reason))
            }
        }
    }

    fn roll_month(&self, state: &mut GuardState) -> Result<()> {
        let month = YearMonth::of(self.clock.local_now());
        let mut config = state.config.clone();
        if config.roll_month(month, &self.pricing) {
            self.db.kv_set_json(CONFIG_KEY, &config)?;
            tracing::info!(month = %month, "exit counters reset for new month");
            state.config = config;
        }
        Ok(())
    }

    /// Finalize a session whose planned end has passed.
    fn settle(&self, state: &mut GuardState) -> Result<()> {
        let now = self.clock.now();
        let Some(session) = &state.session else {
            return Ok(());
        };
        if session.outcome.is_some() || now < session.ends_at {
            return Ok(());
        }

        let mut session = session.clone();
        let ends_at = session.ends_at;
        session.finish(SessionPhase::Completed, ends_at);
        self.db.kv_set_json(COMPLETION_KEY, &ends_at)?;
        self.db.kv_set_json(SESSION_KEY, &session)?;
        tracing::info!(session_id = %session.session_id, "commitment session ran to completion");
        state.session = Some(session);
        self.store.remove_context(BlockingContext::Commitment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::commitment::ScriptedEntitlements;
    use crate::policy::{FacetKind, InMemoryCapability};
    use chrono::TimeZone;

    struct Fixture {
        guard: CommitmentGuard,
        store: Arc<BlockPolicyStore>,
        clock: Arc<ManualClock>,
        payments: Arc<ScriptedEntitlements>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
        let store = Arc::new(BlockPolicyStore::new(Arc::new(InMemoryCapability::granted())));
        let payments = Arc::new(ScriptedEntitlements::approve_all());
        let db = Arc::new(Database::open_memory().unwrap());
        let guard = CommitmentGuard::open(
            store.clone(),
            payments.clone(),
            db,
            clock.clone(),
            &PricingSettings::default(),
            CommitmentSettings::default(),
        )
        .unwrap();
        Fixture {
            guard,
            store,
            clock,
            payments,
        }
    }

    fn apps() -> RestrictionSet {
        RestrictionSet::new().with_apps(["social"])
    }

    #[test]
    fn begin_applies_commitment_context() {
        let f = fixture();
        f.guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        assert!(f.store.is_active(BlockingContext::Commitment));
        assert_eq!(f.guard.session_phase().unwrap(), Some(SessionPhase::Locked));

        let err = f.guard.begin_session("s2", Duration::minutes(30), &apps()).unwrap_err();
        assert!(matches!(err, CoreError::SessionAlreadyActive(id) if id == "s1"));
    }

    #[test]
    fn exit_rejected_while_locked_without_charging() {
        let f = fixture();
        f.guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        f.clock.advance(Duration::minutes(10));

        let err = f
            .guard
            .request_emergency_exit("s1", Duration::minutes(10), Duration::minutes(50))
            .unwrap_err();
        assert!(matches!(err, CoreError::ExitNotAvailable { phase: SessionPhase::Locked }));
        assert!(f.payments.requested().is_empty());
    }

    #[test]
    fn cancelled_purchase_changes_nothing() {
        let f = fixture();
        f.guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        f.clock.advance(Duration::minutes(20));
        f.payments.push(PurchaseOutcome::Cancelled);
        let before = f.guard.config();

        let err = f
            .guard
            .request_emergency_exit("s1", Duration::minutes(20), Duration::minutes(40))
            .unwrap_err();
        assert!(matches!(err, CoreError::PaymentCancelled));
        assert_eq!(f.guard.config(), before);
        assert!(f.guard.history().unwrap().is_empty());
        assert!(f.store.is_active(BlockingContext::Commitment));
        assert_eq!(f.guard.session_phase().unwrap(), Some(SessionPhase::ExitAvailable));

        // retry succeeds
        let receipt = f
            .guard
            .request_emergency_exit("s1", Duration::minutes(20), Duration::minutes(40))
            .unwrap();
        assert_eq!(receipt.record.price_paid_cents, 200);
        assert_eq!(receipt.next_price_cents, 400);
    }

    #[test]
    fn failed_purchase_is_reported() {
        let f = fixture();
        f.guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        f.clock.advance(Duration::minutes(20));
        f.payments.push(PurchaseOutcome::Failed("card declined".into()));

        let err = f
            .guard
            .request_emergency_exit("s1", Duration::minutes(20), Duration::minutes(40))
            .unwrap_err();
        assert!(matches!(err, CoreError::PaymentFailed(reason) if reason == "card declined"));
        assert_eq!(f.guard.config().exits_used_this_month, 0);
    }

    #[test]
    fn update_config_blocked_while_locked() {
        let f = fixture();
        f.guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        assert!(matches!(
            f.guard.update_config(true, CommitmentTier::FiveMinutes),
            Err(CoreError::CommitmentLocked)
        ));

        f.clock.advance(Duration::minutes(16));
        let config = f.guard.update_config(true, CommitmentTier::OneHour).unwrap();
        assert_eq!(config.minimum_tier, CommitmentTier::OneHour);
        // running session keeps its captured tier
        assert_eq!(f.guard.session_phase().unwrap(), Some(SessionPhase::ExitAvailable));
    }

    #[test]
    fn session_completes_lazily_after_end() {
        let f = fixture();
        f.guard.begin_session("s1", Duration::minutes(25), &apps()).unwrap();
        f.clock.advance(Duration::minutes(30));
        assert_eq!(f.guard.session_phase().unwrap(), Some(SessionPhase::Completed));
        assert!(!f.store.is_active(BlockingContext::Commitment));

        let ended = f.guard.session().unwrap().unwrap().ends_at;
        assert_eq!(f.guard.pending_completion().unwrap(), Some(ended));
        assert_eq!(f.guard.pending_completion().unwrap(), Some(ended));
        f.guard.clear_completion().unwrap();
        assert_eq!(f.guard.pending_completion().unwrap(), None);

        f.guard.begin_session("s2", Duration::minutes(25), &apps()).unwrap();
        assert_eq!(f.guard.complete_session("s2").unwrap(), SessionPhase::Completed);
        // explicit completions are reported by the caller
        assert_eq!(f.guard.pending_completion().unwrap(), None);
        assert_eq!(f.guard.complete_session("s2").unwrap(), SessionPhase::Completed);
        assert!(matches!(f.guard.complete_session("nope"), Err(CoreError::SessionNotFound(_))));
    }

    #[test]
    fn rating_is_written_once() {
        let f = fixture();
        f.guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        f.clock.advance(Duration::minutes(20));
        let first = f
            .guard
            .request_emergency_exit("s1", Duration::minutes(20), Duration::minutes(40))
            .unwrap();
        assert_eq!(f.guard.history().unwrap()[0].id, first.record.id);

        assert!(f.guard.rate_exit(first.record.id, 0).is_err());
        f.guard.rate_exit(first.record.id, 3).unwrap();
        assert!(f.guard.rate_exit(first.record.id, 4).is_err());
        assert!(f.guard.rate_exit(first.record.id + 100, 4).is_err());

        // a reused session id gets its own record and rating
        f.guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        f.clock.advance(Duration::minutes(20));
        let second = f
            .guard
            .request_emergency_exit("s1", Duration::minutes(20), Duration::minutes(40))
            .unwrap();
        f.guard.rate_exit(second.record.id, 5).unwrap();
        let ratings: Vec<_> = f.guard.history().unwrap().iter().map(|r| r.rating).collect();
        assert_eq!(ratings, vec![Some(3), Some(5)]);
    }

    #[test]
    fn begin_fails_when_no_restriction_reaches_the_os() {
        let capability = Arc::new(InMemoryCapability::granted());
        for facet in FacetKind::ALL {
            capability.fail_facet(facet);
        }
        let store = Arc::new(BlockPolicyStore::new(capability.clone()));
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
        let guard = CommitmentGuard::open(
            store.clone(),
            Arc::new(ScriptedEntitlements::approve_all()),
            Arc::new(Database::open_memory().unwrap()),
            clock,
            &PricingSettings::default(),
            CommitmentSettings::default(),
        )
        .unwrap();

        let err = guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap_err();
        assert!(matches!(err, CoreError::NothingApplied { context: BlockingContext::Commitment, .. }));
        assert_eq!(guard.session().unwrap(), None);
        assert!(!store.is_active(BlockingContext::Commitment));

        // one working facet is enough to start
        capability.heal();
        capability.fail_facet(FacetKind::Domains);
        guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        assert_eq!(guard.session_phase().unwrap(), Some(SessionPhase::Locked));
    }

    #[test]
    fn charged_exit_is_stored_on_retry_without_a_second_charge() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_dir(dir.path()).unwrap());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
        let store = Arc::new(BlockPolicyStore::new(Arc::new(InMemoryCapability::granted())));
        let payments = Arc::new(ScriptedEntitlements::approve_all());
        let guard = CommitmentGuard::open(
            store.clone(),
            payments.clone(),
            db,
            clock.clone(),
            &PricingSettings::default(),
            CommitmentSettings::default(),
        )
        .unwrap();
        guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        clock.advance(Duration::minutes(20));

        let writer = rusqlite::Connection::open(dir.path().join(Database::FILE_NAME)).unwrap();
        writer
            .execute_batch(
                "CREATE TRIGGER reject_exits BEFORE INSERT ON exit_records
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = guard
            .request_emergency_exit("s1", Duration::minutes(20), Duration::minutes(40))
            .unwrap_err();
        let CoreError::ExitNotRecorded { transaction_id, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(payments.requested().len(), 1);
        assert!(guard.history().unwrap().is_empty());
        assert_eq!(guard.config().exits_used_this_month, 0);
        assert!(store.is_active(BlockingContext::Commitment));

        writer.execute_batch("DROP TRIGGER reject_exits;").unwrap();
        let receipt = guard
            .request_emergency_exit("s1", Duration::minutes(20), Duration::minutes(40))
            .unwrap();
        assert_eq!(receipt.transaction_id, transaction_id);
        assert_eq!(receipt.record.price_paid_cents, 200);
        assert_eq!(payments.requested().len(), 1);
        assert_eq!(guard.history().unwrap().len(), 1);
        assert_eq!(guard.session_phase().unwrap(), Some(SessionPhase::Exited));
        assert!(!store.is_active(BlockingContext::Commitment));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
        let open = || {
            CommitmentGuard::open(
                Arc::new(BlockPolicyStore::new(Arc::new(InMemoryCapability::granted()))),
                Arc::new(ScriptedEntitlements::approve_all()),
                Arc::new(Database::open_in_dir(dir.path()).unwrap()),
                clock.clone(),
                &PricingSettings::default(),
                CommitmentSettings::default(),
            )
            .unwrap()
        };

        let guard = open();
        guard.begin_session("s1", Duration::minutes(60), &apps()).unwrap();
        clock.advance(Duration::minutes(20));
        guard
            .request_emergency_exit("s1", Duration::minutes(20), Duration::minutes(40))
            .unwrap();
        drop(guard);

        let reopened = open();
        assert_eq!(reopened.config().exits_used_this_month, 1);
        assert_eq!(reopened.current_price().unwrap(), 400);
        assert_eq!(reopened.session_phase().unwrap(), Some(SessionPhase::Exited));
    }
}
