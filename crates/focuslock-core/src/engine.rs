//! Component wiring for the main process and the monitor process.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::bridge::{SharedStateBridge, SqliteBridge};
use crate::clock::{Clock, SystemClock};
use crate::commitment::{CommitmentGuard, EntitlementService, ScriptedEntitlements, SessionPhase};
use crate::error::{CoreError, Result};
use crate::policy::{
    AuthorizationStatus, BlockPolicyStore, BlockingContext, FileCapability, RestrictionCapability,
    RestrictionSet,
};
use crate::regret::{ProtectionState, RegretGuard};
use crate::schedule::{BridgeTriggerRegistry, Monitor, MonitorOutcome, RecurringTriggerService, ScheduleCoordinator};
use crate::storage::{Config, Database};

/// Platform services the engine depends on.
pub struct Collaborators {
    pub capability: Arc<dyn RestrictionCapability>,
    pub bridge: Arc<dyn SharedStateBridge>,
    pub triggers: Arc<dyn RecurringTriggerService>,
    pub entitlements: Arc<dyn EntitlementService>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// File and SQLite stand-ins rooted at `dir`, shared with a
    /// [`MonitorHost`] opened on the same directory.
    pub fn local(dir: &Path) -> Result<Self> {
        let bridge: Arc<dyn SharedStateBridge> = Arc::new(SqliteBridge::open_in_dir(dir)?);
        Ok(Self {
            capability: Arc::new(FileCapability::in_dir(dir)),
            triggers: Arc::new(BridgeTriggerRegistry::new(bridge.clone())),
            bridge,
            entitlements: Arc::new(ScriptedEntitlements::approve_all()),
            clock: Arc::new(SystemClock),
        })
    }
}

/// Point-in-time summary across every component.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub authorization: AuthorizationStatus,
    pub active_contexts: Vec<BlockingContext>,
    pub effective_policy: RestrictionSet,
    pub running_schedules: Vec<String>,
    pub commitment_phase: Option<SessionPhase>,
    pub next_exit_price_cents: u64,
    pub protection: Option<ProtectionState>,
}

/// The main-process engine.
pub struct FocusEngine {
    policy: Arc<BlockPolicyStore>,
    schedules: ScheduleCoordinator,
    commitment: CommitmentGuard,
    regret: RegretGuard,
    clock: Arc<dyn Clock>,
}

impl FocusEngine {
    pub fn new(config: &Config, db: Arc<Database>, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            capability,
            bridge,
            triggers,
            entitlements,
            clock,
        } = collaborators;

        let policy = Arc::new(BlockPolicyStore::new(capability));
        let schedules = ScheduleCoordinator::open(db.clone(), bridge, triggers, clock.clone())?;
        let commitment = CommitmentGuard::open(
            policy.clone(),
            entitlements,
            db.clone(),
            clock.clone(),
            &config.pricing,
            config.commitment.clone(),
        )?;
        let regret = RegretGuard::open(policy.clone(), db, clock.clone(), config.regret.restriction_set())?;

        Ok(Self {
            policy,
            schedules,
            commitment,
            regret,
            clock,
        })
    }

    /// Open the engine on `dir` with local collaborators and repair the
    /// published schedule state.
    pub fn open_local(dir: &Path, config: &Config) -> Result<Self> {
        let db = Arc::new(Database::open_in_dir(dir)?);
        let engine = Self::new(config, db, Collaborators::local(dir)?)?;
        engine.schedules.republish()?;
        Ok(engine)
    }

    pub fn policy(&self) -> &BlockPolicyStore {
        &self.policy
    }

    pub fn schedules(&self) -> &ScheduleCoordinator {
        &self.schedules
    }

    pub fn commitment(&self) -> &CommitmentGuard {
        &self.commitment
    }

    pub fn regret(&self) -> &RegretGuard {
        &self.regret
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// A focus session ran its full length: finish the commitment session,
    /// if one was running under this id, and start any post-session
    /// protection.
    pub fn focus_session_completed(&self, session_id: &str) -> Result<Option<ProtectionState>> {
        match self.commitment.complete_session(session_id) {
            Ok(_) | Err(CoreError::SessionNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.regret.on_session_completed()
    }

    /// Hand a commitment session that ran out unattended to regret
    /// protection, then re-evaluate the protection windows.
    pub fn tick(&self) -> Result<Option<ProtectionState>> {
        let Some(ended) = self.commitment.pending_completion()? else {
            return self.regret.check_protection();
        };
        let protection = self.regret.record_completion(ended)?;
        self.commitment.clear_completion()?;
        Ok(protection)
    }

    pub fn status(&self) -> Result<EngineStatus> {
        let protection = self.tick()?;
        Ok(EngineStatus {
            authorization: self.policy.authorization_status(),
            active_contexts: self.policy.active_contexts(),
            effective_policy: self.policy.effective_policy(),
            running_schedules: self.schedules.running().into_iter().map(|s| s.name).collect(),
            commitment_phase: self.commitment.session_phase()?,
            next_exit_price_cents: self.commitment.current_price()?,
            protection,
        })
    }
}

/// The monitor process: reads only the bridge and the restriction scopes.
pub struct MonitorHost {
    monitor: Monitor,
    registry: BridgeTriggerRegistry,
    clock: Arc<dyn Clock>,
}

impl MonitorHost {
    pub fn open_local(dir: &Path, config: &Config) -> Result<Self> {
        let bridge: Arc<dyn SharedStateBridge> = Arc::new(SqliteBridge::open_in_dir(dir)?);
        let store = Arc::new(BlockPolicyStore::new(Arc::new(FileCapability::in_dir(dir))));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Self::new(store, bridge, clock, config.monitor.diagnostic_log_cap))
    }

    pub fn new(
        store: Arc<BlockPolicyStore>,
        bridge: Arc<dyn SharedStateBridge>,
        clock: Arc<dyn Clock>,
        log_cap: usize,
    ) -> Self {
        Self {
            monitor: Monitor::new(store, bridge.clone(), clock.clone(), log_cap),
            registry: BridgeTriggerRegistry::new(bridge),
            clock,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Deliver every boundary crossed since the last poll.
    pub fn poll(&self) -> Result<Vec<MonitorOutcome>> {
        let events = self.registry.poll(self.clock.local_now())?;
        Ok(events.iter().map(|event| self.monitor.handle(event)).collect())
    }
}
