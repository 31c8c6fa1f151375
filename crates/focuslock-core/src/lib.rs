//! # focuslock Core Library
//!
//! This library implements the focus enforcement engine: the part of focuslock
//! that decides which app and website restrictions are active, keeps that
//! decision correct across the main process and the independently launched
//! monitor process, and gates escape from committed sessions.
//!
//! ## Architecture
//!
//! - **Policy**: one isolated restriction slot per [`BlockingContext`]; the
//!   effective policy is the union of all active slots
//! - **Bridge**: a durable key/value store that is the only channel between
//!   the main process and the monitor process
//! - **Schedules**: recurring blocking schedules, published as snapshots for
//!   the monitor, which applies them on OS interval callbacks
//! - **Commitment**: minimum focus duration and escalating emergency exit prices
//! - **Regret**: time windows that auto-activate their own blocking context
//!
//! ## Key Components
//!
//! - [`BlockPolicyStore`]: context slots and the merged effective policy
//! - [`ScheduleCoordinator`] and [`Monitor`]: schedule lifecycle and callbacks
//! - [`CommitmentGuard`]: session gate, exit pricing and monthly reset
//! - [`RegretGuard`]: protection windows
//! - [`FocusEngine`]: wires the main-process components together

pub mod bridge;
pub mod clock;
pub mod commitment;
pub mod engine;
pub mod error;
pub mod policy;
pub mod regret;
pub mod schedule;
pub mod storage;
pub mod time;

pub use bridge::{MemoryBridge, SharedStateBridge, SqliteBridge};
pub use clock::{Clock, ManualClock, SystemClock};
pub use commitment::{
    CommitmentConfig, CommitmentGuard, CommitmentSession, CommitmentTier, EntitlementService,
    ExitPricing, ExitReceipt, ExitRecord, PurchaseOutcome, ScriptedEntitlements, SessionPhase,
};
pub use engine::{Collaborators, EngineStatus, FocusEngine, MonitorHost};
pub use error::{BridgeError, CapabilityError, ConfigError, CoreError, DatabaseError, ValidationError};
pub use policy::{
    AppToken, ApplyReport, AuthorizationStatus, BlockPolicyStore, BlockingContext, CategoryToken,
    FacetKind, FileCapability, InMemoryCapability, RestrictionCapability, RestrictionSet,
};
pub use regret::{ActivationReason, CustomRepeat, ProtectionState, RegretGuard, RegretWindow, WindowKind};
pub use schedule::{
    BridgeTriggerRegistry, DiagnosticEntry, InMemoryTriggerService, Monitor, MonitorOutcome,
    RecurrenceRule, RecurringTriggerService, Schedule, ScheduleCoordinator, ScheduleDraft,
    ScheduleSnapshot, TriggerEvent,
};
pub use storage::{data_dir, Config, Database};
pub use time::{TimeRange, WeekdaySet};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every component keeps its state consistent before any call that could
/// panic, so a poisoned lock still guards valid data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
