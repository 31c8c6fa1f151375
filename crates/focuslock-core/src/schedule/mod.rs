//! Recurring blocking schedules.
//!
//! The main process owns schedules through [`ScheduleCoordinator`]; the
//! monitor process applies them through [`Monitor`] using only the snapshot
//! table published in the shared state bridge.

mod coordinator;
pub mod diagnostics;
mod model;
mod monitor;
pub mod snapshot;
mod trigger;

pub use coordinator::ScheduleCoordinator;
pub use diagnostics::DiagnosticEntry;
pub use model::{RecurrenceRule, Schedule, ScheduleDraft};
pub use monitor::{Monitor, MonitorOutcome};
pub use snapshot::{ScheduleSnapshot, SnapshotLookup, SnapshotTable};
pub use trigger::{BridgeTriggerRegistry, InMemoryTriggerService, RecurringTriggerService, TriggerEvent};
