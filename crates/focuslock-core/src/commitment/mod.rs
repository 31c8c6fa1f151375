//! Commitment mode: minimum focus durations and paid emergency exits.

mod config;
mod entitlement;
mod guard;
mod history;
mod pricing;
mod session;
mod tier;

pub use config::{CommitmentConfig, YearMonth};
pub use entitlement::{EntitlementService, PurchaseOutcome, ScriptedEntitlements};
pub use guard::{CommitmentGuard, ExitReceipt};
pub use history::{pattern_warning, ExitRecord};
pub use pricing::{format_price, ExitPricing};
pub use session::{CommitmentSession, SessionPhase};
pub use tier::CommitmentTier;
