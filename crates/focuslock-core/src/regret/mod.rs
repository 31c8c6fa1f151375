//! Regret prevention: protection windows that block impulsive use.

mod guard;
mod state;
mod window;

pub use guard::RegretGuard;
pub use state::{ActivationReason, ProtectionState};
pub use window::{CustomRepeat, RegretWindow, WindowKind};
