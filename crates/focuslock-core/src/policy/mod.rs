//! Blocking policy: contexts, restriction sets and the policy store.

mod capability;
mod context;
mod local;
mod restriction;
mod store;

pub use capability::{AuthorizationStatus, InMemoryCapability, RestrictionCapability};
pub use context::BlockingContext;
pub use local::FileCapability;
pub use restriction::{normalize_domain, AppToken, CategoryToken, FacetKind, RestrictionSet};
pub use store::{ApplyReport, BlockPolicyStore, FacetFailure};
