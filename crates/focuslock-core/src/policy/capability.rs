//! The OS restriction capability.
//!
//! The platform exposes named restriction scopes that persist outside any
//! process. Each [`BlockingContext`] maps to exactly one scope, so a process
//! can apply or clear its own context without touching the others, and a
//! process started later can read back what is currently applied.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Mutex;

use super::{BlockingContext, FacetKind, RestrictionSet};
use crate::error::CapabilityError;
use crate::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
    #[default]
    NotDetermined,
    Denied,
    Approved,
}

impl AuthorizationStatus {
    pub fn is_granted(self) -> bool {
        self == AuthorizationStatus::Approved
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationStatus::NotDetermined => write!(f, "not determined"),
            AuthorizationStatus::Denied => write!(f, "denied"),
            AuthorizationStatus::Approved => write!(f, "approved"),
        }
    }
}

/// Platform restriction service.
///
/// Authorization can be revoked by the user at any time, so callers check
/// [`authorization_status`](Self::authorization_status) before every apply.
pub trait RestrictionCapability: Send + Sync {
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Ask the user for authorization. May return without changing status.
    fn request_authorization(&self) -> AuthorizationStatus;

    /// Replace one facet of `scope` with the same facet of `set`.
    ///
    /// An empty facet clears it.
    fn apply(
        &self,
        scope: BlockingContext,
        facet: FacetKind,
        set: &RestrictionSet,
    ) -> Result<(), CapabilityError>;

    /// Clear every facet of `scope`.
    fn remove(&self, scope: BlockingContext) -> Result<(), CapabilityError>;

    /// What is currently applied under `scope`.
    fn current(&self, scope: BlockingContext) -> Result<RestrictionSet, CapabilityError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    status: AuthorizationStatus,
    grant_on_request: bool,
    scopes: BTreeMap<BlockingContext, RestrictionSet>,
    failing: BTreeSet<FacetKind>,
    apply_calls: usize,
    remove_calls: usize,
}

/// In-process restriction capability.
///
/// Used by tests and as the reference behavior for the platform service.
/// Individual facets can be made to fail to exercise partial application.
#[derive(Debug, Default)]
pub struct InMemoryCapability {
    state: Mutex<MemoryState>,
}

impl InMemoryCapability {
    /// A capability that has already been authorized.
    pub fn granted() -> Self {
        let cap = Self::default();
        {
            let mut state = lock(&cap.state);
            state.status = AuthorizationStatus::Approved;
            state.grant_on_request = true;
        }
        cap
    }

    /// A capability the user has not authorized yet; requesting grants it.
    pub fn undetermined() -> Self {
        let cap = Self::default();
        lock(&cap.state).grant_on_request = true;
        cap
    }

    pub fn set_status(&self, status: AuthorizationStatus) {
        lock(&self.state).status = status;
    }

    /// Make every future apply of `facet` fail.
    pub fn fail_facet(&self, facet: FacetKind) {
        lock(&self.state).failing.insert(facet);
    }

    pub fn heal(&self) {
        lock(&self.state).failing.clear();
    }

    pub fn apply_calls(&self) -> usize {
        lock(&self.state).apply_calls
    }

    pub fn remove_calls(&self) -> usize {
        lock(&self.state).remove_calls
    }
}

impl RestrictionCapability for InMemoryCapability {
    fn authorization_status(&self) -> AuthorizationStatus {
        lock(&self.state).status
    }

    fn request_authorization(&self) -> AuthorizationStatus {
        let mut state = lock(&self.state);
        if state.grant_on_request && state.status == AuthorizationStatus::NotDetermined {
            state.status = AuthorizationStatus::Approved;
        }
        state.status
    }

    fn apply(
        &self,
        scope: BlockingContext,
        facet: FacetKind,
        set: &RestrictionSet,
    ) -> Result<(), CapabilityError> {
        let mut state = lock(&self.state);
        state.apply_calls += 1;
        if !state.status.is_granted() {
            return Err(CapabilityError::NotAuthorized);
        }
        if state.failing.contains(&facet) {
            return Err(CapabilityError::Rejected {
                operation: "apply",
                scope,
                message: format!("{facet} rejected"),
            });
        }
        let entry = state.scopes.entry(scope).or_default();
        entry.replace_facet(facet, set);
        if entry.is_empty() {
            state.scopes.remove(&scope);
        }
        Ok(())
    }

    fn remove(&self, scope: BlockingContext) -> Result<(), CapabilityError> {
        let mut state = lock(&self.state);
        state.remove_calls += 1;
        state.scopes.remove(&scope);
        Ok(())
    }

    fn current(&self, scope: BlockingContext) -> Result<RestrictionSet, CapabilityError> {
        Ok(lock(&self.state).scopes.get(&scope).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_replaces_single_facet() {
        let cap = InMemoryCapability::granted();
        let first = RestrictionSet::new().with_apps(["a"]).with_domains(["x.com"]);
        cap.apply(BlockingContext::Timer, FacetKind::Apps, &first).unwrap();
        cap.apply(BlockingContext::Timer, FacetKind::Domains, &first).unwrap();

        let second = RestrictionSet::new().with_apps(["b"]);
        cap.apply(BlockingContext::Timer, FacetKind::Apps, &second).unwrap();

        let current = cap.current(BlockingContext::Timer).unwrap();
        assert!(current.contains_app("b"));
        assert!(!current.contains_app("a"));
        assert!(current.contains_domain("x.com"));
    }

    #[test]
    fn request_grants_undetermined_only() {
        let cap = InMemoryCapability::undetermined();
        assert_eq!(cap.request_authorization(), AuthorizationStatus::Approved);

        let cap = InMemoryCapability::undetermined();
        cap.set_status(AuthorizationStatus::Denied);
        assert_eq!(cap.request_authorization(), AuthorizationStatus::Denied);
    }

    #[test]
    fn unauthorized_apply_is_rejected() {
        let cap = InMemoryCapability::default();
        let set = RestrictionSet::new().with_apps(["a"]);
        assert_eq!(
            cap.apply(BlockingContext::Timer, FacetKind::Apps, &set),
            Err(CapabilityError::NotAuthorized)
        );
        assert!(cap.current(BlockingContext::Timer).unwrap().is_empty());
    }
}
