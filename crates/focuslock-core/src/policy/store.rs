//! Per-context restriction slots and the merged effective policy.
//!
//! ## Semantics
//!
//! - Every [`BlockingContext`] owns one slot. Applying or removing a context
//!   touches only that slot and only that OS scope.
//! - The effective policy is the plain union of all non-empty slots. There is
//!   no precedence between contexts, so clearing one reason to block never
//!   lifts a restriction owned by another.
//! - Application is best-effort per facet: apps, categories and domains are
//!   submitted separately, facets that succeed stay applied, and facets that
//!   fail are reported in the [`ApplyReport`] without rolling back the rest.
//! - Missing authorization fails closed: nothing is submitted and no slot
//!   changes, but restrictions applied by earlier calls remain in place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{AuthorizationStatus, BlockingContext, FacetKind, RestrictionCapability, RestrictionSet};
use crate::error::{CoreError, Result};
use crate::lock;

/// Outcome of one `apply_context` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub context: BlockingContext,
    pub applied: Vec<FacetKind>,
    pub failed: Vec<FacetFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetFailure {
    pub facet: FacetKind,
    pub reason: String,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BlockPolicyStore {
    capability: Arc<dyn RestrictionCapability>,
    slots: Mutex<BTreeMap<BlockingContext, RestrictionSet>>,
}

impl BlockPolicyStore {
    /// Create a store and load whatever the OS currently has applied.
    pub fn new(capability: Arc<dyn RestrictionCapability>) -> Self {
        let store = Self {
            capability,
            slots: Mutex::new(BTreeMap::new()),
        };
        store.refresh();
        store
    }

    /// Reload every slot from the OS scopes.
    ///
    /// Another process may have applied or cleared a context since this
    /// store last looked. Scopes that cannot be read keep their last known
    /// value.
    pub fn refresh(&self) {
        let mut slots = lock(&self.slots);
        for context in BlockingContext::ALL {
            match self.capability.current(context) {
                Ok(set) if set.is_empty() => {
                    slots.remove(&context);
                }
                Ok(set) => {
                    slots.insert(context, set);
                }
                Err(e) => tracing::warn!(%context, "could not read restriction scope: {e}"),
            }
        }
    }

    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.capability.authorization_status()
    }

    pub fn request_authorization(&self) -> AuthorizationStatus {
        let status = self.capability.request_authorization();
        tracing::info!(%status, "restriction authorization requested");
        status
    }

    /// Replace `context`'s slot with `set` and submit it to the OS.
    ///
    /// Idempotent: applying the same set twice leaves the same slot.
    ///
    /// # Errors
    /// Returns [`CoreError::AuthorizationRequired`] if the capability is not
    /// granted. Per-facet failures are not errors; see [`ApplyReport`].
    pub fn apply_context(&self, context: BlockingContext, set: &RestrictionSet) -> Result<ApplyReport> {
        if !self.capability.authorization_status().is_granted() {
            tracing::warn!(%context, "apply refused: restriction authorization not granted");
            return Err(CoreError::AuthorizationRequired { context });
        }

        let mut slots = lock(&self.slots);
        let previous = slots.get(&context).cloned().unwrap_or_default();
        let mut recorded = previous;
        let mut report = ApplyReport {
            context,
            applied: Vec::new(),
            failed: Vec::new(),
        };

        for facet in FacetKind::ALL {
            match self.capability.apply(context, facet, set) {
                Ok(()) => {
                    recorded.replace_facet(facet, set);
                    report.applied.push(facet);
                }
                Err(e) => {
                    tracing::warn!(%context, %facet, "facet apply failed: {e}");
                    report.failed.push(FacetFailure {
                        facet,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.applied.is_empty() && !report.failed.is_empty() {
            // Nothing reached the OS; the slot keeps what is really applied.
            return Ok(report);
        }

        if recorded.is_empty() {
            slots.remove(&context);
        } else {
            slots.insert(context, recorded);
        }
        tracing::info!(%context, restrictions = %set, failed = report.failed.len(), "context applied");
        Ok(report)
    }

    /// Clear `context`'s slot and its OS scope. Idempotent.
    ///
    /// Returns whether the slot held anything. A failing OS call is logged
    /// and not retried.
    pub fn remove_context(&self, context: BlockingContext) -> bool {
        let mut slots = lock(&self.slots);
        let was_active = slots.remove(&context).is_some();
        if let Err(e) = self.capability.remove(context) {
            tracing::warn!(%context, "remove failed: {e}");
        }
        if was_active {
            tracing::info!(%context, "context removed");
        }
        was_active
    }

    /// Union of every active slot.
    pub fn effective_policy(&self) -> RestrictionSet {
        let slots = lock(&self.slots);
        RestrictionSet::union(slots.values())
    }

    pub fn slot(&self, context: BlockingContext) -> Option<RestrictionSet> {
        lock(&self.slots).get(&context).cloned()
    }

    pub fn is_active(&self, context: BlockingContext) -> bool {
        lock(&self.slots).contains_key(&context)
    }

    pub fn active_contexts(&self) -> Vec<BlockingContext> {
        lock(&self.slots).keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::InMemoryCapability;

    fn store_with(cap: Arc<InMemoryCapability>) -> BlockPolicyStore {
        BlockPolicyStore::new(cap)
    }

    #[test]
    fn apply_twice_is_idempotent() {
        let store = store_with(Arc::new(InMemoryCapability::granted()));
        let set = RestrictionSet::new().with_apps(["app.x"]).with_domains(["x.com"]);

        store.apply_context(BlockingContext::Timer, &set).unwrap();
        let once = store.effective_policy();
        store.apply_context(BlockingContext::Timer, &set).unwrap();

        assert_eq!(store.effective_policy(), once);
        assert_eq!(store.slot(BlockingContext::Timer), Some(set));
    }

    #[test]
    fn removing_one_context_keeps_the_others() {
        let store = store_with(Arc::new(InMemoryCapability::granted()));
        store
            .apply_context(BlockingContext::Timer, &RestrictionSet::new().with_apps(["appX"]))
            .unwrap();
        store
            .apply_context(BlockingContext::Schedule, &RestrictionSet::new().with_apps(["appY"]))
            .unwrap();

        assert!(store.remove_context(BlockingContext::Timer));

        let effective = store.effective_policy();
        assert!(effective.contains_app("appY"));
        assert!(!effective.contains_app("appX"));
    }

    #[test]
    fn shared_token_survives_removal_of_one_owner() {
        let store = store_with(Arc::new(InMemoryCapability::granted()));
        let set = RestrictionSet::new().with_apps(["appX"]);
        store.apply_context(BlockingContext::Timer, &set).unwrap();
        store.apply_context(BlockingContext::Commitment, &set).unwrap();

        store.remove_context(BlockingContext::Timer);
        assert!(store.effective_policy().contains_app("appX"));
    }

    #[test]
    fn unauthorized_apply_leaves_slots_untouched() {
        let cap = Arc::new(InMemoryCapability::granted());
        let store = store_with(cap.clone());
        let before = RestrictionSet::new().with_apps(["appX"]);
        store.apply_context(BlockingContext::Timer, &before).unwrap();

        cap.set_status(AuthorizationStatus::Denied);
        let err = store
            .apply_context(BlockingContext::Timer, &RestrictionSet::new().with_apps(["appZ"]))
            .unwrap_err();
        assert!(matches!(err, CoreError::AuthorizationRequired { context: BlockingContext::Timer }));
        assert_eq!(store.slot(BlockingContext::Timer), Some(before));

        let err = store
            .apply_context(BlockingContext::Schedule, &RestrictionSet::new().with_apps(["appY"]))
            .unwrap_err();
        assert!(matches!(err, CoreError::AuthorizationRequired { .. }));
        assert!(!store.is_active(BlockingContext::Schedule));
    }

    #[test]
    fn partial_facet_failure_keeps_succeeded_facets() {
        let cap = Arc::new(InMemoryCapability::granted());
        cap.fail_facet(FacetKind::Domains);
        let store = store_with(cap.clone());

        let set = RestrictionSet::new().with_apps(["appX"]).with_domains(["x.com"]);
        let report = store.apply_context(BlockingContext::Timer, &set).unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failed[0].facet, FacetKind::Domains);
        let slot = store.slot(BlockingContext::Timer).unwrap();
        assert!(slot.contains_app("appX"));
        assert!(slot.domains.is_empty());
        assert_eq!(cap.current(BlockingContext::Timer).unwrap(), slot);
    }

    #[test]
    fn remove_is_idempotent() {
        let cap = Arc::new(InMemoryCapability::granted());
        let store = store_with(cap.clone());
        assert!(!store.remove_context(BlockingContext::Schedule));
        assert!(!store.remove_context(BlockingContext::Schedule));
        assert!(store.effective_policy().is_empty());
        assert_eq!(cap.remove_calls(), 2);
    }

    #[test]
    fn new_store_hydrates_from_os_scopes() {
        let cap = Arc::new(InMemoryCapability::granted());
        let monitor_side = store_with(cap.clone());
        monitor_side
            .apply_context(BlockingContext::Schedule, &RestrictionSet::new().with_apps(["appY"]))
            .unwrap();

        let main_side = store_with(cap.clone());
        assert_eq!(main_side.active_contexts(), vec![BlockingContext::Schedule]);

        monitor_side.remove_context(BlockingContext::Schedule);
        main_side.refresh();
        assert!(main_side.effective_policy().is_empty());
    }

    #[test]
    fn applying_empty_set_clears_slot() {
        let store = store_with(Arc::new(InMemoryCapability::granted()));
        store
            .apply_context(BlockingContext::Timer, &RestrictionSet::new().with_apps(["appX"]))
            .unwrap();
        store.apply_context(BlockingContext::Timer, &RestrictionSet::new()).unwrap();
        assert!(!store.is_active(BlockingContext::Timer));
    }
}
