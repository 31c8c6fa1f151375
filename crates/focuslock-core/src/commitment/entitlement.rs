//! Payment collaborator for emergency exits.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::lock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOutcome {
    Purchased { transaction_id: String },
    /// The user abandoned the payment flow.
    Cancelled,
    Failed(String),
}

/// Store or entitlement service that sells the exit product.
pub trait EntitlementService: Send + Sync {
    fn purchase(&self, product_id: &str) -> PurchaseOutcome;
}

/// Entitlement service that answers from a script.
///
/// Queued outcomes are returned first, then the fallback. Every requested
/// product id is recorded.
#[derive(Debug)]
pub struct ScriptedEntitlements {
    queue: Mutex<VecDeque<PurchaseOutcome>>,
    fallback: FallbackOutcome,
    requested: Mutex<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackOutcome {
    Approve,
    Cancel,
}

impl ScriptedEntitlements {
    /// Approve every purchase.
    pub fn approve_all() -> Self {
        Self::with_fallback(FallbackOutcome::Approve)
    }

    /// Cancel every purchase, as if the user always backed out.
    pub fn cancel_all() -> Self {
        Self::with_fallback(FallbackOutcome::Cancel)
    }

    fn with_fallback(fallback: FallbackOutcome) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: PurchaseOutcome) {
        lock(&self.queue).push_back(outcome);
    }

    pub fn requested(&self) -> Vec<String> {
        lock(&self.requested).clone()
    }
}

impl EntitlementService for ScriptedEntitlements {
    fn purchase(&self, product_id: &str) -> PurchaseOutcome {
        lock(&self.requested).push(product_id.to_string());
        if let Some(outcome) = lock(&self.queue).pop_front() {
            return outcome;
        }
        match self.fallback {
            FallbackOutcome::Approve => PurchaseOutcome::Purchased {
                transaction_id: uuid::Uuid::new_v4().to_string(),
            },
            FallbackOutcome::Cancel => PurchaseOutcome::Cancelled,
        }
    }
}
