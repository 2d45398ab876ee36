//! Reconciliation engine: the typed operations over requisitions, purchase
//! orders, GRNs, inventory and dispatches.
//!
//! ## Operation flow
//!
//! ```text
//! call(actor, ...)
//!   ↓
//! 1. Resolve the actor's role and check the permission
//!   ↓
//! 2. Begin a store transaction            ┐
//!   ↓                                     │ bounded by
//! 3. Load (and lock) the records involved │ transaction_timeout_ms;
//!   ↓                                     │ expiry drops the
//! 4. Apply the pure domain decision       │ transaction (rollback)
//!   ↓                                     │
//! 5. Write everything back, commit        ┘
//!   ↓
//! 6. Best-effort: movement audit log, notification hook
//! ```
//!
//! Domain crates decide; this module only loads, persists and sequences.
//! Stock counters change through the ledger's `increment` and
//! `conditional_decrement` inside the same transaction as the records that
//! justify the change. Nothing is retried.

mod dispatch;
mod handout;
mod procurement;
mod queries;
mod returns;
mod verification;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use siteops_auth::{authorize, AuthzError, Permission, Principal, RoleResolver};
use siteops_core::{DomainError, ErrorKind, UserId};
use siteops_events::{Notification, NotificationHook, OperationsEvent};
use siteops_inventory::InventoryMovement;

use crate::config::EngineConfig;
use crate::store::{AuditLog, Store, StoreError};

pub use handout::HandoutReceipt;
pub use returns::ReturnSummary;
pub use verification::VerificationReport;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("unknown actor {0}")]
    UnknownActor(UserId),

    /// The operation ran past its budget; nothing was committed.
    #[error("{operation} exceeded its {budget_ms}ms budget")]
    Timeout {
        operation: &'static str,
        budget_ms: u64,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Domain(e) => e.kind(),
            EngineError::Store(StoreError::Timeout(_)) => ErrorKind::Timeout,
            EngineError::Store(_) => ErrorKind::Storage,
            EngineError::Forbidden(_) | EngineError::UnknownActor(_) => ErrorKind::Unauthorized,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

pub struct ReconciliationEngine<S> {
    store: Arc<S>,
    roles: Arc<dyn RoleResolver>,
    notifier: Arc<dyn NotificationHook>,
    config: EngineConfig,
}

impl<S> ReconciliationEngine<S> {
    pub fn new(
        store: Arc<S>,
        roles: Arc<dyn RoleResolver>,
        notifier: Arc<dyn NotificationHook>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            roles,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<S> ReconciliationEngine<S>
where
    S: Store + AuditLog,
{
    fn principal(&self, actor: UserId) -> EngineResult<Principal> {
        self.roles
            .resolve(actor)
            .ok_or(EngineError::UnknownActor(actor))
    }

    fn authorize(&self, actor: UserId, permission: &Permission) -> EngineResult<Principal> {
        let principal = self.principal(actor)?;
        authorize(&principal, permission)?;
        Ok(principal)
    }

    /// Run `work` (which begins and commits its own transaction) under the
    /// configured budget. On expiry the future is dropped mid-flight, taking
    /// the open transaction with it.
    async fn within_budget<T, F>(&self, operation: &'static str, work: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        let budget = self.config.transaction_timeout();
        match tokio::time::timeout(budget, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    budget_ms = self.config.transaction_timeout_ms,
                    "operation timed out; transaction rolled back"
                );
                Err(EngineError::Timeout {
                    operation,
                    budget_ms: self.config.transaction_timeout_ms,
                })
            }
        }
    }

    fn notify(&self, actor: UserId, at: DateTime<Utc>, event: OperationsEvent) {
        self.notifier.notify(Notification::new(actor, at, event));
    }

    /// Write movement records after commit. Failures are logged, never returned.
    async fn audit(&self, movements: &[InventoryMovement]) {
        for movement in movements {
            if let Err(err) = self.store.record_movement(movement).await {
                tracing::warn!(
                    movement_id = %movement.id,
                    inventory_item_id = %movement.inventory_item_id,
                    kind = movement.kind.as_str(),
                    quantity = movement.quantity,
                    error = %err,
                    "inventory movement not recorded"
                );
            }
        }
    }
}

fn not_found(what: impl std::fmt::Display) -> EngineError {
    EngineError::Domain(DomainError::not_found(what.to_string()))
}
