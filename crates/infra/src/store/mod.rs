//! Transactional persistence boundary.
//!
//! A [`Store`] opens [`Transaction`]s. A transaction implements every
//! repository trait; writes become visible together on [`Transaction::commit`],
//! and dropping an uncommitted transaction discards them. Stock counters only
//! change through [`InventoryLedger::increment`],
//! [`InventoryLedger::credit_by_key`] and the guarded
//! [`InventoryLedger::conditional_decrement`].

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use siteops_core::{
    DispatchId, DispatchItemId, GrnId, InventoryItemId, PurchaseId, PurchaseOrderId,
    RequisitionId,
};
use siteops_dispatch::{Dispatch, DispatchItem, ReturnRecord};
use siteops_inventory::{InventoryItem, InventoryKey, InventoryMovement};
use siteops_purchasing::{Grn, PurchaseOrder, Requisition, SitePurchase};

pub use in_memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};

/// Storage failure. Domain rule violations never show up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage timed out: {0}")]
    Timeout(String),

    #[error("storage lock poisoned")]
    Poisoned,

    /// A stored row could not be turned back into a domain record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RequisitionRepository: Send {
    async fn requisition(&mut self, id: RequisitionId) -> StoreResult<Option<Requisition>>;
    /// Same as [`Self::requisition`], holding a row lock until commit.
    async fn requisition_for_update(&mut self, id: RequisitionId)
    -> StoreResult<Option<Requisition>>;
    async fn insert_requisition(&mut self, requisition: &Requisition) -> StoreResult<()>;
    async fn update_requisition(&mut self, requisition: &Requisition) -> StoreResult<()>;
}

#[async_trait]
pub trait PurchaseOrderRepository: Send {
    async fn purchase_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>>;
    /// Same as [`Self::purchase_order`], holding a row lock until commit.
    async fn purchase_order_for_update(
        &mut self,
        id: PurchaseOrderId,
    ) -> StoreResult<Option<PurchaseOrder>>;
    async fn insert_purchase_order(&mut self, po: &PurchaseOrder) -> StoreResult<()>;
    /// Header fields plus line prices and totals.
    async fn update_purchase_order(&mut self, po: &PurchaseOrder) -> StoreResult<()>;
}

#[async_trait]
pub trait GrnRepository: Send {
    async fn grn(&mut self, id: GrnId) -> StoreResult<Option<Grn>>;
    /// Every GRN recorded against the order, oldest first.
    async fn grns_for_order(&mut self, po: PurchaseOrderId) -> StoreResult<Vec<Grn>>;
    async fn insert_grn(&mut self, grn: &Grn) -> StoreResult<()>;
    /// Verification status and line verdicts.
    async fn update_grn(&mut self, grn: &Grn) -> StoreResult<()>;
}

#[async_trait]
pub trait PurchaseRepository: Send {
    async fn site_purchase(&mut self, id: PurchaseId) -> StoreResult<Option<SitePurchase>>;
    async fn insert_site_purchase(&mut self, purchase: &SitePurchase) -> StoreResult<()>;
}

#[async_trait]
pub trait InventoryLedger: Send {
    async fn inventory_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>>;
    async fn inventory_by_key(&mut self, key: &InventoryKey) -> StoreResult<Option<InventoryItem>>;
    async fn inventory_by_purchase(&mut self, purchase: PurchaseId)
    -> StoreResult<Option<InventoryItem>>;
    async fn insert_inventory(&mut self, item: &InventoryItem) -> StoreResult<()>;

    /// Add `amount` to the record's quantity (and its mirror).
    async fn increment(&mut self, id: InventoryItemId, amount: i64) -> StoreResult<()>;

    /// Add `fresh.quantity` to the record sharing `fresh`'s key, inserting
    /// `fresh` when there is none, as one statement. Returns the id of the
    /// record that was credited.
    async fn credit_by_key(&mut self, fresh: &InventoryItem) -> StoreResult<InventoryItemId>;

    /// Subtract `amount` only if at least that much is on hand, as one
    /// conditional update. `false` means nothing changed.
    async fn conditional_decrement(&mut self, id: InventoryItemId, amount: i64)
    -> StoreResult<bool>;
}

#[async_trait]
pub trait DispatchRepository: Send {
    async fn dispatch(&mut self, id: DispatchId) -> StoreResult<Option<Dispatch>>;
    /// Same as [`Self::dispatch`], holding a row lock until commit.
    async fn dispatch_for_update(&mut self, id: DispatchId) -> StoreResult<Option<Dispatch>>;
    async fn dispatch_of_item(&mut self, item: DispatchItemId) -> StoreResult<Option<DispatchId>>;
    async fn insert_dispatch(&mut self, dispatch: &Dispatch) -> StoreResult<()>;
    /// Header fields only.
    async fn update_dispatch(&mut self, dispatch: &Dispatch) -> StoreResult<()>;
    async fn upsert_dispatch_items(&mut self, items: &[DispatchItem]) -> StoreResult<()>;
    async fn delete_dispatch_items(&mut self, ids: &[DispatchItemId]) -> StoreResult<()>;
}

#[async_trait]
pub trait ReturnRepository: Send {
    /// Σ quantity of return records for the line.
    async fn returned_total(&mut self, item: DispatchItemId) -> StoreResult<i64>;
    async fn insert_return(&mut self, record: &ReturnRecord) -> StoreResult<()>;
}

/// One unit of work across all repositories.
#[async_trait]
pub trait Transaction:
    RequisitionRepository
    + PurchaseOrderRepository
    + GrnRepository
    + PurchaseRepository
    + InventoryLedger
    + DispatchRepository
    + ReturnRepository
    + Send
    + Sized
{
    async fn commit(self) -> StoreResult<()>;
}

#[async_trait]
pub trait Store: Send + Sync {
    type Tx: Transaction + 'static;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// Append-only movement log, written outside the business transaction.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record_movement(&self, movement: &InventoryMovement) -> StoreResult<()>;
}
