//! `siteops-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the procurement,
//! inventory and dispatch crates (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::{find_by_id, Entity};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{
    DispatchId, DispatchItemId, GrnId, GrnItemId, InventoryItemId, MovementId, ProjectId,
    PurchaseId, PurchaseOrderId, PurchaseOrderItemId, RequisitionId, RequisitionItemId, ReturnId,
    UserId,
};
pub use value_object::{MinorUnits, ValueObject};
