//! Inventory Ledger domain module.
//!
//! Keyed stock records with a single quantity counter. This crate holds the
//! records and their pure rules; the guarded increment/decrement primitives
//! live on the storage boundary (`siteops-infra`).

pub mod item;
pub mod key;
pub mod movement;

pub use item::InventoryItem;
pub use key::{normalize_name, InventoryKey};
pub use movement::{InventoryMovement, MovementKind, MovementReference};
