//! Infrastructure layer: configuration, persistence and the reconciliation
//! engine that sequences the pure domain crates against a store.

pub mod config;
pub mod engine;
pub mod store;

pub use crate::config::{DatabaseConfig, DispatchConfig, EngineConfig};
pub use engine::{
    EngineError, EngineResult, HandoutReceipt, ReconciliationEngine, ReturnSummary,
    VerificationReport,
};
pub use store::{
    AuditLog, InMemoryStore, PostgresStore, Store, StoreError, StoreResult, Transaction,
};
