//! Purchasing domain module: requisitions, purchase orders, goods received
//! notes and the quantity-conservation rules that bind them.
//!
//! Pure, deterministic domain logic (no IO, no storage). The infrastructure
//! layer loads records, calls into this crate inside one transaction, and
//! persists what comes back.

pub mod grn;
pub mod order;
pub mod receipt;
pub mod requisition;
pub mod site_purchase;
pub mod status;
pub mod variance;
pub mod verification;

pub use grn::{Grn, GrnItem, GrnStatus, LineVerdict};
pub use order::{
    PriceEdit, PurchaseOrder, PurchaseOrderItem, PurchaseOrderLine, PurchaseOrderStatus, Vendor,
};
pub use receipt::{plan_receipt, DeliveryLine, ReceiptPlan};
pub use requisition::{Requisition, RequisitionItem, RequisitionStatus};
pub use site_purchase::SitePurchase;
pub use status::{derive_status, line_progress, LineProgress, UsageBasis};
pub use variance::{summarize_variance, VarianceLine, VarianceSummary};
pub use verification::{verify_batch, GrnVerification, InventoryCredit, VerificationOutcome};
