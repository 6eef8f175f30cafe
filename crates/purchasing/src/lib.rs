//! Purchasing-side reconciliation: purchase orders, vendor bills against the
//! goods-received/not-invoiced (GRNI) clearing account, and landed-cost
//! allocation onto received stock.

pub mod billing;
pub mod document;
pub mod landed_cost;

pub use billing::{BillingService, VendorBillOutcome};
pub use document::{DocumentRegistry, DocumentStatus, DocumentType, OrderLine, PurchaseDocument};
pub use landed_cost::{
    LandedCostAllocation, LandedCostBatch, LandedCostOutcome, LandedCostService, LandedCostStatus,
};
