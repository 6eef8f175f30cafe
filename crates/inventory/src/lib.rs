//! Inventory ledger & costing engine.
//!
//! The append-only movement log is the source of truth; the balance cache is
//! a denormalized per (tenant, item, location) summary kept consistent with
//! the log under an exclusive per-row lock. Costing engines are pure replays
//! of the log. Movement operations tie validation, costing, the event
//! append, the balance update and the journal post into one failure-atomic
//! unit.

pub mod balance;
pub mod costing;
pub mod event;
pub mod movements;
pub mod query;
pub mod store;

pub use balance::InventoryBalance;
pub use costing::{engine_for, AverageEngine, CostingEngine, FifoEngine, ShipmentCost};
pub use event::{
    ConsumptionBreakdown, InventoryEvent, InventoryEventType, LayerConsumption, StoredEvent,
};
pub use movements::{ControlAccounts, MovementOutcome, MovementService};
pub use query::StockQueries;
pub use store::{find_row_txn, InventoryStore, RowTxn};
