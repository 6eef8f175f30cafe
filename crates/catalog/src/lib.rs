//! Catalog collaborator record types.
//!
//! Items and locations are created and maintained outside this workspace;
//! the engine receives them fully resolved (including ledger account
//! mappings) and treats a missing mapping as a precondition failure rather
//! than auto-creating accounts.

pub mod item;

pub use item::{AccountMapping, CostingMethod, InventoryItem, InventoryLocation, ItemType};
