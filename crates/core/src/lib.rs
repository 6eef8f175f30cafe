//! `stockbook-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error taxonomy, and the fixed-point
//! decimal conventions shared by every other crate.

pub mod decimal;
pub mod error;
pub mod id;

pub use decimal::{normalize_money, normalize_qty, round_money, MONEY_SCALE, POSTING_SCALE, QTY_SCALE};
pub use error::{DomainError, DomainResult};
pub use id::{BatchId, BatchRef, DocumentId, EventId, ItemId, LocationId, TenantId, UserId};
