use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, EventId, ItemId, LocationId, TenantId};

use crate::event::{InventoryEventType, StoredEvent};

/// Denormalized per (tenant, item, location) stock summary.
///
/// Invariant: `qty_on_hand`, `qty_committed` and `qty_on_order` are all ≥ 0
/// at all times. `qty_available` is derived and never stored. Rows are
/// created lazily at zero on the first event for a pair and updated exactly
/// once per appended event, inside the same atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBalance {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub qty_on_hand: Decimal,
    pub qty_committed: Decimal,
    pub qty_on_order: Decimal,
    pub last_event: Option<EventId>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryBalance {
    pub fn new(tenant_id: TenantId, item_id: ItemId, location_id: LocationId) -> Self {
        Self {
            tenant_id,
            item_id,
            location_id,
            qty_on_hand: Decimal::ZERO,
            qty_committed: Decimal::ZERO,
            qty_on_order: Decimal::ZERO,
            last_event: None,
            updated_at: Utc::now(),
        }
    }

    /// On-hand minus committed. Read-only; recomputed on demand.
    pub fn qty_available(&self) -> Decimal {
        self.qty_on_hand - self.qty_committed
    }

    /// Apply one stored event to this row.
    ///
    /// Computes the post-application quantities first and only assigns them
    /// once all non-negativity checks pass, so a failed apply leaves the row
    /// untouched.
    pub fn apply(&mut self, event: &StoredEvent) -> DomainResult<()> {
        let delta = event.quantity_delta;

        let mut on_hand = self.qty_on_hand;
        let mut committed = self.qty_committed;
        let mut on_order = self.qty_on_order;

        match event.event_type {
            InventoryEventType::StockReceived => {
                on_hand += delta;
                // A receipt against a purchase document fulfils expected stock.
                if event.purchase_document.is_some() {
                    on_order -= delta.min(on_order);
                }
            }
            InventoryEventType::StockShipped => {
                on_hand += delta;
                // Shipping releases any reservation it fulfils.
                let release = (-delta).min(committed);
                committed -= release;
            }
            InventoryEventType::StockAdjusted => {
                on_hand += delta;
            }
            InventoryEventType::StockCommitted | InventoryEventType::StockUncommitted => {
                committed += delta;
            }
            InventoryEventType::PoCreated | InventoryEventType::PoUpdated => {
                on_order += delta;
            }
            InventoryEventType::PoCancelled => {
                // Cancellation releases what remains on order, never below zero.
                on_order -= (-delta).min(on_order);
            }
            InventoryEventType::VendorBillPosted
            | InventoryEventType::StockLandedCostAllocated => {
                if delta != Decimal::ZERO {
                    return Err(DomainError::invalid_quantity(format!(
                        "{} events must carry zero quantity",
                        event.event_type.name()
                    )));
                }
            }
        }

        if on_hand < Decimal::ZERO {
            return Err(DomainError::negative_quantity(format!(
                "qty_on_hand would become {on_hand}"
            )));
        }
        if committed < Decimal::ZERO {
            return Err(DomainError::negative_quantity(format!(
                "qty_committed would become {committed}"
            )));
        }
        if on_order < Decimal::ZERO {
            return Err(DomainError::negative_quantity(format!(
                "qty_on_order would become {on_order}"
            )));
        }

        self.qty_on_hand = on_hand;
        self.qty_committed = committed;
        self.qty_on_order = on_order;
        self.last_event = Some(event.event_id);
        self.updated_at = event.recorded_at;

        Ok(())
    }
}
