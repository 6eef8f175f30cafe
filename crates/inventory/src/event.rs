use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    normalize_money, normalize_qty, BatchRef, DocumentId, EventId, ItemId, LocationId, TenantId,
    UserId,
};

/// Kind of inventory movement or valuation fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryEventType {
    StockReceived,
    StockShipped,
    StockAdjusted,
    StockCommitted,
    StockUncommitted,
    PoCreated,
    PoUpdated,
    PoCancelled,
    VendorBillPosted,
    StockLandedCostAllocated,
}

impl InventoryEventType {
    /// Stable event name (e.g. for logs and serialized streams).
    pub fn name(self) -> &'static str {
        match self {
            InventoryEventType::StockReceived => "stock.received",
            InventoryEventType::StockShipped => "stock.shipped",
            InventoryEventType::StockAdjusted => "stock.adjusted",
            InventoryEventType::StockCommitted => "stock.committed",
            InventoryEventType::StockUncommitted => "stock.uncommitted",
            InventoryEventType::PoCreated => "po.created",
            InventoryEventType::PoUpdated => "po.updated",
            InventoryEventType::PoCancelled => "po.cancelled",
            InventoryEventType::VendorBillPosted => "vendor_bill.posted",
            InventoryEventType::StockLandedCostAllocated => "stock.landed_cost_allocated",
        }
    }

    /// Whether the event moves physical on-hand stock (and thus participates
    /// in cost-layer replay).
    pub fn moves_on_hand(self) -> bool {
        matches!(
            self,
            InventoryEventType::StockReceived
                | InventoryEventType::StockShipped
                | InventoryEventType::StockAdjusted
        )
    }

    /// Provenance-only events never carry quantity.
    pub fn is_provenance(self) -> bool {
        matches!(
            self,
            InventoryEventType::VendorBillPosted | InventoryEventType::StockLandedCostAllocated
        )
    }
}

/// One FIFO layer draw within a consuming event.
///
/// `batch_ref` is `None` for the synthesized zero-cost layer used when the
/// replayed history cannot cover the requested quantity (inconsistent or
/// incomplete history; the operation stays auditable instead of failing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConsumption {
    pub batch_ref: Option<BatchRef>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

impl LayerConsumption {
    pub fn cost(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

/// Recorded FIFO layer breakdown on a consuming event.
///
/// Persisted so later replays (batch-remaining queries at bill time) can use
/// the layers this event actually drew from instead of re-deriving them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionBreakdown {
    pub layers: Vec<LayerConsumption>,
}

impl ConsumptionBreakdown {
    pub fn total_cost(&self) -> Decimal {
        self.layers.iter().map(LayerConsumption::cost).sum()
    }

    pub fn total_quantity(&self) -> Decimal {
        self.layers.iter().map(|l| l.quantity).sum()
    }

    /// Whether any layer was synthesized from exhausted history.
    pub fn has_unknown_layer(&self) -> bool {
        self.layers.iter().any(|l| l.batch_ref.is_none())
    }
}

/// The append-only fact: one inventory movement or valuation marker.
///
/// Immutable once stored; never updated or deleted. Quantities and unit
/// costs are 4-decimal fixed point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEvent {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub event_type: InventoryEventType,
    /// Signed quantity effect. Zero for provenance events.
    pub quantity_delta: Decimal,
    pub unit_cost: Option<Decimal>,
    /// FIFO cost layer minted by a receiving event.
    pub batch_ref: Option<BatchRef>,
    pub source_reference: String,
    pub purchase_document: Option<DocumentId>,
    pub consumption: Option<ConsumptionBreakdown>,
    pub reason: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl InventoryEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn received(
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        quantity: Decimal,
        unit_cost: Decimal,
        batch_ref: BatchRef,
        source_reference: impl Into<String>,
        purchase_document: Option<DocumentId>,
        actor: UserId,
    ) -> Self {
        Self {
            tenant_id,
            item_id,
            location_id,
            event_type: InventoryEventType::StockReceived,
            quantity_delta: normalize_qty(quantity),
            unit_cost: Some(normalize_money(unit_cost)),
            batch_ref: Some(batch_ref),
            source_reference: source_reference.into(),
            purchase_document,
            consumption: None,
            reason: None,
            actor,
            occurred_at: Utc::now(),
        }
    }

    pub fn shipped(
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        quantity: Decimal,
        unit_cost: Decimal,
        consumption: Option<ConsumptionBreakdown>,
        source_reference: impl Into<String>,
        actor: UserId,
    ) -> Self {
        Self {
            tenant_id,
            item_id,
            location_id,
            event_type: InventoryEventType::StockShipped,
            quantity_delta: -normalize_qty(quantity),
            unit_cost: Some(normalize_money(unit_cost)),
            batch_ref: None,
            source_reference: source_reference.into(),
            purchase_document: None,
            consumption,
            reason: None,
            actor,
            occurred_at: Utc::now(),
        }
    }

    /// Count adjustment: `delta` is signed (negative = shrinkage, positive = gain).
    pub fn adjusted(
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        delta: Decimal,
        unit_cost: Decimal,
        consumption: Option<ConsumptionBreakdown>,
        reason: impl Into<String>,
        actor: UserId,
    ) -> Self {
        let delta = normalize_qty(delta);
        Self {
            tenant_id,
            item_id,
            location_id,
            event_type: InventoryEventType::StockAdjusted,
            quantity_delta: delta,
            unit_cost: Some(normalize_money(unit_cost)),
            batch_ref: if delta > Decimal::ZERO {
                Some(BatchRef::new())
            } else {
                None
            },
            source_reference: "count_adjustment".to_string(),
            purchase_document: None,
            consumption,
            reason: Some(reason.into()),
            actor,
            occurred_at: Utc::now(),
        }
    }

    pub fn committed(
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        quantity: Decimal,
        reference: impl Into<String>,
        actor: UserId,
    ) -> Self {
        Self {
            tenant_id,
            item_id,
            location_id,
            event_type: InventoryEventType::StockCommitted,
            quantity_delta: normalize_qty(quantity),
            unit_cost: None,
            batch_ref: None,
            source_reference: reference.into(),
            purchase_document: None,
            consumption: None,
            reason: None,
            actor,
            occurred_at: Utc::now(),
        }
    }

    pub fn uncommitted(
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        quantity: Decimal,
        reference: impl Into<String>,
        actor: UserId,
    ) -> Self {
        Self {
            tenant_id,
            item_id,
            location_id,
            event_type: InventoryEventType::StockUncommitted,
            quantity_delta: -normalize_qty(quantity),
            unit_cost: None,
            batch_ref: None,
            source_reference: reference.into(),
            purchase_document: None,
            consumption: None,
            reason: None,
            actor,
            occurred_at: Utc::now(),
        }
    }

    /// Purchase-order lifecycle event moving expected-on-order quantity.
    pub fn purchase_order(
        event_type: InventoryEventType,
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        quantity_delta: Decimal,
        document: DocumentId,
        source_reference: impl Into<String>,
        actor: UserId,
    ) -> Self {
        debug_assert!(matches!(
            event_type,
            InventoryEventType::PoCreated
                | InventoryEventType::PoUpdated
                | InventoryEventType::PoCancelled
        ));
        Self {
            tenant_id,
            item_id,
            location_id,
            event_type,
            quantity_delta: normalize_qty(quantity_delta),
            unit_cost: None,
            batch_ref: None,
            source_reference: source_reference.into(),
            purchase_document: Some(document),
            consumption: None,
            reason: None,
            actor,
            occurred_at: Utc::now(),
        }
    }

    /// Zero-quantity provenance marker. Must never affect balances.
    pub fn provenance(
        event_type: InventoryEventType,
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        source_reference: impl Into<String>,
        purchase_document: Option<DocumentId>,
        actor: UserId,
    ) -> Self {
        debug_assert!(event_type.is_provenance());
        Self {
            tenant_id,
            item_id,
            location_id,
            event_type,
            quantity_delta: Decimal::ZERO,
            unit_cost: None,
            batch_ref: None,
            source_reference: source_reference.into(),
            purchase_document,
            consumption: None,
            reason: None,
            actor,
            occurred_at: Utc::now(),
        }
    }
}

/// A persisted event: the fact plus its position in the row stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,
    /// Monotonically increasing position in the (tenant, item, location) stream.
    pub sequence_number: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: InventoryEvent,
}

impl core::ops::Deref for StoredEvent {
    type Target = InventoryEvent;

    fn deref(&self) -> &Self::Target {
        &self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn receive_mints_a_batch_and_carries_positive_delta() {
        let ev = InventoryEvent::received(
            TenantId::new(),
            ItemId::new(),
            LocationId::new(),
            dec!(10),
            dec!(2.5),
            BatchRef::new(),
            "po:PO-1",
            None,
            UserId::new(),
        );
        assert_eq!(ev.event_type, InventoryEventType::StockReceived);
        assert_eq!(ev.quantity_delta, dec!(10));
        assert!(ev.batch_ref.is_some());
    }

    #[test]
    fn ship_negates_quantity() {
        let ev = InventoryEvent::shipped(
            TenantId::new(),
            ItemId::new(),
            LocationId::new(),
            dec!(4),
            dec!(2.5),
            None,
            "so:SO-9",
            UserId::new(),
        );
        assert_eq!(ev.quantity_delta, dec!(-4));
    }

    #[test]
    fn constructors_clamp_quantities_and_costs_to_carried_scale() {
        let ev = InventoryEvent::received(
            TenantId::new(),
            ItemId::new(),
            LocationId::new(),
            dec!(2.00005),
            dec!(1.23456),
            BatchRef::new(),
            "po:PO-1",
            None,
            UserId::new(),
        );
        assert_eq!(ev.quantity_delta, dec!(2.0001));
        assert_eq!(ev.unit_cost, Some(dec!(1.2346)));

        let ev = InventoryEvent::shipped(
            TenantId::new(),
            ItemId::new(),
            LocationId::new(),
            dec!(4.00004),
            dec!(2.5),
            None,
            "so:SO-9",
            UserId::new(),
        );
        assert_eq!(ev.quantity_delta, dec!(-4.0000));
    }

    #[test]
    fn provenance_events_carry_zero_quantity() {
        let ev = InventoryEvent::provenance(
            InventoryEventType::VendorBillPosted,
            TenantId::new(),
            ItemId::new(),
            LocationId::new(),
            "bill:B-1",
            None,
            UserId::new(),
        );
        assert_eq!(ev.quantity_delta, Decimal::ZERO);
        assert!(ev.event_type.is_provenance());
    }

    #[test]
    fn stored_events_serialize_flat_with_snake_case_types() {
        let stored = StoredEvent {
            event_id: EventId::new(),
            sequence_number: 7,
            recorded_at: Utc::now(),
            event: InventoryEvent::received(
                TenantId::new(),
                ItemId::new(),
                LocationId::new(),
                dec!(10),
                dec!(2.5),
                BatchRef::new(),
                "po:PO-1",
                None,
                UserId::new(),
            ),
        };

        let json = serde_json::to_value(&stored).unwrap();
        // The event's fields flatten into the stored envelope.
        assert_eq!(json["event_type"], "stock_received");
        assert_eq!(json["sequence_number"], 7);
        assert_eq!(json["source_reference"], "po:PO-1");
        assert!(json.get("event").is_none());
    }

    #[test]
    fn breakdown_totals_sum_layer_draws() {
        let breakdown = ConsumptionBreakdown {
            layers: vec![
                LayerConsumption {
                    batch_ref: Some(BatchRef::new()),
                    quantity: dec!(10),
                    unit_cost: dec!(2),
                },
                LayerConsumption {
                    batch_ref: Some(BatchRef::new()),
                    quantity: dec!(5),
                    unit_cost: dec!(3),
                },
            ],
        };
        assert_eq!(breakdown.total_cost(), dec!(35));
        assert_eq!(breakdown.total_quantity(), dec!(15));
        assert!(!breakdown.has_unknown_layer());
    }
}
