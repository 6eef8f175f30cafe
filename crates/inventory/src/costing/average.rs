//! Weighted-average (AVCO) costing.
//!
//! Replays the stream into a running (quantity, value) pair: positive
//! on-hand events add quantity × unit cost, negative events remove at the
//! unit cost the historical event recorded, falling back to the running
//! average when no cost was recorded.

use rust_decimal::Decimal;

use crate::event::StoredEvent;

use super::{CostingEngine, ShipmentCost};

fn running_state(stream: &[StoredEvent]) -> (Decimal, Decimal) {
    let mut qty = Decimal::ZERO;
    let mut value = Decimal::ZERO;

    for event in stream {
        if !event.event_type.moves_on_hand() {
            continue;
        }
        let delta = event.quantity_delta;
        if delta > Decimal::ZERO {
            value += delta * event.unit_cost.unwrap_or(Decimal::ZERO);
            qty += delta;
        } else if delta < Decimal::ZERO {
            let average = if qty > Decimal::ZERO {
                value / qty
            } else {
                Decimal::ZERO
            };
            let unit = event.unit_cost.filter(|c| *c > Decimal::ZERO).unwrap_or(average);
            value -= (-delta) * unit;
            qty += delta;
            // Depleted stock carries no residual value.
            if qty <= Decimal::ZERO || value < Decimal::ZERO {
                value = Decimal::ZERO;
            }
        }
    }

    (qty, value)
}

/// Weighted-average cost flow.
#[derive(Debug, Default)]
pub struct AverageEngine;

impl CostingEngine for AverageEngine {
    fn cost_of_shipment(&self, stream: &[StoredEvent], quantity: Decimal) -> ShipmentCost {
        let unit_cost = self.current_unit_cost(stream);
        ShipmentCost {
            total_cost: quantity * unit_cost,
            unit_cost,
            consumption: None,
        }
    }

    fn current_unit_cost(&self, stream: &[StoredEvent]) -> Decimal {
        let (qty, value) = running_state(stream);
        if qty > Decimal::ZERO {
            value / qty
        } else {
            Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InventoryEvent;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockbook_core::{BatchRef, EventId, ItemId, LocationId, TenantId, UserId};

    fn stored(event: InventoryEvent, seq: u64) -> StoredEvent {
        StoredEvent {
            event_id: EventId::new(),
            sequence_number: seq,
            recorded_at: Utc::now(),
            event,
        }
    }

    fn receipt(
        tenant: TenantId,
        item: ItemId,
        loc: LocationId,
        qty: Decimal,
        cost: Decimal,
        seq: u64,
    ) -> StoredEvent {
        stored(
            InventoryEvent::received(
                tenant,
                item,
                loc,
                qty,
                cost,
                BatchRef::new(),
                "po:1",
                None,
                UserId::new(),
            ),
            seq,
        )
    }

    #[test]
    fn average_blends_receipt_costs() {
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());
        let stream = vec![
            receipt(tenant, item, loc, dec!(10), dec!(2.00), 1),
            receipt(tenant, item, loc, dec!(10), dec!(3.00), 2),
        ];
        assert_eq!(AverageEngine.current_unit_cost(&stream), dec!(2.50));
    }

    #[test]
    fn shipment_at_average_leaves_average_unchanged() {
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());
        let mut stream = vec![
            receipt(tenant, item, loc, dec!(10), dec!(2.00), 1),
            receipt(tenant, item, loc, dec!(10), dec!(3.00), 2),
        ];

        let cost = AverageEngine.cost_of_shipment(&stream, dec!(4));
        assert_eq!(cost.total_cost, dec!(10.00));
        assert_eq!(cost.unit_cost, dec!(2.50));

        stream.push(stored(
            InventoryEvent::shipped(tenant, item, loc, dec!(4), cost.unit_cost, None, "so:1", UserId::new()),
            3,
        ));
        assert_eq!(AverageEngine.current_unit_cost(&stream), dec!(2.50));
    }

    #[test]
    fn recorded_unit_cost_wins_over_running_average() {
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());
        let mut stream = vec![
            receipt(tenant, item, loc, dec!(10), dec!(2.00), 1),
            receipt(tenant, item, loc, dec!(10), dec!(4.00), 2),
        ];
        // Historical shipment explicitly valued at 2.00, not the 3.00 average.
        stream.push(stored(
            InventoryEvent::shipped(tenant, item, loc, dec!(10), dec!(2.00), None, "so:1", UserId::new()),
            3,
        ));

        // 10 units remain carrying the residual 40.00 value.
        assert_eq!(AverageEngine.current_unit_cost(&stream), dec!(4.00));
    }

    #[test]
    fn empty_and_depleted_history_have_zero_average() {
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());
        assert_eq!(AverageEngine.current_unit_cost(&[]), Decimal::ZERO);

        let mut stream = vec![receipt(tenant, item, loc, dec!(5), dec!(2.00), 1)];
        stream.push(stored(
            InventoryEvent::shipped(tenant, item, loc, dec!(5), dec!(2.00), None, "so:1", UserId::new()),
            2,
        ));
        assert_eq!(AverageEngine.current_unit_cost(&stream), Decimal::ZERO);
    }
}
