//! FIFO layer replay.
//!
//! Reconstructs the ordered queue of open cost layers from the stream:
//! positive on-hand events push (or merge into) a layer keyed by their batch
//! reference, negative events pop from the front, splitting the oldest layer
//! when it does not fully cover. Consuming events that recorded their layer
//! breakdown are replayed from that record, so FIFO order never has to be
//! re-derived for history that already knows what it consumed.

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;

use stockbook_core::BatchRef;

use crate::event::{ConsumptionBreakdown, LayerConsumption, StoredEvent};

use super::{CostingEngine, ShipmentCost};

#[derive(Debug, Clone)]
struct Layer {
    batch_ref: Option<BatchRef>,
    qty_remaining: Decimal,
    unit_cost: Decimal,
}

fn push_layer(layers: &mut VecDeque<Layer>, batch_ref: Option<BatchRef>, qty: Decimal, unit_cost: Decimal) {
    if let Some(batch) = batch_ref {
        // A repeated receipt under the same batch reference tops up its layer.
        if let Some(layer) = layers
            .iter_mut()
            .find(|l| l.batch_ref == Some(batch) && l.unit_cost == unit_cost)
        {
            layer.qty_remaining += qty;
            return;
        }
    }
    layers.push_back(Layer {
        batch_ref,
        qty_remaining: qty,
        unit_cost,
    });
}

fn consume_front(layers: &mut VecDeque<Layer>, mut qty: Decimal) {
    while qty > Decimal::ZERO {
        let Some(front) = layers.front_mut() else {
            // History is short; nothing left to consume from.
            return;
        };
        let take = front.qty_remaining.min(qty);
        front.qty_remaining -= take;
        qty -= take;
        if front.qty_remaining <= Decimal::ZERO {
            layers.pop_front();
        }
    }
}

fn consume_recorded(layers: &mut VecDeque<Layer>, breakdown: &ConsumptionBreakdown) {
    for draw in &breakdown.layers {
        let Some(batch) = draw.batch_ref else {
            // Unknown-layer draws never had backing stock.
            continue;
        };
        let mut remaining = draw.quantity;
        if let Some(pos) = layers.iter().position(|l| l.batch_ref == Some(batch)) {
            let take = layers[pos].qty_remaining.min(remaining);
            layers[pos].qty_remaining -= take;
            remaining -= take;
            if layers[pos].qty_remaining <= Decimal::ZERO {
                layers.remove(pos);
            }
        }
        if remaining > Decimal::ZERO {
            consume_front(layers, remaining);
        }
    }
}

fn open_layers(stream: &[StoredEvent]) -> VecDeque<Layer> {
    let mut layers = VecDeque::new();
    for event in stream {
        if !event.event_type.moves_on_hand() {
            continue;
        }
        let delta = event.quantity_delta;
        if delta > Decimal::ZERO {
            push_layer(
                &mut layers,
                event.batch_ref,
                delta,
                event.unit_cost.unwrap_or(Decimal::ZERO),
            );
        } else if delta < Decimal::ZERO {
            match &event.consumption {
                Some(breakdown) => consume_recorded(&mut layers, breakdown),
                None => consume_front(&mut layers, -delta),
            }
        }
    }
    layers
}

/// Remaining quantity per open batch reference.
pub fn batch_remaining(stream: &[StoredEvent]) -> HashMap<BatchRef, Decimal> {
    open_layers(stream)
        .into_iter()
        .filter_map(|l| l.batch_ref.map(|b| (b, l.qty_remaining)))
        .collect()
}

/// First-in-first-out cost flow.
#[derive(Debug, Default)]
pub struct FifoEngine;

impl CostingEngine for FifoEngine {
    fn cost_of_shipment(&self, stream: &[StoredEvent], quantity: Decimal) -> ShipmentCost {
        let mut layers = open_layers(stream);
        let mut remaining = quantity;
        let mut draws = Vec::new();
        let mut total_cost = Decimal::ZERO;

        while remaining > Decimal::ZERO {
            match layers.pop_front() {
                Some(mut layer) => {
                    let take = layer.qty_remaining.min(remaining);
                    draws.push(LayerConsumption {
                        batch_ref: layer.batch_ref,
                        quantity: take,
                        unit_cost: layer.unit_cost,
                    });
                    total_cost += take * layer.unit_cost;
                    remaining -= take;
                    layer.qty_remaining -= take;
                    if layer.qty_remaining > Decimal::ZERO {
                        layers.push_front(layer);
                    }
                }
                None => {
                    // History exhausted: record a zero-cost unknown layer so
                    // the operation stays auditable instead of failing here.
                    draws.push(LayerConsumption {
                        batch_ref: None,
                        quantity: remaining,
                        unit_cost: Decimal::ZERO,
                    });
                    remaining = Decimal::ZERO;
                }
            }
        }

        let unit_cost = if quantity > Decimal::ZERO {
            total_cost / quantity
        } else {
            Decimal::ZERO
        };

        ShipmentCost {
            total_cost,
            unit_cost,
            consumption: Some(ConsumptionBreakdown { layers: draws }),
        }
    }

    fn current_unit_cost(&self, stream: &[StoredEvent]) -> Decimal {
        open_layers(stream)
            .front()
            .map(|l| l.unit_cost)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InventoryEvent;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockbook_core::{EventId, ItemId, LocationId, TenantId, UserId};

    struct Ctx {
        tenant: TenantId,
        item: ItemId,
        loc: LocationId,
        actor: UserId,
        seq: u64,
    }

    impl Ctx {
        fn new() -> Self {
            Self {
                tenant: TenantId::new(),
                item: ItemId::new(),
                loc: LocationId::new(),
                actor: UserId::new(),
                seq: 0,
            }
        }

        fn store(&mut self, event: InventoryEvent) -> StoredEvent {
            self.seq += 1;
            StoredEvent {
                event_id: EventId::new(),
                sequence_number: self.seq,
                recorded_at: Utc::now(),
                event,
            }
        }

        fn receipt(&mut self, qty: Decimal, cost: Decimal) -> StoredEvent {
            let ev = InventoryEvent::received(
                self.tenant,
                self.item,
                self.loc,
                qty,
                cost,
                BatchRef::new(),
                "po:1",
                None,
                self.actor,
            );
            self.store(ev)
        }

        fn shipment(&mut self, qty: Decimal, breakdown: Option<ConsumptionBreakdown>) -> StoredEvent {
            let ev = InventoryEvent::shipped(
                self.tenant,
                self.item,
                self.loc,
                qty,
                Decimal::ZERO,
                breakdown,
                "so:1",
                self.actor,
            );
            self.store(ev)
        }
    }

    #[test]
    fn consumes_oldest_layers_first() {
        let mut ctx = Ctx::new();
        let stream = vec![ctx.receipt(dec!(10), dec!(2.00)), ctx.receipt(dec!(10), dec!(3.00))];

        let cost = FifoEngine.cost_of_shipment(&stream, dec!(15));
        assert_eq!(cost.total_cost, dec!(35.00));

        let layers = &cost.consumption.as_ref().unwrap().layers;
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].quantity, dec!(10));
        assert_eq!(layers[0].unit_cost, dec!(2.00));
        assert_eq!(layers[1].quantity, dec!(5));
        assert_eq!(layers[1].unit_cost, dec!(3.00));
    }

    #[test]
    fn shipment_splits_the_oldest_layer_on_replay() {
        let mut ctx = Ctx::new();
        let mut stream = vec![ctx.receipt(dec!(10), dec!(2.00)), ctx.receipt(dec!(10), dec!(3.00))];

        let first = FifoEngine.cost_of_shipment(&stream, dec!(15));
        stream.push(ctx.shipment(dec!(15), first.consumption.clone()));

        // 5 units remain, all on the 3.00 layer.
        let remaining = batch_remaining(&stream);
        assert_eq!(remaining.len(), 1);
        let (_, qty) = remaining.into_iter().next().unwrap();
        assert_eq!(qty, dec!(5));
        assert_eq!(FifoEngine.current_unit_cost(&stream), dec!(3.00));
    }

    #[test]
    fn replay_without_recorded_breakdown_matches_recorded_replay() {
        let mut a = Ctx::new();
        let mut b = Ctx::new();

        let mut with_record = vec![a.receipt(dec!(10), dec!(2.00)), a.receipt(dec!(10), dec!(3.00))];
        let cost = FifoEngine.cost_of_shipment(&with_record, dec!(12));
        with_record.push(a.shipment(dec!(12), cost.consumption));

        let mut without_record =
            vec![b.receipt(dec!(10), dec!(2.00)), b.receipt(dec!(10), dec!(3.00))];
        without_record.push(b.shipment(dec!(12), None));

        let follow_a = FifoEngine.cost_of_shipment(&with_record, dec!(8));
        let follow_b = FifoEngine.cost_of_shipment(&without_record, dec!(8));
        assert_eq!(follow_a.total_cost, follow_b.total_cost);
        assert_eq!(follow_a.total_cost, dec!(24.00));
    }

    #[test]
    fn exhausted_history_synthesizes_a_zero_cost_layer() {
        let mut ctx = Ctx::new();
        let stream = vec![ctx.receipt(dec!(10), dec!(2.00))];

        let cost = FifoEngine.cost_of_shipment(&stream, dec!(12));
        assert_eq!(cost.total_cost, dec!(20.00));

        let breakdown = cost.consumption.unwrap();
        assert!(breakdown.has_unknown_layer());
        let unknown = breakdown.layers.last().unwrap();
        assert_eq!(unknown.batch_ref, None);
        assert_eq!(unknown.quantity, dec!(2));
        assert_eq!(unknown.unit_cost, Decimal::ZERO);
    }

    #[test]
    fn empty_history_has_no_cost_basis() {
        assert_eq!(FifoEngine.current_unit_cost(&[]), Decimal::ZERO);
        let cost = FifoEngine.cost_of_shipment(&[], dec!(3));
        assert_eq!(cost.total_cost, Decimal::ZERO);
        assert!(cost.consumption.unwrap().has_unknown_layer());
    }

    #[test]
    fn batch_remaining_tracks_partial_draws_per_batch() {
        let mut ctx = Ctx::new();
        let first = ctx.receipt(dec!(10), dec!(2.00));
        let first_batch = first.batch_ref.unwrap();
        let second = ctx.receipt(dec!(10), dec!(3.00));
        let second_batch = second.batch_ref.unwrap();
        let mut stream = vec![first, second];

        let cost = FifoEngine.cost_of_shipment(&stream, dec!(4));
        stream.push(ctx.shipment(dec!(4), cost.consumption));

        let remaining = batch_remaining(&stream);
        assert_eq!(remaining.get(&first_batch).copied(), Some(dec!(6)));
        assert_eq!(remaining.get(&second_batch).copied(), Some(dec!(10)));
    }
}
