//! Cost-flow engines.
//!
//! Both engines are pure functions over a replayed event stream: they never
//! mutate anything and never look at the balance cache. The engine for an
//! operation is selected once per item from its stored costing method.

use rust_decimal::Decimal;

use stockbook_catalog::CostingMethod;

use crate::event::{ConsumptionBreakdown, StoredEvent};

pub mod average;
pub mod fifo;

pub use average::AverageEngine;
pub use fifo::{batch_remaining, FifoEngine};

/// Answer to "what does consuming this quantity cost right now?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentCost {
    pub total_cost: Decimal,
    /// Effective per-unit cost (total / quantity).
    pub unit_cost: Decimal,
    /// FIFO layer breakdown; `None` for weighted-average costing.
    pub consumption: Option<ConsumptionBreakdown>,
}

/// Strategy interface over the two cost-flow algorithms.
pub trait CostingEngine: Send + Sync {
    /// Cost of consuming `quantity` given the stream's current state.
    fn cost_of_shipment(&self, stream: &[StoredEvent], quantity: Decimal) -> ShipmentCost;

    /// Unit cost the next consumed unit would bear (0 with no cost basis).
    fn current_unit_cost(&self, stream: &[StoredEvent]) -> Decimal;
}

static FIFO: FifoEngine = FifoEngine;
static AVERAGE: AverageEngine = AverageEngine;

/// Engine for an item's stored costing method.
pub fn engine_for(method: CostingMethod) -> &'static dyn CostingEngine {
    match method {
        CostingMethod::Fifo => &FIFO,
        CostingMethod::Avco => &AVERAGE,
    }
}
