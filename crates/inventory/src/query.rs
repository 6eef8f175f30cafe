//! Read-side helpers over the store.

use rust_decimal::Decimal;

use stockbook_catalog::CostingMethod;
use stockbook_core::{DomainResult, EventId, ItemId, LocationId, TenantId};

use crate::balance::InventoryBalance;
use crate::costing::engine_for;
use crate::event::StoredEvent;
use crate::store::InventoryStore;

/// Tenant-scoped read access. Holds no locks between calls, so results are a
/// consistent snapshot per call, not across calls. A contended or poisoned
/// row surfaces as a retryable error, never as a silently empty result.
pub struct StockQueries<'a> {
    store: &'a InventoryStore,
    tenant_id: TenantId,
}

impl<'a> StockQueries<'a> {
    pub fn new(store: &'a InventoryStore, tenant_id: TenantId) -> Self {
        Self { store, tenant_id }
    }

    /// Balance for one (item, location) row, if any event ever touched it.
    pub fn balance(
        &self,
        item_id: ItemId,
        location_id: LocationId,
    ) -> DomainResult<Option<InventoryBalance>> {
        self.store.balance(self.tenant_id, item_id, location_id)
    }

    /// All balance rows for the tenant, in stable (item, location) order.
    pub fn balances(&self) -> DomainResult<Vec<InventoryBalance>> {
        self.store.balances(self.tenant_id)
    }

    /// Movement history for a row, newest first.
    pub fn movements(
        &self,
        item_id: ItemId,
        location_id: LocationId,
        limit: Option<usize>,
    ) -> DomainResult<Vec<StoredEvent>> {
        self.store.events(self.tenant_id, item_id, location_id, limit)
    }

    /// One event by id, scoped to the tenant.
    pub fn event(&self, event_id: EventId) -> DomainResult<Option<StoredEvent>> {
        self.store.find_event(self.tenant_id, event_id)
    }

    /// Unit cost the next consumed unit would bear under the given method.
    pub fn current_unit_cost(
        &self,
        item_id: ItemId,
        location_id: LocationId,
        method: CostingMethod,
    ) -> DomainResult<Decimal> {
        let stream = self.store.stream(self.tenant_id, item_id, location_id)?;
        Ok(engine_for(method).current_unit_cost(&stream))
    }
}
