use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use stockbook_catalog::{InventoryItem, InventoryLocation};
use stockbook_core::{BatchRef, DocumentId, DomainError, DomainResult, UserId};
use stockbook_ledger::{Account, GeneralLedger, JournalDraft, JournalEntry, JournalLine};

use crate::balance::InventoryBalance;
use crate::costing::engine_for;
use crate::event::{InventoryEvent, StoredEvent};
use crate::store::InventoryStore;

/// Tenant-level control accounts the engine posts against.
///
/// Item-specific accounts (asset, COGS) come from the catalog mapping; these
/// are the shared clearing/adjustment accounts resolved once per tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlAccounts {
    pub grni_clearing: Account,
    pub accounts_payable: Account,
    pub shrinkage: Account,
    pub inventory_variance: Account,
    pub landed_cost_clearing: Account,
}

/// Result of one movement operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementOutcome {
    pub event: StoredEvent,
    pub balance: InventoryBalance,
    /// `None` for pure reservation bookkeeping (commit/uncommit).
    pub journal: Option<JournalEntry>,
}

/// Movement operations over the inventory store.
///
/// Every operation is one failure-atomic unit: validate, cost, append the
/// event, update the balance and post the journal, all under the row's
/// exclusive lock. A rejected journal post rolls the staged event and
/// balance back with it.
pub struct MovementService {
    store: Arc<InventoryStore>,
    ledger: Arc<dyn GeneralLedger>,
    controls: ControlAccounts,
}

impl MovementService {
    pub fn new(
        store: Arc<InventoryStore>,
        ledger: Arc<dyn GeneralLedger>,
        controls: ControlAccounts,
    ) -> Self {
        Self {
            store,
            ledger,
            controls,
        }
    }

    pub fn store(&self) -> &Arc<InventoryStore> {
        &self.store
    }

    fn ensure_movable(item: &InventoryItem, location: &InventoryLocation) -> DomainResult<()> {
        location.ensure_tenant(item.tenant_id)?;
        item.ensure_stock_tracked()
    }

    /// Receive stock: mints a fresh batch (FIFO cost layer), releases any
    /// matching on-order quantity, posts Debit inventory asset / Credit GRNI.
    pub fn receive(
        &self,
        item: &InventoryItem,
        location: &InventoryLocation,
        quantity: Decimal,
        unit_cost: Decimal,
        po_reference: Option<DocumentId>,
        source_reference: &str,
        actor: UserId,
    ) -> DomainResult<MovementOutcome> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "receive quantity must be positive, got {quantity}"
            )));
        }
        if unit_cost <= Decimal::ZERO {
            return Err(DomainError::invalid_unit_cost(format!(
                "receive unit cost must be positive, got {unit_cost}"
            )));
        }
        Self::ensure_movable(item, location)?;
        let asset = item.accounts.asset(&item.sku)?.clone();

        let tenant_id = item.tenant_id;
        let outcome = self.store.with_row(
            tenant_id,
            item.item_id,
            location.location_id,
            |txn| {
                let stored = txn.append(InventoryEvent::received(
                    tenant_id,
                    item.item_id,
                    location.location_id,
                    quantity,
                    unit_cost,
                    BatchRef::new(),
                    source_reference,
                    po_reference,
                    actor,
                ))?;

                let amount = quantity * unit_cost;
                let draft = JournalDraft::new(
                    tenant_id,
                    Utc::now(),
                    format!("Goods received: {} x {}", quantity, item.sku),
                    source_reference,
                )
                .with_line(JournalLine::debit(asset.clone(), amount, item.sku.clone()))
                .with_line(JournalLine::credit(
                    self.controls.grni_clearing.clone(),
                    amount,
                    "goods received, not yet invoiced",
                ));
                let entry = self.ledger.post(draft)?;

                Ok(MovementOutcome {
                    event: stored,
                    balance: txn.balance().clone(),
                    journal: Some(entry),
                })
            },
        )?;

        info!(sku = %item.sku, %quantity, %unit_cost, "stock received");
        Ok(outcome)
    }

    /// Ship stock: costs the draw via the item's engine, releases any
    /// matching reservation, posts Debit COGS / Credit inventory asset.
    pub fn ship(
        &self,
        item: &InventoryItem,
        location: &InventoryLocation,
        quantity: Decimal,
        source_reference: &str,
        actor: UserId,
    ) -> DomainResult<MovementOutcome> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "ship quantity must be positive, got {quantity}"
            )));
        }
        Self::ensure_movable(item, location)?;
        let asset = item.accounts.asset(&item.sku)?.clone();
        let cogs = item.accounts.cogs(&item.sku)?.clone();

        let tenant_id = item.tenant_id;
        let outcome = self.store.with_row(
            tenant_id,
            item.item_id,
            location.location_id,
            |txn| {
                if txn.balance().qty_on_hand < quantity {
                    return Err(DomainError::insufficient_stock(format!(
                        "{}: on hand {}, requested {}",
                        item.sku,
                        txn.balance().qty_on_hand,
                        quantity
                    )));
                }

                let stream = txn.stream();
                let cost = engine_for(item.costing_method).cost_of_shipment(&stream, quantity);
                if cost.total_cost <= Decimal::ZERO {
                    return Err(DomainError::missing_cost_basis(format!(
                        "{}: shipment of {} has no cost basis",
                        item.sku, quantity
                    )));
                }

                let stored = txn.append(InventoryEvent::shipped(
                    tenant_id,
                    item.item_id,
                    location.location_id,
                    quantity,
                    cost.unit_cost,
                    cost.consumption,
                    source_reference,
                    actor,
                ))?;

                let draft = JournalDraft::new(
                    tenant_id,
                    Utc::now(),
                    format!("Goods shipped: {} x {}", quantity, item.sku),
                    source_reference,
                )
                .with_line(JournalLine::debit(
                    cogs.clone(),
                    cost.total_cost,
                    item.sku.clone(),
                ))
                .with_line(JournalLine::credit(
                    asset.clone(),
                    cost.total_cost,
                    item.sku.clone(),
                ));
                let entry = self.ledger.post(draft)?;

                Ok(MovementOutcome {
                    event: stored,
                    balance: txn.balance().clone(),
                    journal: Some(entry),
                })
            },
        )?;

        info!(sku = %item.sku, %quantity, "stock shipped");
        Ok(outcome)
    }

    /// Adjust on-hand stock to a physical count.
    ///
    /// Shrinkage is costed exactly like a shipment; a gain is valued at the
    /// engine's current unit cost and fails without a prior cost basis (a
    /// first-ever adjustment cannot create value from nothing). Returns
    /// `None` when the count already matches.
    pub fn adjust_to_count(
        &self,
        item: &InventoryItem,
        location: &InventoryLocation,
        physical_qty: Decimal,
        reason: &str,
        actor: UserId,
    ) -> DomainResult<Option<MovementOutcome>> {
        if physical_qty < Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "physical count must be non-negative, got {physical_qty}"
            )));
        }
        Self::ensure_movable(item, location)?;
        let asset = item.accounts.asset(&item.sku)?.clone();
        let shrinkage = self.controls.shrinkage.clone();

        let tenant_id = item.tenant_id;
        let outcome = self.store.with_row(
            tenant_id,
            item.item_id,
            location.location_id,
            |txn| {
                let delta = physical_qty - txn.balance().qty_on_hand;
                if delta == Decimal::ZERO {
                    return Ok(None);
                }

                let stream = txn.stream();
                let engine = engine_for(item.costing_method);

                let (event, debit, credit, amount) = if delta < Decimal::ZERO {
                    let cost = engine.cost_of_shipment(&stream, -delta);
                    if cost.total_cost <= Decimal::ZERO {
                        return Err(DomainError::missing_cost_basis(format!(
                            "{}: shrinkage of {} has no cost basis",
                            item.sku, -delta
                        )));
                    }
                    let event = InventoryEvent::adjusted(
                        tenant_id,
                        item.item_id,
                        location.location_id,
                        delta,
                        cost.unit_cost,
                        cost.consumption,
                        reason,
                        actor,
                    );
                    (event, shrinkage.clone(), asset.clone(), cost.total_cost)
                } else {
                    let unit_cost = engine.current_unit_cost(&stream);
                    if unit_cost <= Decimal::ZERO {
                        return Err(DomainError::missing_cost_basis(format!(
                            "{}: gain of {} has no prior cost basis",
                            item.sku, delta
                        )));
                    }
                    let event = InventoryEvent::adjusted(
                        tenant_id,
                        item.item_id,
                        location.location_id,
                        delta,
                        unit_cost,
                        None,
                        reason,
                        actor,
                    );
                    (event, asset.clone(), shrinkage.clone(), delta * unit_cost)
                };

                let stored = txn.append(event)?;

                let draft = JournalDraft::new(
                    tenant_id,
                    Utc::now(),
                    format!("Count adjustment: {} ({})", item.sku, reason),
                    format!("adjustment:{}", stored.event_id),
                )
                .with_line(JournalLine::debit(debit, amount, item.sku.clone()))
                .with_line(JournalLine::credit(credit, amount, item.sku.clone()));
                let entry = self.ledger.post(draft)?;

                Ok(Some(MovementOutcome {
                    event: stored,
                    balance: txn.balance().clone(),
                    journal: Some(entry),
                }))
            },
        )?;

        if outcome.is_some() {
            info!(sku = %item.sku, %physical_qty, reason, "stock adjusted to count");
        }
        Ok(outcome)
    }

    /// Reserve stock for a reference. Pure bookkeeping: no journal.
    pub fn commit(
        &self,
        item: &InventoryItem,
        location: &InventoryLocation,
        quantity: Decimal,
        reference: &str,
        actor: UserId,
    ) -> DomainResult<MovementOutcome> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "commit quantity must be positive, got {quantity}"
            )));
        }
        Self::ensure_movable(item, location)?;

        let tenant_id = item.tenant_id;
        self.store.with_row(
            tenant_id,
            item.item_id,
            location.location_id,
            |txn| {
                if txn.balance().qty_available() < quantity {
                    return Err(DomainError::insufficient_available(format!(
                        "{}: available {}, requested {}",
                        item.sku,
                        txn.balance().qty_available(),
                        quantity
                    )));
                }
                let stored = txn.append(InventoryEvent::committed(
                    tenant_id,
                    item.item_id,
                    location.location_id,
                    quantity,
                    reference,
                    actor,
                ))?;
                Ok(MovementOutcome {
                    event: stored,
                    balance: txn.balance().clone(),
                    journal: None,
                })
            },
        )
    }

    /// Release a reservation. Fails if more than committed would be released.
    pub fn uncommit(
        &self,
        item: &InventoryItem,
        location: &InventoryLocation,
        quantity: Decimal,
        reference: &str,
        actor: UserId,
    ) -> DomainResult<MovementOutcome> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "uncommit quantity must be positive, got {quantity}"
            )));
        }
        Self::ensure_movable(item, location)?;

        let tenant_id = item.tenant_id;
        self.store.with_row(
            tenant_id,
            item.item_id,
            location.location_id,
            |txn| {
                let stored = txn.append(InventoryEvent::uncommitted(
                    tenant_id,
                    item.item_id,
                    location.location_id,
                    quantity,
                    reference,
                    actor,
                ))?;
                Ok(MovementOutcome {
                    event: stored,
                    balance: txn.balance().clone(),
                    journal: None,
                })
            },
        )
    }
}
