//! Landed-cost allocation.
//!
//! Freight, duty and similar charges arrive after the goods do. A batch
//! collects the charge total and its split across receipt events as a draft,
//! then applies once: one journal capitalizing the charge into the inventory
//! asset per item, plus a provenance marker on each allocated receipt's
//! stream. Applied batches are terminal.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use stockbook_catalog::InventoryItem;
use stockbook_core::{
    round_money, BatchId, DomainError, DomainResult, EventId, ItemId, LocationId, TenantId, UserId,
};
use stockbook_inventory::{
    find_row_txn, ControlAccounts, InventoryEvent, InventoryEventType, InventoryStore, StoredEvent,
};
use stockbook_ledger::{GeneralLedger, JournalDraft, JournalEntry, JournalLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandedCostStatus {
    Draft,
    Applied,
}

/// One receipt's share of the charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostAllocation {
    pub receipt_event_id: EventId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandedCostBatch {
    pub batch_id: BatchId,
    pub tenant_id: TenantId,
    /// Charge document reference (freight bill, customs entry).
    pub reference: String,
    pub total_amount: Decimal,
    pub allocations: Vec<LandedCostAllocation>,
    pub status: LandedCostStatus,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Result of applying one landed-cost batch.
#[derive(Debug, Clone)]
pub struct LandedCostOutcome {
    pub batch: LandedCostBatch,
    pub journal: JournalEntry,
    /// One provenance marker per allocation, in allocation order.
    pub provenance: Vec<StoredEvent>,
}

pub struct LandedCostService {
    store: Arc<InventoryStore>,
    ledger: Arc<dyn GeneralLedger>,
    controls: ControlAccounts,
    batches: RwLock<HashMap<BatchId, LandedCostBatch>>,
}

impl LandedCostService {
    pub fn new(
        store: Arc<InventoryStore>,
        ledger: Arc<dyn GeneralLedger>,
        controls: ControlAccounts,
    ) -> Self {
        Self {
            store,
            ledger,
            controls,
            batches: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> DomainError {
        DomainError::lock_contention("landed cost registry lock poisoned")
    }

    /// Draft a new batch. Every allocated receipt must be a real stock
    /// receipt in the tenant's log; amounts are validated but the split is
    /// not required to sum to the total until apply time.
    pub fn create(
        &self,
        tenant_id: TenantId,
        reference: &str,
        total_amount: Decimal,
        allocations: Vec<LandedCostAllocation>,
    ) -> DomainResult<LandedCostBatch> {
        if total_amount <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "landed cost total must be positive, got {total_amount}"
            )));
        }
        if allocations.is_empty() {
            return Err(DomainError::validation(
                "a landed cost batch must allocate to at least one receipt",
            ));
        }
        for allocation in &allocations {
            if allocation.amount <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "allocation for receipt {} must be positive",
                    allocation.receipt_event_id
                )));
            }
            let event = self
                .store
                .find_event(tenant_id, allocation.receipt_event_id)?
                .ok_or_else(|| {
                    DomainError::not_found(format!("receipt event {}", allocation.receipt_event_id))
                })?;
            if event.event_type != InventoryEventType::StockReceived {
                return Err(DomainError::validation(format!(
                    "event {} is not a stock receipt",
                    allocation.receipt_event_id
                )));
            }
        }

        let batch = LandedCostBatch {
            batch_id: BatchId::new(),
            tenant_id,
            reference: reference.to_string(),
            total_amount,
            allocations,
            status: LandedCostStatus::Draft,
            created_at: Utc::now(),
            applied_at: None,
        };
        let mut batches = self.batches.write().map_err(|_| Self::poisoned())?;
        batches.insert(batch.batch_id, batch.clone());
        Ok(batch)
    }

    /// Apply a drafted batch: capitalize the charge into inventory and mark
    /// every allocated receipt's stream. A batch applies exactly once.
    pub fn apply(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        items: &[InventoryItem],
        actor: UserId,
    ) -> DomainResult<LandedCostOutcome> {
        // The write guard is held across the whole apply so a concurrent
        // apply of the same batch serializes behind the status check.
        let mut batches = self.batches.write().map_err(|_| Self::poisoned())?;
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| DomainError::not_found(format!("landed cost batch {batch_id}")))?;
        if batch.tenant_id != tenant_id {
            return Err(DomainError::scope_mismatch(format!(
                "landed cost batch {} belongs to another tenant",
                batch.reference
            )));
        }
        if batch.status == LandedCostStatus::Applied {
            return Err(DomainError::already_applied(format!(
                "landed cost batch {}",
                batch.reference
            )));
        }

        let allocated: Decimal = batch.allocations.iter().map(|a| a.amount).sum();
        if allocated != batch.total_amount {
            return Err(DomainError::allocation_mismatch(format!(
                "allocations sum to {allocated}, batch total is {}",
                batch.total_amount
            )));
        }

        let item_index: HashMap<ItemId, &InventoryItem> =
            items.iter().map(|i| (i.item_id, i)).collect();

        // Resolve receipts and aggregate the charge per item, preserving
        // first-seen item order for deterministic journal lines.
        let mut receipts = Vec::with_capacity(batch.allocations.len());
        let mut per_item: Vec<(ItemId, Decimal)> = Vec::new();
        for allocation in &batch.allocations {
            let event = self
                .store
                .find_event(tenant_id, allocation.receipt_event_id)?
                .ok_or_else(|| {
                    DomainError::not_found(format!("receipt event {}", allocation.receipt_event_id))
                })?;
            match per_item.iter_mut().find(|(id, _)| *id == event.item_id) {
                Some((_, sum)) => *sum += allocation.amount,
                None => per_item.push((event.item_id, allocation.amount)),
            }
            receipts.push(event);
        }

        // Round per-item debits with the last item absorbing the remainder
        // so the entry balances against the rounded total.
        let total_posted = round_money(batch.total_amount);
        let mut draft = JournalDraft::new(
            tenant_id,
            Utc::now(),
            format!("Landed cost {}", batch.reference),
            format!("landed_cost:{}", batch.reference),
        );
        let mut allocated_posted = Decimal::ZERO;
        for (idx, (item_id, amount)) in per_item.iter().enumerate() {
            let item = item_index
                .get(item_id)
                .ok_or_else(|| DomainError::not_found(format!("item {item_id}")))?;
            let asset = item.accounts.asset(&item.sku)?.clone();
            let share = if idx == per_item.len() - 1 {
                total_posted - allocated_posted
            } else {
                round_money(*amount)
            };
            allocated_posted += share;
            if share != Decimal::ZERO {
                draft.push(JournalLine::debit(asset, share, item.sku.clone()));
            }
        }
        draft.push(JournalLine::credit(
            self.controls.landed_cost_clearing.clone(),
            total_posted,
            format!("landed cost {}", batch.reference),
        ));
        // Every allocated row is locked as one unit: the provenance markers
        // and the journal post commit together, and a failure on any row
        // leaves the ledger untouched and the batch a draft.
        let rows: Vec<(ItemId, LocationId)> =
            receipts.iter().map(|r| (r.item_id, r.location_id)).collect();
        let reference = batch.reference.clone();
        let (journal, provenance) = self.store.with_rows(tenant_id, &rows, |txns| {
            let mut provenance = Vec::with_capacity(receipts.len());
            for receipt in &receipts {
                let txn = find_row_txn(txns, receipt.item_id, receipt.location_id)?;
                provenance.push(txn.append(InventoryEvent::provenance(
                    InventoryEventType::StockLandedCostAllocated,
                    tenant_id,
                    receipt.item_id,
                    receipt.location_id,
                    format!("landed_cost:{reference}"),
                    receipt.purchase_document,
                    actor,
                ))?);
            }
            let journal = self.ledger.post(draft)?;
            Ok((journal, provenance))
        })?;

        batch.status = LandedCostStatus::Applied;
        batch.applied_at = Some(Utc::now());
        let applied = batch.clone();

        info!(reference = %applied.reference, total = %applied.total_amount, "landed cost applied");
        Ok(LandedCostOutcome {
            batch: applied,
            journal,
            provenance,
        })
    }

    /// All batches for a tenant, oldest first.
    pub fn batches(&self, tenant_id: TenantId) -> DomainResult<Vec<LandedCostBatch>> {
        let batches = self.batches.read().map_err(|_| Self::poisoned())?;
        let mut out: Vec<LandedCostBatch> = batches
            .values()
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.created_at);
        Ok(out)
    }
}
