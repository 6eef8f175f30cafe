//! Purchase orders and vendor-bill reconciliation.
//!
//! Receiving stock credits the GRNI clearing account; posting the vendor
//! bill clears it against accounts payable. A price difference between the
//! bill and the receipt value either revalues the inventory asset (when
//! every billed batch is still fully on hand) or posts to purchase price
//! variance (when any part has already been consumed).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use stockbook_catalog::{InventoryItem, InventoryLocation};
use stockbook_core::{
    round_money, DocumentId, DomainError, DomainResult, EventId, ItemId, LocationId, TenantId,
    UserId,
};
use stockbook_inventory::costing::batch_remaining;
use stockbook_inventory::{
    find_row_txn, ControlAccounts, InventoryEvent, InventoryEventType, InventoryStore, RowTxn,
    StoredEvent,
};
use stockbook_ledger::{Account, GeneralLedger, JournalDraft, JournalEntry, JournalLine};

use crate::document::{DocumentRegistry, DocumentStatus, DocumentType, OrderLine, PurchaseDocument};

/// Result of posting one vendor bill.
#[derive(Debug, Clone)]
pub struct VendorBillOutcome {
    pub document: PurchaseDocument,
    pub journal: JournalEntry,
    /// Zero-quantity provenance marker on the first billed receipt's stream.
    pub provenance: StoredEvent,
    /// Posted bill-minus-receipts difference (2 decimal places).
    pub price_delta: Decimal,
    /// Whether the delta revalued inventory (true) or went to variance (false).
    pub revalued: bool,
}

/// Purchase-order lifecycle and vendor-bill posting.
pub struct BillingService {
    store: Arc<InventoryStore>,
    ledger: Arc<dyn GeneralLedger>,
    registry: Arc<DocumentRegistry>,
    controls: ControlAccounts,
}

impl BillingService {
    pub fn new(
        store: Arc<InventoryStore>,
        ledger: Arc<dyn GeneralLedger>,
        registry: Arc<DocumentRegistry>,
        controls: ControlAccounts,
    ) -> Self {
        Self {
            store,
            ledger,
            registry,
            controls,
        }
    }

    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    /// Raise a purchase order: registers the document and records the
    /// expected quantity as on-order. No journal until goods arrive.
    pub fn order(
        &self,
        item: &InventoryItem,
        location: &InventoryLocation,
        quantity: Decimal,
        external_reference: &str,
        actor: UserId,
    ) -> DomainResult<(PurchaseDocument, StoredEvent)> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "order quantity must be positive, got {quantity}"
            )));
        }
        location.ensure_tenant(item.tenant_id)?;
        item.ensure_stock_tracked()?;

        let document = PurchaseDocument::purchase_order(
            item.tenant_id,
            external_reference,
            OrderLine {
                item_id: item.item_id,
                location_id: location.location_id,
                quantity,
            },
        );

        // Registration happens inside the row scope: if it fails (duplicate
        // reference, contended registry) the staged on-order event is
        // discarded with it.
        let stored = self.store.with_row(
            item.tenant_id,
            item.item_id,
            location.location_id,
            |txn| {
                let stored = txn.append(InventoryEvent::purchase_order(
                    InventoryEventType::PoCreated,
                    item.tenant_id,
                    item.item_id,
                    location.location_id,
                    quantity,
                    document.document_id,
                    format!("po:{external_reference}"),
                    actor,
                ))?;
                self.registry.insert(document.clone())?;
                Ok(stored)
            },
        )?;

        info!(reference = external_reference, %quantity, "purchase order raised");
        Ok((document, stored))
    }

    /// Change an open order's expected quantity. Records the signed change
    /// against on-order; a no-op when the quantity is unchanged.
    pub fn update_order(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        new_quantity: Decimal,
        actor: UserId,
    ) -> DomainResult<(PurchaseDocument, Option<StoredEvent>)> {
        if new_quantity < Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "order quantity must be non-negative, got {new_quantity}"
            )));
        }
        let document = self.registry.get(tenant_id, document_id)?;
        let line = Self::open_order_line(&document)?;

        let delta = new_quantity - line.quantity;
        if delta == Decimal::ZERO {
            return Ok((document, None));
        }

        // The on-order event and the document change commit as one unit: a
        // registry failure discards the staged event.
        let (updated, stored) =
            self.store.with_row(tenant_id, line.item_id, line.location_id, |txn| {
                let stored = txn.append(InventoryEvent::purchase_order(
                    InventoryEventType::PoUpdated,
                    tenant_id,
                    line.item_id,
                    line.location_id,
                    delta,
                    document_id,
                    format!("po:{}", document.external_reference),
                    actor,
                ))?;
                let updated = self.registry.update(tenant_id, document_id, |doc| {
                    if let Some(line) = doc.order_line.as_mut() {
                        line.quantity = new_quantity;
                    }
                })?;
                Ok((updated, stored))
            })?;
        Ok((updated, Some(stored)))
    }

    /// Void an open order, releasing whatever of it is still on-order.
    pub fn cancel_order(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        actor: UserId,
    ) -> DomainResult<(PurchaseDocument, StoredEvent)> {
        let document = self.registry.get(tenant_id, document_id)?;
        let line = Self::open_order_line(&document)?;

        let (updated, stored) =
            self.store.with_row(tenant_id, line.item_id, line.location_id, |txn| {
                let stored = txn.append(InventoryEvent::purchase_order(
                    InventoryEventType::PoCancelled,
                    tenant_id,
                    line.item_id,
                    line.location_id,
                    -line.quantity,
                    document_id,
                    format!("po:{}", document.external_reference),
                    actor,
                ))?;
                let updated = self.registry.update(tenant_id, document_id, |doc| {
                    doc.status = DocumentStatus::Void;
                })?;
                Ok((updated, stored))
            })?;

        info!(reference = %updated.external_reference, "purchase order cancelled");
        Ok((updated, stored))
    }

    fn open_order_line(document: &PurchaseDocument) -> DomainResult<OrderLine> {
        if document.document_type != DocumentType::PurchaseOrder {
            return Err(DomainError::validation(format!(
                "document {} is not a purchase order",
                document.external_reference
            )));
        }
        if document.status != DocumentStatus::Open {
            return Err(DomainError::validation(format!(
                "purchase order {} is not open",
                document.external_reference
            )));
        }
        document.order_line.ok_or_else(|| {
            DomainError::validation(format!(
                "purchase order {} has no stock line",
                document.external_reference
            ))
        })
    }

    /// Post a vendor bill against previously received stock.
    ///
    /// Clears GRNI at the receipts' value, credits accounts payable at the
    /// bill total, and routes any difference to either an inventory
    /// revaluation (all billed batches still fully on hand) or the purchase
    /// price variance account. Each receipt can be billed exactly once.
    pub fn post_vendor_bill(
        &self,
        tenant_id: TenantId,
        bill_reference: &str,
        receipt_ids: &[EventId],
        bill_total: Decimal,
        items: &[InventoryItem],
        actor: UserId,
    ) -> DomainResult<VendorBillOutcome> {
        if bill_total <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "bill total must be positive, got {bill_total}"
            )));
        }
        if receipt_ids.is_empty() {
            return Err(DomainError::validation("a bill must cover at least one receipt"));
        }

        let item_index: HashMap<ItemId, &InventoryItem> =
            items.iter().map(|i| (i.item_id, i)).collect();

        let mut receipts = Vec::with_capacity(receipt_ids.len());
        for id in receipt_ids {
            let event = self
                .store
                .find_event(tenant_id, *id)?
                .ok_or_else(|| DomainError::not_found(format!("receipt event {id}")))?;
            if event.event_type != InventoryEventType::StockReceived {
                return Err(DomainError::validation(format!(
                    "event {id} is not a stock receipt"
                )));
            }
            if self.registry.receipt_bill(*id)?.is_some() {
                return Err(DomainError::already_billed(format!(
                    "receipt {id} already reconciled"
                )));
            }
            receipts.push(event);
        }

        let receipt_value: Decimal = receipts
            .iter()
            .map(|r| r.quantity_delta * r.unit_cost.unwrap_or(Decimal::ZERO))
            .sum();
        let grni_amount = round_money(receipt_value);
        let ap_amount = round_money(bill_total);
        let price_delta = ap_amount - grni_amount;

        let document = PurchaseDocument::bill(tenant_id, bill_reference, bill_total);
        self.registry.insert(document.clone())?;

        let mut linked = Vec::new();
        for receipt in &receipts {
            if let Err(err) = self.registry.link_receipt(receipt.event_id, document.document_id) {
                self.registry.unlink_receipts(&linked);
                self.registry.remove(document.document_id);
                return Err(err);
            }
            linked.push(receipt.event_id);
        }

        // All billed rows are locked as one unit, so the on-hand
        // classification, the provenance marker and the journal post cannot
        // be interleaved with a shipment on any of them.
        let rows: Vec<(ItemId, LocationId)> =
            receipts.iter().map(|r| (r.item_id, r.location_id)).collect();
        let posted = self.store.with_rows(tenant_id, &rows, |txns| {
            let (delta_lines, revalued) =
                self.delta_lines(txns, &receipts, &item_index, receipt_value, price_delta)?;

            let first = &receipts[0];
            let txn = find_row_txn(txns, first.item_id, first.location_id)?;
            let provenance = txn.append(InventoryEvent::provenance(
                InventoryEventType::VendorBillPosted,
                tenant_id,
                first.item_id,
                first.location_id,
                format!("bill:{bill_reference}"),
                Some(document.document_id),
                actor,
            ))?;

            let mut draft = JournalDraft::new(
                tenant_id,
                Utc::now(),
                format!("Vendor bill {bill_reference}"),
                format!("bill:{bill_reference}"),
            )
            .with_line(JournalLine::debit(
                self.controls.grni_clearing.clone(),
                grni_amount,
                "clear goods received, not yet invoiced",
            ));
            for line in delta_lines {
                draft.push(line);
            }
            draft.push(JournalLine::credit(
                self.controls.accounts_payable.clone(),
                ap_amount,
                format!("vendor bill {bill_reference}"),
            ));

            let entry = self.ledger.post(draft)?;
            Ok((provenance, entry, revalued))
        });

        let (provenance, journal, revalued) = match posted {
            Ok(triple) => triple,
            Err(err) => {
                self.registry.unlink_receipts(&linked);
                self.registry.remove(document.document_id);
                return Err(err);
            }
        };

        info!(
            reference = bill_reference,
            %price_delta,
            revalued,
            "vendor bill posted"
        );
        Ok(VendorBillOutcome {
            document,
            journal,
            provenance,
            price_delta,
            revalued,
        })
    }

    /// Build the journal lines for the bill-minus-receipts difference.
    ///
    /// Revaluation splits the delta across the receipts in proportion to
    /// their value, rounding each share and letting the last receipt absorb
    /// the remainder so the entry balances to the cent.
    fn delta_lines(
        &self,
        txns: &[RowTxn<'_>],
        receipts: &[StoredEvent],
        item_index: &HashMap<ItemId, &InventoryItem>,
        receipt_value: Decimal,
        price_delta: Decimal,
    ) -> DomainResult<(Vec<JournalLine>, bool)> {
        if price_delta == Decimal::ZERO {
            return Ok((Vec::new(), false));
        }

        let mut fully_on_hand = receipt_value > Decimal::ZERO;
        for receipt in receipts {
            if !fully_on_hand {
                break;
            }
            let txn = txns
                .iter()
                .find(|t| {
                    t.balance().item_id == receipt.item_id
                        && t.balance().location_id == receipt.location_id
                })
                .ok_or_else(|| {
                    DomainError::not_found(format!("balance row for item {}", receipt.item_id))
                })?;
            let remaining = batch_remaining(&txn.stream());
            let intact = receipt
                .batch_ref
                .and_then(|b| remaining.get(&b))
                .map(|qty| *qty >= receipt.quantity_delta)
                .unwrap_or(false);
            fully_on_hand = intact;
        }

        let mut lines = Vec::new();
        if fully_on_hand {
            let mut allocated = Decimal::ZERO;
            for (idx, receipt) in receipts.iter().enumerate() {
                let item = item_index
                    .get(&receipt.item_id)
                    .ok_or_else(|| DomainError::not_found(format!("item {}", receipt.item_id)))?;
                let asset = item.accounts.asset(&item.sku)?.clone();

                let share = if idx == receipts.len() - 1 {
                    price_delta - allocated
                } else {
                    let value = receipt.quantity_delta * receipt.unit_cost.unwrap_or(Decimal::ZERO);
                    round_money(price_delta * value / receipt_value)
                };
                allocated += share;
                if share != Decimal::ZERO {
                    lines.push(Self::signed_line(asset, share, item.sku.as_str()));
                }
            }
        } else {
            lines.push(Self::signed_line(
                self.controls.inventory_variance.clone(),
                price_delta,
                "purchase price variance",
            ));
        }
        Ok((lines, fully_on_hand))
    }

    fn signed_line(account: Account, amount: Decimal, description: impl Into<String>) -> JournalLine {
        if amount > Decimal::ZERO {
            JournalLine::debit(account, amount, description)
        } else {
            JournalLine::credit(account, -amount, description)
        }
    }
}
