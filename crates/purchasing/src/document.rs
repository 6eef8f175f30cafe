//! Purchase document registry.
//!
//! Tracks purchase orders and vendor bills by id and by external reference,
//! plus the receipt-to-bill links that make double billing impossible.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{DocumentId, DomainError, DomainResult, EventId, ItemId, LocationId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PurchaseOrder,
    Bill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Open,
    Closed,
    Void,
}

/// The stock line a purchase order expects to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub quantity: Decimal,
}

/// A purchase order or vendor bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseDocument {
    pub document_id: DocumentId,
    pub tenant_id: TenantId,
    pub document_type: DocumentType,
    /// Vendor-facing reference (PO number, bill number). Unique per
    /// (tenant, type).
    pub external_reference: String,
    pub status: DocumentStatus,
    /// Present on purchase orders; bills reconcile against receipts instead.
    pub order_line: Option<OrderLine>,
    /// Bill total. `None` on purchase orders.
    pub total: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseDocument {
    pub fn purchase_order(
        tenant_id: TenantId,
        external_reference: impl Into<String>,
        line: OrderLine,
    ) -> Self {
        let now = Utc::now();
        Self {
            document_id: DocumentId::new(),
            tenant_id,
            document_type: DocumentType::PurchaseOrder,
            external_reference: external_reference.into(),
            status: DocumentStatus::Open,
            order_line: Some(line),
            total: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn bill(tenant_id: TenantId, external_reference: impl Into<String>, total: Decimal) -> Self {
        let now = Utc::now();
        Self {
            document_id: DocumentId::new(),
            tenant_id,
            document_type: DocumentType::Bill,
            external_reference: external_reference.into(),
            status: DocumentStatus::Closed,
            order_line: None,
            total: Some(total),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ensure_tenant(&self, tenant_id: TenantId) -> DomainResult<()> {
        if self.tenant_id != tenant_id {
            return Err(DomainError::scope_mismatch(format!(
                "document {} belongs to another tenant",
                self.external_reference
            )));
        }
        Ok(())
    }
}

/// In-memory document registry.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: RwLock<HashMap<DocumentId, PurchaseDocument>>,
    /// Receipt event -> the bill it was reconciled under. At most one link
    /// per receipt, ever.
    billed_receipts: RwLock<HashMap<EventId, DocumentId>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> DomainError {
        DomainError::lock_contention("document registry lock poisoned")
    }

    /// Register a new document. The (tenant, type, external reference) triple
    /// must be unused.
    pub fn insert(&self, document: PurchaseDocument) -> DomainResult<()> {
        let mut docs = self.documents.write().map_err(|_| Self::poisoned())?;
        let duplicate = docs.values().any(|d| {
            d.tenant_id == document.tenant_id
                && d.document_type == document.document_type
                && d.external_reference == document.external_reference
        });
        if duplicate {
            return Err(DomainError::validation(format!(
                "document reference {} already registered",
                document.external_reference
            )));
        }
        docs.insert(document.document_id, document);
        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId, document_id: DocumentId) -> DomainResult<PurchaseDocument> {
        let docs = self.documents.read().map_err(|_| Self::poisoned())?;
        let doc = docs
            .get(&document_id)
            .ok_or_else(|| DomainError::not_found(format!("document {document_id}")))?;
        doc.ensure_tenant(tenant_id)?;
        Ok(doc.clone())
    }

    /// Mutate a document in place and return the updated copy.
    pub fn update<F>(&self, tenant_id: TenantId, document_id: DocumentId, f: F) -> DomainResult<PurchaseDocument>
    where
        F: FnOnce(&mut PurchaseDocument),
    {
        let mut docs = self.documents.write().map_err(|_| Self::poisoned())?;
        let doc = docs
            .get_mut(&document_id)
            .ok_or_else(|| DomainError::not_found(format!("document {document_id}")))?;
        doc.ensure_tenant(tenant_id)?;
        f(doc);
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    /// Remove a document (rollback of a failed posting).
    pub fn remove(&self, document_id: DocumentId) {
        if let Ok(mut docs) = self.documents.write() {
            docs.remove(&document_id);
        }
    }

    /// Reserve the one bill link a receipt may ever have.
    pub fn link_receipt(&self, receipt: EventId, bill: DocumentId) -> DomainResult<()> {
        let mut links = self.billed_receipts.write().map_err(|_| Self::poisoned())?;
        if let Some(existing) = links.get(&receipt) {
            return Err(DomainError::already_billed(format!(
                "receipt {receipt} already reconciled under bill {existing}"
            )));
        }
        links.insert(receipt, bill);
        Ok(())
    }

    /// Drop receipt links (rollback of a failed bill posting).
    pub fn unlink_receipts(&self, receipts: &[EventId]) {
        if let Ok(mut links) = self.billed_receipts.write() {
            for receipt in receipts {
                links.remove(receipt);
            }
        }
    }

    pub fn receipt_bill(&self, receipt: EventId) -> DomainResult<Option<DocumentId>> {
        let links = self.billed_receipts.read().map_err(|_| Self::poisoned())?;
        Ok(links.get(&receipt).copied())
    }

    /// All documents for a tenant, oldest first.
    pub fn documents(&self, tenant_id: TenantId) -> DomainResult<Vec<PurchaseDocument>> {
        let docs = self.documents.read().map_err(|_| Self::poisoned())?;
        let mut out: Vec<PurchaseDocument> = docs
            .values()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by_key(|d| d.created_at);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line() -> OrderLine {
        OrderLine {
            item_id: ItemId::new(),
            location_id: LocationId::new(),
            quantity: dec!(10),
        }
    }

    #[test]
    fn duplicate_references_are_rejected_per_type() {
        let registry = DocumentRegistry::new();
        let tenant = TenantId::new();

        registry
            .insert(PurchaseDocument::purchase_order(tenant, "PO-1", line()))
            .unwrap();
        let err = registry
            .insert(PurchaseDocument::purchase_order(tenant, "PO-1", line()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Same reference under a different type is a different document.
        registry
            .insert(PurchaseDocument::bill(tenant, "PO-1", dec!(100)))
            .unwrap();
    }

    #[test]
    fn lookups_are_tenant_scoped() {
        let registry = DocumentRegistry::new();
        let tenant = TenantId::new();
        let doc = PurchaseDocument::purchase_order(tenant, "PO-1", line());
        let id = doc.document_id;
        registry.insert(doc).unwrap();

        assert!(registry.get(tenant, id).is_ok());
        let err = registry.get(TenantId::new(), id).unwrap_err();
        assert!(matches!(err, DomainError::ScopeMismatch(_)));
    }

    #[test]
    fn a_receipt_links_to_exactly_one_bill() {
        let registry = DocumentRegistry::new();
        let receipt = EventId::new();
        let first = DocumentId::new();

        registry.link_receipt(receipt, first).unwrap();
        let err = registry.link_receipt(receipt, DocumentId::new()).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyBilled(_)));
        assert_eq!(registry.receipt_bill(receipt).unwrap(), Some(first));

        registry.unlink_receipts(&[receipt]);
        assert_eq!(registry.receipt_bill(receipt).unwrap(), None);
    }
}
