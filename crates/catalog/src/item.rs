use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, ItemId, LocationId, TenantId};
use stockbook_ledger::Account;

/// What kind of thing an item is.
///
/// Only `Inventory` and `Assembly` items participate in quantity tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Inventory,
    Assembly,
    Service,
    NonInventory,
}

impl ItemType {
    pub fn is_stock_tracked(self) -> bool {
        matches!(self, ItemType::Inventory | ItemType::Assembly)
    }
}

/// Cost-flow algorithm assigned to an item.
///
/// Assumed immutable once the item has movements; changing it mid-life is
/// unsupported and is the catalog's problem to prevent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostingMethod {
    Fifo,
    Avco,
}

/// Ledger accounts resolved for an item by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMapping {
    pub asset: Option<Account>,
    pub cogs: Option<Account>,
    pub revenue: Option<Account>,
}

impl AccountMapping {
    pub fn asset(&self, sku: &str) -> DomainResult<&Account> {
        self.asset
            .as_ref()
            .ok_or_else(|| DomainError::missing_account_mapping(format!("{sku}: asset account")))
    }

    pub fn cogs(&self, sku: &str) -> DomainResult<&Account> {
        self.cogs
            .as_ref()
            .ok_or_else(|| DomainError::missing_account_mapping(format!("{sku}: cogs account")))
    }
}

/// An inventory item as supplied by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: ItemId,
    pub tenant_id: TenantId,
    pub sku: String,
    pub name: String,
    pub item_type: ItemType,
    pub costing_method: CostingMethod,
    pub accounts: AccountMapping,
}

impl InventoryItem {
    /// Fail unless the item belongs to the acting tenant.
    pub fn ensure_tenant(&self, tenant_id: TenantId) -> DomainResult<()> {
        if self.tenant_id != tenant_id {
            return Err(DomainError::scope_mismatch(format!(
                "item {} belongs to another tenant",
                self.sku
            )));
        }
        Ok(())
    }

    /// Fail unless the item participates in quantity tracking.
    pub fn ensure_stock_tracked(&self) -> DomainResult<()> {
        if !self.item_type.is_stock_tracked() {
            return Err(DomainError::unsupported_item_type(format!(
                "item {} is {:?}",
                self.sku, self.item_type
            )));
        }
        Ok(())
    }
}

/// A named storage site scoped to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLocation {
    pub location_id: LocationId,
    pub tenant_id: TenantId,
    pub name: String,
}

impl InventoryLocation {
    pub fn ensure_tenant(&self, tenant_id: TenantId) -> DomainResult<()> {
        if self.tenant_id != tenant_id {
            return Err(DomainError::scope_mismatch(format!(
                "location {} belongs to another tenant",
                self.name
            )));
        }
        Ok(())
    }
}
