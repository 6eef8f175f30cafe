use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;

use stockbook_core::{DomainError, DomainResult, EventId, ItemId, LocationId, TenantId};

use crate::balance::InventoryBalance;
use crate::event::{InventoryEvent, StoredEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct RowKey {
    tenant_id: TenantId,
    item_id: ItemId,
    location_id: LocationId,
}

#[derive(Debug)]
struct RowState {
    balance: InventoryBalance,
    events: Vec<StoredEvent>,
}

/// Append-only event log + balance cache.
///
/// One stream and one balance row per (tenant, item, location). The row's
/// mutex is the sole concurrency-control mechanism: an operation holds it
/// from before the balance read until the event append, balance update and
/// the caller's journal post commit as one unit. Multi-row units acquire
/// their locks in a single global key order, so there is no lock ordering
/// to get wrong. A poisoned lock surfaces as retryable `LockContention`
/// on every path, reads included.
#[derive(Debug, Default)]
pub struct InventoryStore {
    rows: RwLock<HashMap<RowKey, Arc<Mutex<RowState>>>>,
}

/// Transaction scope over one locked balance row.
///
/// Appends are staged against a working copy of the balance; nothing is
/// visible outside the row until the closure returns `Ok` and the scope
/// commits. Any error discards the staged events and balance together.
pub struct RowTxn<'a> {
    state: &'a mut RowState,
    staged_events: Vec<StoredEvent>,
    staged_balance: InventoryBalance,
}

impl RowTxn<'_> {
    /// Current balance, including staged (not yet committed) appends.
    pub fn balance(&self) -> &InventoryBalance {
        &self.staged_balance
    }

    /// Full stream in creation order, including staged appends.
    pub fn stream(&self) -> Vec<StoredEvent> {
        let mut stream = self.state.events.clone();
        stream.extend(self.staged_events.iter().cloned());
        stream
    }

    /// Stage one event: assign its position, apply it to the working balance
    /// (enforcing non-negativity) and hold it for commit.
    pub fn append(&mut self, event: InventoryEvent) -> DomainResult<StoredEvent> {
        let bal = &self.staged_balance;
        if event.tenant_id != bal.tenant_id
            || event.item_id != bal.item_id
            || event.location_id != bal.location_id
        {
            return Err(DomainError::scope_mismatch(
                "event does not target this balance row",
            ));
        }

        let sequence_number = (self.state.events.len() + self.staged_events.len()) as u64 + 1;
        let stored = StoredEvent {
            event_id: EventId::new(),
            sequence_number,
            recorded_at: Utc::now(),
            event,
        };

        self.staged_balance.apply(&stored)?;
        self.staged_events.push(stored.clone());
        Ok(stored)
    }

    fn commit(self) {
        self.state.events.extend(self.staged_events);
        self.state.balance = self.staged_balance;
    }
}

/// Locate the transaction targeting one row within a multi-row unit.
pub fn find_row_txn<'a, 'b>(
    txns: &'a mut [RowTxn<'b>],
    item_id: ItemId,
    location_id: LocationId,
) -> DomainResult<&'a mut RowTxn<'b>> {
    txns.iter_mut()
        .find(|t| t.balance().item_id == item_id && t.balance().location_id == location_id)
        .ok_or_else(|| {
            DomainError::not_found(format!("no open row transaction for item {item_id}"))
        })
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> DomainError {
        DomainError::lock_contention("balance row lock poisoned")
    }

    fn index_poisoned() -> DomainError {
        DomainError::lock_contention("store index poisoned")
    }

    fn row(&self, key: RowKey) -> DomainResult<Arc<Mutex<RowState>>> {
        {
            let rows = self.rows.read().map_err(|_| Self::index_poisoned())?;
            if let Some(cell) = rows.get(&key) {
                return Ok(Arc::clone(cell));
            }
        }

        let mut rows = self.rows.write().map_err(|_| Self::index_poisoned())?;
        let cell = rows.entry(key).or_insert_with(|| {
            Arc::new(Mutex::new(RowState {
                balance: InventoryBalance::new(key.tenant_id, key.item_id, key.location_id),
                events: Vec::new(),
            }))
        });
        Ok(Arc::clone(cell))
    }

    /// Run `f` under the row's exclusive lock, committing its staged appends
    /// only on success.
    pub fn with_row<T>(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        f: impl FnOnce(&mut RowTxn<'_>) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let cell = self.row(RowKey {
            tenant_id,
            item_id,
            location_id,
        })?;
        let mut state = cell.lock().map_err(|_| Self::poisoned())?;

        let staged_balance = state.balance.clone();
        let mut txn = RowTxn {
            state: &mut state,
            staged_events: Vec::new(),
            staged_balance,
        };

        let out = f(&mut txn)?;
        txn.commit();
        Ok(out)
    }

    /// Run `f` under the exclusive locks of several rows at once, committing
    /// all staged appends only on success.
    ///
    /// Locks are acquired in one global key order regardless of the order of
    /// `targets`, so concurrent multi-row units cannot deadlock each other.
    pub fn with_rows<T>(
        &self,
        tenant_id: TenantId,
        targets: &[(ItemId, LocationId)],
        f: impl FnOnce(&mut [RowTxn<'_>]) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let mut keys: Vec<RowKey> = targets
            .iter()
            .map(|(item_id, location_id)| RowKey {
                tenant_id,
                item_id: *item_id,
                location_id: *location_id,
            })
            .collect();
        keys.sort_by_key(|k| (*k.item_id.as_uuid(), *k.location_id.as_uuid()));
        keys.dedup();

        let mut cells = Vec::with_capacity(keys.len());
        for key in &keys {
            cells.push(self.row(*key)?);
        }
        let mut guards = Vec::with_capacity(cells.len());
        for cell in &cells {
            guards.push(cell.lock().map_err(|_| Self::poisoned())?);
        }

        let mut txns: Vec<RowTxn<'_>> = Vec::with_capacity(guards.len());
        for guard in guards.iter_mut() {
            let staged_balance = guard.balance.clone();
            txns.push(RowTxn {
                state: &mut **guard,
                staged_events: Vec::new(),
                staged_balance,
            });
        }

        let out = f(&mut txns)?;
        for txn in txns {
            txn.commit();
        }
        Ok(out)
    }

    /// Balance row, if any event ever touched it.
    pub fn balance(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
    ) -> DomainResult<Option<InventoryBalance>> {
        let rows = self.rows.read().map_err(|_| Self::index_poisoned())?;
        let Some(cell) = rows.get(&RowKey {
            tenant_id,
            item_id,
            location_id,
        }) else {
            return Ok(None);
        };
        let state = cell.lock().map_err(|_| Self::poisoned())?;
        Ok(Some(state.balance.clone()))
    }

    /// All balance rows for a tenant.
    pub fn balances(&self, tenant_id: TenantId) -> DomainResult<Vec<InventoryBalance>> {
        let rows = self.rows.read().map_err(|_| Self::index_poisoned())?;
        let mut out = Vec::new();
        for (key, cell) in rows.iter() {
            if key.tenant_id != tenant_id {
                continue;
            }
            let state = cell.lock().map_err(|_| Self::poisoned())?;
            out.push(state.balance.clone());
        }
        out.sort_by_key(|b| (*b.item_id.as_uuid(), *b.location_id.as_uuid()));
        Ok(out)
    }

    /// Stream for a row in creation order (for costing replay).
    pub fn stream(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
    ) -> DomainResult<Vec<StoredEvent>> {
        let rows = self.rows.read().map_err(|_| Self::index_poisoned())?;
        let Some(cell) = rows.get(&RowKey {
            tenant_id,
            item_id,
            location_id,
        }) else {
            return Ok(Vec::new());
        };
        let state = cell.lock().map_err(|_| Self::poisoned())?;
        Ok(state.events.clone())
    }

    /// Events for a row, newest first, optionally limited.
    pub fn events(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        location_id: LocationId,
        limit: Option<usize>,
    ) -> DomainResult<Vec<StoredEvent>> {
        let mut events = self.stream(tenant_id, item_id, location_id)?;
        events.reverse();
        if let Some(limit) = limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    /// Find one stored event by id within a tenant's log.
    pub fn find_event(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
    ) -> DomainResult<Option<StoredEvent>> {
        let rows = self.rows.read().map_err(|_| Self::index_poisoned())?;
        for (key, cell) in rows.iter() {
            if key.tenant_id != tenant_id {
                continue;
            }
            let state = cell.lock().map_err(|_| Self::poisoned())?;
            if let Some(ev) = state.events.iter().find(|e| e.event_id == event_id) {
                return Ok(Some(ev.clone()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InventoryEventType;
    use rust_decimal_macros::dec;
    use stockbook_core::{BatchRef, UserId};

    fn receive(
        tenant: TenantId,
        item: ItemId,
        loc: LocationId,
        qty: rust_decimal::Decimal,
    ) -> InventoryEvent {
        InventoryEvent::received(
            tenant,
            item,
            loc,
            qty,
            dec!(2.00),
            BatchRef::new(),
            "po:1",
            None,
            UserId::new(),
        )
    }

    #[test]
    fn append_assigns_monotonic_sequence_numbers() {
        let store = InventoryStore::new();
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());

        store
            .with_row(tenant, item, loc, |txn| {
                let a = txn.append(receive(tenant, item, loc, dec!(5)))?;
                let b = txn.append(receive(tenant, item, loc, dec!(3)))?;
                assert_eq!(a.sequence_number, 1);
                assert_eq!(b.sequence_number, 2);
                Ok(())
            })
            .unwrap();

        let bal = store.balance(tenant, item, loc).unwrap().unwrap();
        assert_eq!(bal.qty_on_hand, dec!(8));
        assert_eq!(store.stream(tenant, item, loc).unwrap().len(), 2);
    }

    #[test]
    fn failed_txn_persists_nothing() {
        let store = InventoryStore::new();
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());

        let err = store
            .with_row(tenant, item, loc, |txn| {
                txn.append(receive(tenant, item, loc, dec!(5)))?;
                // Overdraw fails the whole unit, including the receipt above.
                txn.append(InventoryEvent::shipped(
                    tenant,
                    item,
                    loc,
                    dec!(9),
                    dec!(2),
                    None,
                    "so:1",
                    UserId::new(),
                ))?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, DomainError::NegativeQuantity(_)));
        assert!(store.stream(tenant, item, loc).unwrap().is_empty());
        let bal = store.balance(tenant, item, loc).unwrap().unwrap();
        assert_eq!(bal.qty_on_hand, dec!(0));
    }

    #[test]
    fn closure_error_discards_staged_appends() {
        let store = InventoryStore::new();
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());

        let err: DomainResult<()> = store.with_row(tenant, item, loc, |txn| {
            txn.append(receive(tenant, item, loc, dec!(5)))?;
            // A later step of the unit fails (e.g. a rejected journal post).
            Err(DomainError::unbalanced_journal("simulated ledger rejection"))
        });

        assert!(err.is_err());
        assert!(store.stream(tenant, item, loc).unwrap().is_empty());
    }

    #[test]
    fn mismatched_event_target_is_rejected() {
        let store = InventoryStore::new();
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());
        let other_item = ItemId::new();

        let err = store
            .with_row(tenant, item, loc, |txn| {
                txn.append(receive(tenant, other_item, loc, dec!(5)))
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::ScopeMismatch(_)));
    }

    #[test]
    fn multi_row_unit_commits_and_rolls_back_together() {
        let store = InventoryStore::new();
        let tenant = TenantId::new();
        let loc = LocationId::new();
        let (item_a, item_b) = (ItemId::new(), ItemId::new());
        let rows = [(item_a, loc), (item_b, loc)];

        store
            .with_rows(tenant, &rows, |txns| {
                find_row_txn(txns, item_a, loc)?.append(receive(tenant, item_a, loc, dec!(5)))?;
                find_row_txn(txns, item_b, loc)?.append(receive(tenant, item_b, loc, dec!(3)))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.balance(tenant, item_a, loc).unwrap().unwrap().qty_on_hand, dec!(5));
        assert_eq!(store.balance(tenant, item_b, loc).unwrap().unwrap().qty_on_hand, dec!(3));

        // A failure in the second row discards the first row's staged append.
        let err = store
            .with_rows(tenant, &rows, |txns| {
                find_row_txn(txns, item_a, loc)?.append(receive(tenant, item_a, loc, dec!(1)))?;
                find_row_txn(txns, item_b, loc)?.append(InventoryEvent::shipped(
                    tenant,
                    item_b,
                    loc,
                    dec!(9),
                    dec!(2),
                    None,
                    "so:1",
                    UserId::new(),
                ))?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::NegativeQuantity(_)));
        assert_eq!(store.balance(tenant, item_a, loc).unwrap().unwrap().qty_on_hand, dec!(5));
        assert_eq!(store.stream(tenant, item_a, loc).unwrap().len(), 1);
        assert_eq!(store.stream(tenant, item_b, loc).unwrap().len(), 1);
    }

    #[test]
    fn events_lists_newest_first_with_limit() {
        let store = InventoryStore::new();
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());

        store
            .with_row(tenant, item, loc, |txn| {
                for _ in 0..3 {
                    txn.append(receive(tenant, item, loc, dec!(1)))?;
                }
                Ok(())
            })
            .unwrap();

        let events = store.events(tenant, item, loc, Some(2)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence_number, 3);
        assert_eq!(events[1].sequence_number, 2);
    }

    #[test]
    fn find_event_is_tenant_scoped() {
        let store = InventoryStore::new();
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());

        let stored = store
            .with_row(tenant, item, loc, |txn| {
                txn.append(receive(tenant, item, loc, dec!(5)))
            })
            .unwrap();

        assert!(store.find_event(tenant, stored.event_id).unwrap().is_some());
        assert!(store
            .find_event(TenantId::new(), stored.event_id)
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .find_event(tenant, stored.event_id)
                .unwrap()
                .unwrap()
                .event
                .event_type,
            InventoryEventType::StockReceived
        );
    }

    #[test]
    fn poisoned_row_surfaces_as_retryable_contention_on_reads() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InventoryStore::new());
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());

        let stored = store
            .with_row(tenant, item, loc, |txn| {
                txn.append(receive(tenant, item, loc, dec!(5)))
            })
            .unwrap();

        // Panic while holding the row lock to poison it.
        let poisoner = Arc::clone(&store);
        let handle = thread::spawn(move || {
            let _: DomainResult<()> = poisoner.with_row(tenant, item, loc, |_txn| panic!());
        });
        assert!(handle.join().is_err());

        // Every path over the poisoned row reports retryable contention,
        // never a silently empty result.
        let err = store.balance(tenant, item, loc).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            store.stream(tenant, item, loc),
            Err(DomainError::LockContention(_))
        ));
        assert!(matches!(
            store.find_event(tenant, stored.event_id),
            Err(DomainError::LockContention(_))
        ));
        assert!(matches!(
            store.balances(tenant),
            Err(DomainError::LockContention(_))
        ));
        assert!(matches!(
            store.with_row(tenant, item, loc, |_txn| Ok(())),
            Err(DomainError::LockContention(_))
        ));
    }

    #[test]
    fn concurrent_appends_serialize_per_row() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InventoryStore::new());
        let (tenant, item, loc) = (TenantId::new(), ItemId::new(), LocationId::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .with_row(tenant, item, loc, |txn| {
                            txn.append(receive(tenant, item, loc, dec!(1)))
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stream = store.stream(tenant, item, loc).unwrap();
        assert_eq!(stream.len(), 8);
        let seqs: Vec<u64> = stream.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, (1..=8).collect::<Vec<u64>>());
        assert_eq!(
            store.balance(tenant, item, loc).unwrap().unwrap().qty_on_hand,
            dec!(8)
        );
    }
}
