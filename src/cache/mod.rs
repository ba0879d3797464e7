//! Identity-mapped list cache.
//!
//! One [`EntityList`] per entity kind holds every resident [`Record`] in
//! display order together with an id → record identity map. Full reloads go
//! through [`EntityList::reconcile`], which only adds and evicts: records
//! already resident keep their instance and their (possibly edited) values,
//! and unsaved local records are never evicted.
//!
//! The list listens to each of its records. When an unsaved record is
//! inserted and announces its new id, the identity map is re-keyed in place
//! so the record keeps its display position.

pub mod guard;

use crate::entity::record::WeakRecord;
use crate::entity::{Entity, EntityId, Record, INVALID_ID};
use crate::error::{DepotError, GatewayError};
use crate::gateway::TableGateway;
use crate::notify::{ChangeBus, Listener};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// A resident record and the listener the list registered on it
struct Entry<E: Entity> {
    record: Record<E>,
    listener: Listener,
}

struct ListState<E: Entity> {
    items: Vec<Entry<E>>,
    by_id: HashMap<EntityId, Record<E>>,
    pending_new: Vec<Record<E>>,
    suppress_notify: bool,
    changed: bool,
}

struct ListInner<E: Entity> {
    state: RefCell<ListState<E>>,
    gateway: Rc<dyn TableGateway<E>>,
    changes: ChangeBus,
}

/// The cache of one entity kind
pub struct EntityList<E: Entity> {
    inner: Rc<ListInner<E>>,
}

impl<E: Entity> Clone for EntityList<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Entity> fmt::Debug for EntityList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("EntityList")
            .field("kind", &E::KIND)
            .field("items", &state.items.len())
            .field("pending_new", &state.pending_new.len())
            .field("listeners", &self.inner.changes.len())
            .finish()
    }
}

impl<E: Entity> EntityList<E> {
    pub fn new(gateway: Rc<dyn TableGateway<E>>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                state: RefCell::new(ListState {
                    items: Vec::new(),
                    by_id: HashMap::new(),
                    pending_new: Vec::new(),
                    suppress_notify: false,
                    changed: false,
                }),
                gateway,
                changes: ChangeBus::new(),
            }),
        }
    }

    /// The gateway every resident record is wired to
    pub fn gateway(&self) -> Rc<dyn TableGateway<E>> {
        Rc::clone(&self.inner.gateway)
    }

    /// Fetch everything and reconcile
    ///
    /// A failed fetch leaves the list exactly as it was.
    pub fn reload(&self) -> Result<(), GatewayError> {
        let gateway = Rc::clone(&self.inner.gateway);
        self.reload_from(|| gateway.fetch_all())
    }

    /// Reconcile against whatever `fetch` returns, e.g. a filtered query
    pub fn reload_from<F>(&self, fetch: F) -> Result<(), GatewayError>
    where
        F: FnOnce() -> Result<Vec<E>, GatewayError>,
    {
        let fetched = fetch().map_err(|e| {
            log::warn!("Reload of {} list failed: {e}", E::KIND);
            #[cfg(feature = "metrics")]
            METRICS.record_gateway_failure("fetch_all");
            e
        })?;
        self.reconcile(fetched);
        Ok(())
    }

    /// Make the list's membership match `fetched`
    ///
    /// Resident persisted records missing from `fetched` are evicted, and
    /// fetched records not yet resident are adopted. Resident records are
    /// never overwritten, and unsaved records always survive. Listeners get
    /// one notification at the end, and none at all if nothing changed, so
    /// reconciling the same snapshot twice is silent the second time.
    pub fn reconcile(&self, fetched: Vec<E>) {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::reconcile_span(E::KIND.as_str(), fetched.len()).entered();

        let fetched_ids: HashSet<EntityId> = fetched.iter().map(Entity::id).collect();
        let (removed, added) = {
            let mut state = self.inner.state.borrow_mut();
            state.suppress_notify = true;

            let mut removed = 0u64;
            let resident = std::mem::take(&mut state.items);
            for entry in resident {
                let id = entry.record.id();
                if id == INVALID_ID || fetched_ids.contains(&id) {
                    state.items.push(entry);
                } else {
                    log::debug!("{} {id} is gone from the store; evicting", E::KIND);
                    state.by_id.remove(&id);
                    entry.record.unsubscribe(&entry.listener);
                    removed += 1;
                }
            }

            let mut added = 0u64;
            for entity in fetched {
                let id = entity.id();
                if id == INVALID_ID {
                    log::warn!("Ignoring fetched {} without an id", E::KIND);
                    continue;
                }
                if state.by_id.contains_key(&id) {
                    continue;
                }
                let record = Record::attached(entity, Rc::clone(&self.inner.gateway));
                let listener = self.listener_for(&record);
                record.subscribe(&listener);
                state.by_id.insert(id, record.clone());
                state.items.push(Entry { record, listener });
                added += 1;
            }

            (removed, added)
        };

        log::debug!(
            "Reconciled {} list: {added} added, {removed} evicted",
            E::KIND
        );
        #[cfg(feature = "metrics")]
        METRICS.record_reconcile(E::KIND.as_str(), added + removed);

        let fire = {
            let mut state = self.inner.state.borrow_mut();
            state.suppress_notify = false;
            let fire = state.changed || added + removed > 0;
            state.changed = false;
            fire
        };
        if fire {
            self.inner.changes.notify();
        }
    }

    /// Append a new, unsaved entity
    ///
    /// Only one unsaved record per list is allowed; a second one is refused
    /// with [`DepotError::UnsavedPending`] until the first is saved or
    /// removed. Entities that already carry a store id are refused too.
    pub fn add_local(&self, entity: E) -> Result<Record<E>, DepotError> {
        if !entity.is_new() {
            return Err(DepotError::NotTransient {
                kind: E::KIND,
                id: entity.id(),
            });
        }
        let mut state = self.inner.state.borrow_mut();
        if let Some(pending) = state.by_id.get(&INVALID_ID) {
            return Err(DepotError::UnsavedPending {
                kind: E::KIND,
                label: pending.label(),
            });
        }
        let record = Record::attached(entity, Rc::clone(&self.inner.gateway));
        let listener = self.listener_for(&record);
        record.subscribe(&listener);
        state.by_id.insert(INVALID_ID, record.clone());
        state.pending_new.push(record.clone());
        state.items.push(Entry {
            record: record.clone(),
            listener,
        });
        drop(state);

        self.changed();
        Ok(record)
    }

    /// Drop a record from the list. Never touches the store.
    pub fn remove_local(&self, record: &Record<E>) -> bool {
        let found = {
            let mut state = self.inner.state.borrow_mut();
            match state.items.iter().position(|e| e.record.same(record)) {
                Some(pos) => {
                    let entry = state.items.remove(pos);
                    entry.record.unsubscribe(&entry.listener);
                    let id = record.id();
                    if state.by_id.get(&id).is_some_and(|r| r.same(record)) {
                        state.by_id.remove(&id);
                    }
                    state.pending_new.retain(|r| !r.same(record));
                    true
                }
                None => false,
            }
        };
        if found {
            self.changed();
        }
        found
    }

    /// Look a record up by id. [`INVALID_ID`] finds the unsaved record, if any.
    pub fn find_by_id(&self, id: EntityId) -> Option<Record<E>> {
        self.inner.state.borrow().by_id.get(&id).cloned()
    }

    /// The unsaved record, if one was added and not saved yet
    pub fn pending(&self) -> Option<Record<E>> {
        self.inner.state.borrow().pending_new.first().cloned()
    }

    /// Resident records in display order
    pub fn items(&self) -> Vec<Record<E>> {
        self.inner
            .state
            .borrow()
            .items
            .iter()
            .map(|e| e.record.clone())
            .collect()
    }

    /// Current values of every resident record, in display order
    pub fn snapshot(&self) -> Vec<E> {
        self.inner
            .state
            .borrow()
            .items
            .iter()
            .map(|e| e.record.snapshot())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().items.is_empty()
    }

    pub fn contains(&self, record: &Record<E>) -> bool {
        self.inner
            .state
            .borrow()
            .items
            .iter()
            .any(|e| e.record.same(record))
    }

    /// Whether `record` was added locally and has not been inserted yet
    pub fn is_pending(&self, record: &Record<E>) -> bool {
        self.inner
            .state
            .borrow()
            .pending_new
            .iter()
            .any(|r| r.same(record))
    }

    pub fn subscribe(&self, listener: &Listener) -> bool {
        self.inner.changes.subscribe(listener)
    }

    pub fn unsubscribe(&self, listener: &Listener) -> bool {
        self.inner.changes.unsubscribe(listener)
    }

    fn listener_for(&self, record: &Record<E>) -> Listener {
        let list: Weak<ListInner<E>> = Rc::downgrade(&self.inner);
        let record: WeakRecord<E> = record.downgrade();
        Listener::new(move || {
            if let (Some(inner), Some(record)) = (list.upgrade(), record.upgrade()) {
                EntityList { inner }.entity_changed(&record);
            }
        })
    }

    /// A resident record announced a change
    fn entity_changed(&self, record: &Record<E>) {
        let id = record.id();
        {
            let mut state = self.inner.state.borrow_mut();
            let pending = state.pending_new.iter().position(|r| r.same(record));
            if let (Some(pos), true) = (pending, id != INVALID_ID) {
                state.pending_new.remove(pos);
                if state
                    .by_id
                    .get(&INVALID_ID)
                    .is_some_and(|r| r.same(record))
                {
                    state.by_id.remove(&INVALID_ID);
                }
                state.by_id.insert(id, record.clone());
                log::debug!("Re-keyed new {} under id {id}", E::KIND);
            }
        }
        self.changed();
    }

    /// Notify now, or remember to once the current bulk operation ends
    fn changed(&self) {
        let deferred = {
            let mut state = self.inner.state.borrow_mut();
            if state.suppress_notify {
                state.changed = true;
            }
            state.suppress_notify
        };
        if !deferred {
            self.inner.changes.notify();
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let state = self.inner.state.borrow();
        assert_eq!(state.items.len(), state.by_id.len());
        for entry in &state.items {
            let mapped = state.by_id.get(&entry.record.id());
            assert!(mapped.is_some_and(|r| r.same(&entry.record)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Part, UnitOfQuantity};
    use crate::store::memory::{MemoryTable, Operation};
    use std::cell::Cell;

    fn part(id: EntityId, number: &str) -> Part {
        Part::with_id(id, number, "Bolt", "Acme", UnitOfQuantity::Pieces, "").unwrap()
    }

    fn new_part(number: &str) -> Part {
        Part::new(number, "Bolt", "Acme", UnitOfQuantity::Pieces, "").unwrap()
    }

    fn list() -> (EntityList<Part>, MemoryTable<Part>, Rc<Cell<usize>>) {
        let table = MemoryTable::<Part>::new();
        let list = EntityList::new(Rc::new(table.clone()) as Rc<dyn TableGateway<Part>>);
        let count = Rc::new(Cell::new(0));
        let inner = Rc::clone(&count);
        list.subscribe(&Listener::new(move || inner.set(inner.get() + 1)));
        (list, table, count)
    }

    #[test]
    fn test_reconcile_into_empty_list_notifies_once() {
        let (list, _, notified) = list();

        list.reconcile(vec![part(1, "P-1"), part(2, "P-2")]);

        assert_eq!(list.len(), 2);
        assert_eq!(notified.get(), 1);
        list.assert_consistent();
    }

    #[test]
    fn test_second_identical_reconcile_is_silent() {
        let (list, _, notified) = list();
        let fetched = vec![part(1, "P-1"), part(2, "P-2")];

        list.reconcile(fetched.clone());
        let before = list.items();
        list.reconcile(fetched);

        assert_eq!(notified.get(), 1);
        let after = list.items();
        assert_eq!(before.len(), after.len());
        assert!(before.iter().zip(&after).all(|(a, b)| a.same(b)));
    }

    #[test]
    fn test_reconcile_keeps_one_instance_per_id() {
        let (list, _, _) = list();
        list.reconcile(vec![part(1, "P-1"), part(2, "P-2")]);
        let first = list.find_by_id(2).unwrap();

        list.reconcile(vec![part(2, "P-2"), part(3, "P-3")]);
        list.reconcile(vec![part(2, "P-2"), part(3, "P-3"), part(3, "P-3")]);

        assert_eq!(list.len(), 2);
        assert!(list.find_by_id(2).unwrap().same(&first));
        list.assert_consistent();
    }

    #[test]
    fn test_reconcile_empty_evicts_everything_persisted() {
        let (list, _, notified) = list();
        list.reconcile(vec![part(1, "P-1")]);

        list.reconcile(Vec::new());

        assert!(list.is_empty());
        assert!(list.find_by_id(1).is_none());
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn test_reconcile_never_overwrites_resident_values() {
        let (list, _, _) = list();
        list.reconcile(vec![part(1, "P-1")]);
        let record = list.find_by_id(1).unwrap();
        record.edit(|p| p.set_name("Edited locally")).unwrap();

        let mut upstream = part(1, "P-1");
        upstream.set_name("Changed upstream").unwrap();
        list.reconcile(vec![upstream]);

        assert_eq!(record.borrow().name(), "Edited locally");
    }

    #[test]
    fn test_unsaved_record_survives_reconcile() {
        let (list, _, _) = list();
        list.reconcile(vec![part(1, "P-1")]);
        let pending = list.add_local(new_part("P-new")).unwrap();

        list.reconcile(vec![part(1, "P-1")]);
        list.reconcile(Vec::new());

        assert!(list.contains(&pending));
        assert!(list.is_pending(&pending));
        assert_eq!(list.len(), 1);
        list.assert_consistent();
    }

    #[test]
    fn test_second_unsaved_record_is_refused() {
        let (list, _, notified) = list();
        list.add_local(new_part("P-a")).unwrap();

        let err = list.add_local(new_part("P-b")).unwrap_err();

        assert!(matches!(err, DepotError::UnsavedPending { .. }));
        assert_eq!(list.len(), 1);
        assert_eq!(notified.get(), 1);
    }

    #[test]
    fn test_add_local_refuses_persisted_entity() {
        let (list, _, _) = list();
        let err = list.add_local(part(4, "P-4")).unwrap_err();
        assert_eq!(
            err,
            DepotError::NotTransient {
                kind: crate::entity::EntityKind::Part,
                id: 4
            }
        );
        assert!(list.is_empty());
    }

    #[test]
    fn test_first_save_rekeys_in_place() {
        let (list, table, notified) = list();
        list.reconcile(vec![]);
        table.seed(vec![new_part("P-0")]);
        list.reload().unwrap();
        let pending = list.add_local(new_part("P-new")).unwrap();
        let position_before = list.items().iter().position(|r| r.same(&pending));

        pending.save().unwrap();

        let id = pending.id();
        assert_ne!(id, INVALID_ID);
        assert!(list.find_by_id(id).unwrap().same(&pending));
        assert!(list.find_by_id(INVALID_ID).is_none());
        assert!(!list.is_pending(&pending));
        assert_eq!(
            list.items().iter().position(|r| r.same(&pending)),
            position_before
        );
        // reload, add_local, save
        assert_eq!(notified.get(), 3);
        list.assert_consistent();

        // now a second new record is allowed
        assert!(list.add_local(new_part("P-next")).is_ok());
    }

    #[test]
    fn test_saved_record_not_duplicated_by_reload() {
        let (list, _, _) = list();
        let pending = list.add_local(new_part("P-new")).unwrap();
        pending.save().unwrap();

        list.reload().unwrap();

        assert_eq!(list.len(), 1);
        assert!(list.items()[0].same(&pending));
    }

    #[test]
    fn test_failed_fetch_leaves_list_untouched() {
        let (list, table, notified) = list();
        list.reconcile(vec![part(1, "P-1")]);
        table.fail_next(Operation::FetchAll, GatewayError::Unavailable("down".into()));

        let err = list.reload().unwrap_err();

        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert_eq!(list.len(), 1);
        assert_eq!(notified.get(), 1);
    }

    #[test]
    fn test_remove_local_reports_presence() {
        let (list, table, notified) = list();
        list.reconcile(vec![part(1, "P-1")]);
        let record = list.find_by_id(1).unwrap();

        assert!(list.remove_local(&record));
        assert!(!list.remove_local(&record));

        assert!(list.is_empty());
        assert_eq!(notified.get(), 2);
        assert_eq!(table.calls(Operation::Delete), 0);
    }

    #[test]
    fn test_removed_record_no_longer_drives_list_notifications() {
        let (list, _, notified) = list();
        list.reconcile(vec![part(1, "P-1")]);
        let record = list.find_by_id(1).unwrap();
        list.remove_local(&record);
        let before = notified.get();

        record.edit(|p| p.set_vendor("Other")).unwrap();

        assert_eq!(notified.get(), before);
    }

    #[test]
    fn test_record_edits_bubble_up_to_list() {
        let (list, _, notified) = list();
        list.reconcile(vec![part(1, "P-1")]);

        list.find_by_id(1)
            .unwrap()
            .edit(|p| p.set_vendor("Other"))
            .unwrap();

        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn test_reconciled_records_are_wired_to_the_gateway() {
        let (list, table, _) = list();
        let ids = table.seed(vec![new_part("P-1")]);
        list.reload().unwrap();

        let record = list.find_by_id(ids[0]).unwrap();
        record.edit(|p| p.set_name("Hex bolt")).unwrap();
        record.save().unwrap();

        assert_eq!(table.get(ids[0]).unwrap().name(), "Hex bolt");
    }
}
