//! Shared, observable entity handles.
//!
//! A [`Record`] is the one in-memory instance of a persisted (or about to be
//! persisted) entity. Every view that shows it holds a clone of the same
//! handle, and two handles are the same record iff [`Record::same`] says so.
//! The handle is `Rc`-based: records, lists and their listeners all live on
//! the presentation thread.

use super::{Entity, EntityId, INVALID_ID};
use crate::error::{DepotError, GatewayError, ValidationError};
use crate::gateway::TableGateway;
use crate::notify::{ChangeBus, Listener};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

struct RecordState<E> {
    /// What views display and edit
    current: E,
    /// Last copy known to match the store (or the initial copy, if never saved)
    last_good: E,
    dirty: bool,
}

struct RecordInner<E> {
    state: RefCell<RecordState<E>>,
    gateway: RefCell<Option<Rc<dyn TableGateway<E>>>>,
    changes: ChangeBus,
}

/// Shared handle to one entity instance
pub struct Record<E: Entity> {
    inner: Rc<RecordInner<E>>,
}

impl<E: Entity> Clone for Record<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Entity> fmt::Debug for Record<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Record")
            .field("entity", &state.current)
            .field("dirty", &state.dirty)
            .field("attached", &self.inner.gateway.borrow().is_some())
            .finish()
    }
}

impl<E: Entity> Record<E> {
    /// Wrap an entity. The record is detached until a list adopts it.
    pub fn new(entity: E) -> Self {
        Self {
            inner: Rc::new(RecordInner {
                state: RefCell::new(RecordState {
                    last_good: entity.clone(),
                    current: entity,
                    dirty: false,
                }),
                gateway: RefCell::new(None),
                changes: ChangeBus::new(),
            }),
        }
    }

    /// Wrap an entity already bound to a gateway
    pub fn attached(entity: E, gateway: Rc<dyn TableGateway<E>>) -> Self {
        let record = Self::new(entity);
        record.attach(gateway);
        record
    }

    pub fn id(&self) -> EntityId {
        self.inner.state.borrow().current.id()
    }

    pub fn is_new(&self) -> bool {
        self.id() == INVALID_ID
    }

    pub fn label(&self) -> String {
        self.inner.state.borrow().current.label()
    }

    /// Copy of the current field values
    pub fn snapshot(&self) -> E {
        self.inner.state.borrow().current.clone()
    }

    /// Read the current values without cloning them
    pub fn with<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.inner.state.borrow().current)
    }

    /// Borrow the current values. Do not hold the guard across a mutation.
    pub fn borrow(&self) -> Ref<'_, E> {
        Ref::map(self.inner.state.borrow(), |state| &state.current)
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.borrow().dirty
    }

    /// Whether both handles refer to the same instance
    pub fn same(&self, other: &Record<E>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn gateway(&self) -> Option<Rc<dyn TableGateway<E>>> {
        self.inner.gateway.borrow().clone()
    }

    /// Point this record at the gateway of the list that owns it
    pub(crate) fn attach(&self, gateway: Rc<dyn TableGateway<E>>) {
        *self.inner.gateway.borrow_mut() = Some(gateway);
    }

    pub(crate) fn downgrade(&self) -> WeakRecord<E> {
        WeakRecord(Rc::downgrade(&self.inner))
    }

    pub fn subscribe(&self, listener: &Listener) -> bool {
        self.inner.changes.subscribe(listener)
    }

    pub fn unsubscribe(&self, listener: &Listener) -> bool {
        self.inner.changes.unsubscribe(listener)
    }

    /// Apply a validated mutation
    ///
    /// The closure runs against a scratch copy; the record only changes (and
    /// subscribers are only told) when it returns `Ok`. A rejected value
    /// leaves the previous one in place.
    ///
    /// ```
    /// use depot::entity::{Record, Warehouse};
    ///
    /// let record = Record::new(Warehouse::new("Main", "1 Dock Rd", "", "", "", 10).unwrap());
    /// assert!(record.edit(|w| w.set_zip("too long for a zip")).is_err());
    /// record.edit(|w| w.set_zip("78701")).unwrap();
    /// assert_eq!(record.borrow().zip(), "78701");
    /// assert!(record.is_dirty());
    /// ```
    pub fn edit<F>(&self, f: F) -> Result<(), ValidationError>
    where
        F: FnOnce(&mut E) -> Result<(), ValidationError>,
    {
        let mut scratch = self.snapshot();
        f(&mut scratch)?;
        {
            let mut state = self.inner.state.borrow_mut();
            state.current = scratch;
            state.dirty = true;
        }
        self.inner.changes.notify();
        Ok(())
    }

    /// Persist the current values
    ///
    /// Validation runs first and nothing reaches the store if it fails.
    /// Transient records are inserted and pick up the store-assigned id;
    /// persisted ones are updated. When an update fails, a clashing unique
    /// key included, the record is rolled
    /// back to the store's copy (or, if that cannot be read either, to the
    /// last copy known good) and subscribers are told so views redraw. A
    /// failed insert keeps the entered values.
    pub fn save(&self) -> Result<(), DepotError> {
        let gateway = self.gateway().ok_or(GatewayError::Detached)?;
        let entity = self.snapshot();

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::save_span(E::KIND.as_str(), entity.id()).entered();

        entity.validate()?;

        if entity.is_new() {
            if let Some(key) = entity.unique_key() {
                if gateway.key_exists(key, INVALID_ID)? {
                    return Err(DepotError::Duplicate {
                        kind: E::KIND,
                        key: key.to_string(),
                    });
                }
            }
            let id = gateway.insert(&entity).map_err(|e| {
                log::warn!("Insert of new {} failed: {e}", E::KIND);
                #[cfg(feature = "metrics")]
                METRICS.record_gateway_failure("insert");
                e
            })?;
            {
                let mut state = self.inner.state.borrow_mut();
                state.current.set_id(id);
                state.last_good = state.current.clone();
                state.dirty = false;
            }
            log::debug!("Inserted {} {id}", E::KIND);
        } else {
            if let Err(err) = Self::update_checked(gateway.as_ref(), &entity) {
                log::warn!("Update of {} {} failed: {err}", E::KIND, entity.id());
                self.roll_back(gateway.as_ref(), entity.id());
                self.inner.changes.notify();
                return Err(err);
            }
            let mut state = self.inner.state.borrow_mut();
            state.last_good = state.current.clone();
            state.dirty = false;
        }

        self.inner.changes.notify();
        Ok(())
    }

    fn update_checked(gateway: &dyn TableGateway<E>, entity: &E) -> Result<(), DepotError> {
        if let Some(key) = entity.unique_key() {
            if gateway.key_exists(key, entity.id())? {
                return Err(DepotError::Duplicate {
                    kind: E::KIND,
                    key: key.to_string(),
                });
            }
        }
        gateway.update(entity).map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_gateway_failure("update");
            e
        })?;
        Ok(())
    }

    fn roll_back(&self, gateway: &dyn TableGateway<E>, id: EntityId) {
        let restored = match gateway.fetch_by_id(id) {
            Ok(fresh) => fresh,
            Err(refetch) => {
                log::warn!(
                    "Could not re-read {} {id} after failed update ({refetch}); restoring last saved values",
                    E::KIND
                );
                self.inner.state.borrow().last_good.clone()
            }
        };
        let mut state = self.inner.state.borrow_mut();
        state.last_good = restored.clone();
        state.current = restored;
        state.dirty = false;
    }

    /// Delete the record from the store
    ///
    /// Unsaved records have nothing store-side, so this is a no-op for them.
    /// Removing the record from its list is the caller's job.
    pub fn delete(&self) -> Result<(), DepotError> {
        if self.is_new() {
            return Ok(());
        }
        let gateway = self.gateway().ok_or(GatewayError::Detached)?;
        let id = self.id();
        gateway.delete(id).map_err(|e| {
            log::warn!("Delete of {} {id} failed: {e}", E::KIND);
            #[cfg(feature = "metrics")]
            METRICS.record_gateway_failure("delete");
            e
        })?;
        log::debug!("Deleted {} {id}", E::KIND);
        Ok(())
    }

    /// Replace the current values with the store's copy
    pub fn reload(&self) -> Result<(), DepotError> {
        if self.is_new() {
            return Ok(());
        }
        let gateway = self.gateway().ok_or(GatewayError::Detached)?;
        let fresh = gateway.fetch_by_id(self.id())?;
        {
            let mut state = self.inner.state.borrow_mut();
            state.last_good = fresh.clone();
            state.current = fresh;
            state.dirty = false;
        }
        self.inner.changes.notify();
        Ok(())
    }

    /// Discard unsaved edits
    pub fn revert(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if !state.dirty {
                return;
            }
            state.current = state.last_good.clone();
            state.dirty = false;
        }
        self.inner.changes.notify();
    }
}

/// Non-owning reference held by list listeners, so a record's own bus does
/// not keep it alive.
pub(crate) struct WeakRecord<E>(Weak<RecordInner<E>>);

impl<E: Entity> WeakRecord<E> {
    pub(crate) fn upgrade(&self) -> Option<Record<E>> {
        self.0.upgrade().map(|inner| Record { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Part, UnitOfQuantity, Warehouse};
    use crate::gateway::TableGateway;
    use crate::store::memory::{MemoryTable, Operation};
    use std::cell::Cell;

    fn warehouse(name: &str) -> Warehouse {
        Warehouse::new(name, "1 Dock Rd", "Austin", "TX", "78701", 100).unwrap()
    }

    fn counter(record: &Record<Warehouse>) -> Rc<Cell<usize>> {
        let count = Rc::new(Cell::new(0));
        let inner = Rc::clone(&count);
        record.subscribe(&Listener::new(move || inner.set(inner.get() + 1)));
        count
    }

    #[test]
    fn test_rejected_edit_changes_nothing() {
        let record = Record::new(warehouse("Main"));
        let notified = counter(&record);

        let err = record.edit(|w| w.set_storage_capacity(0)).unwrap_err();

        assert_eq!(err.field, "storage_capacity");
        assert_eq!(record.borrow().storage_capacity(), 100);
        assert!(!record.is_dirty());
        assert_eq!(notified.get(), 0);
    }

    #[test]
    fn test_save_detached_record_fails() {
        let record = Record::new(warehouse("Main"));
        let err = record.save().unwrap_err();
        assert_eq!(err, DepotError::Gateway(GatewayError::Detached));
    }

    #[test]
    fn test_insert_assigns_id_and_notifies() {
        let table = MemoryTable::<Warehouse>::new();
        let record = Record::attached(warehouse("Main"), Rc::new(table.clone()));
        let notified = counter(&record);

        record.save().unwrap();

        assert!(!record.is_new());
        assert_eq!(table.len(), 1);
        assert_eq!(notified.get(), 1);
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_duplicate_warehouse_name_is_refused_before_insert() {
        let table = MemoryTable::<Warehouse>::new();
        table.seed(vec![warehouse("Main")]);
        let record = Record::attached(warehouse("Main"), Rc::new(table.clone()));

        let err = record.save().unwrap_err();

        assert!(matches!(err, DepotError::Duplicate { .. }));
        assert_eq!(table.calls(Operation::Insert), 0);
    }

    #[test]
    fn test_failed_update_restores_store_copy() {
        let table = MemoryTable::<Warehouse>::new();
        let ids = table.seed(vec![warehouse("Main")]);
        let record = Record::attached(table.get(ids[0]).unwrap(), Rc::new(table.clone()));
        let notified = counter(&record);

        record.edit(|w| w.set_city("Dallas")).unwrap();
        table.fail_next(Operation::Update, GatewayError::Store("disk full".into()));
        let err = record.save().unwrap_err();

        assert!(matches!(err, DepotError::Gateway(GatewayError::Store(_))));
        assert_eq!(record.borrow().city(), "Austin");
        assert!(!record.is_dirty());
        // one for the edit, one for the rollback
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn test_duplicate_key_on_update_restores_store_copy() {
        let table = MemoryTable::<Warehouse>::new();
        let ids = table.seed(vec![warehouse("Main"), warehouse("Annex")]);
        let annex = Record::attached(table.get(ids[1]).unwrap(), Rc::new(table.clone()));
        let notified = counter(&annex);

        annex.edit(|w| w.set_name("Main")).unwrap();
        let err = annex.save().unwrap_err();

        assert!(matches!(err, DepotError::Duplicate { .. }));
        assert_eq!(annex.borrow().name(), "Annex");
        assert!(!annex.is_dirty());
        assert_eq!(notified.get(), 2);
        assert_eq!(table.calls(Operation::Update), 0);
    }

    #[test]
    fn test_failed_key_check_on_update_restores_store_copy() {
        let table = MemoryTable::<Warehouse>::new();
        let ids = table.seed(vec![warehouse("Main")]);
        let record = Record::attached(table.get(ids[0]).unwrap(), Rc::new(table.clone()));
        let notified = counter(&record);

        record.edit(|w| w.set_name("Central")).unwrap();
        table.fail_next(Operation::KeyExists, GatewayError::Unavailable("down".into()));
        let err = record.save().unwrap_err();

        assert!(matches!(err, DepotError::Gateway(GatewayError::Unavailable(_))));
        assert_eq!(record.borrow().name(), "Main");
        assert!(!record.is_dirty());
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn test_failed_update_falls_back_to_last_good_when_refetch_fails() {
        let table = MemoryTable::<Warehouse>::new();
        let ids = table.seed(vec![warehouse("Main")]);
        let record = Record::attached(table.get(ids[0]).unwrap(), Rc::new(table.clone()));

        record.edit(|w| w.set_city("Dallas")).unwrap();
        table.fail_next(Operation::Update, GatewayError::Unavailable("down".into()));
        table.fail_next(Operation::FetchById, GatewayError::Unavailable("down".into()));
        assert!(record.save().is_err());

        assert_eq!(record.borrow().city(), "Austin");
    }

    #[test]
    fn test_failed_insert_keeps_entered_values() {
        let table = MemoryTable::<Warehouse>::new();
        let record = Record::attached(warehouse("Main"), Rc::new(table.clone()));
        record.edit(|w| w.set_city("Dallas")).unwrap();
        table.fail_next(Operation::Insert, GatewayError::Store("constraint".into()));

        assert!(record.save().is_err());

        assert!(record.is_new());
        assert_eq!(record.borrow().city(), "Dallas");
        assert!(record.is_dirty());
    }

    #[test]
    fn test_revert_discards_edits() {
        let record = Record::new(warehouse("Main"));
        record.edit(|w| w.set_name("Annex")).unwrap();
        record.revert();
        assert_eq!(record.borrow().name(), "Main");
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_reload_picks_up_store_changes() {
        let table = MemoryTable::<Part>::new();
        let part = Part::new("P-1", "Bolt", "Acme", UnitOfQuantity::Pieces, "").unwrap();
        let ids = table.seed(vec![part]);
        let record = Record::attached(table.get(ids[0]).unwrap(), Rc::new(table.clone()));

        let mut changed = table.get(ids[0]).unwrap();
        changed.set_name("Hex bolt").unwrap();
        table.update(&changed).unwrap();
        assert_eq!(record.borrow().name(), "Bolt");

        record.reload().unwrap();
        assert_eq!(record.borrow().name(), "Hex bolt");
    }

    #[test]
    fn test_delete_of_unsaved_record_skips_store() {
        let table = MemoryTable::<Warehouse>::new();
        let record = Record::attached(warehouse("Main"), Rc::new(table.clone()));
        record.delete().unwrap();
        assert_eq!(table.calls(Operation::Delete), 0);
    }

    #[test]
    fn test_clones_are_the_same_record() {
        let a = Record::new(warehouse("Main"));
        let b = a.clone();
        let c = Record::new(warehouse("Main"));
        assert!(a.same(&b));
        assert!(!a.same(&c));
    }
}
