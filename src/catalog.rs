//! Controller-level flows over the four entity lists.
//!
//! A [`Catalog`] belongs to one session. It checks the session's
//! permissions, runs the inventory rules before saves and deletes, and hands
//! out edit leases for parts. Views subscribe to the lists and records it
//! exposes.

use crate::cache::guard;
use crate::cache::EntityList;
use crate::config::LockSettings;
use crate::entity::{Entity, EntityId, InventoryLine, Part, Record, User, Warehouse};
use crate::error::{DepotError, GatewayError};
use crate::executor::SqlExecutor;
use crate::gateway::{InventoryGateway, LockGateway, TableGateway};
use crate::lock::{EditLockCoordinator, LeaseOutcome, LockSweeper};
use crate::session::{Capability, SessionContext};
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgTable;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub struct Catalog {
    session: SessionContext,
    settings: LockSettings,
    warehouses: EntityList<Warehouse>,
    parts: EntityList<Part>,
    inventory: EntityList<InventoryLine>,
    users: EntityList<User>,
    inventory_gateway: Rc<dyn InventoryGateway>,
    locks: EditLockCoordinator,
    sweeper: Option<LockSweeper>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("login", &self.session.login())
            .field("session", &self.session.session_id())
            .field("warehouses", &self.warehouses.len())
            .field("parts", &self.parts.len())
            .field("inventory", &self.inventory.len())
            .field("users", &self.users.len())
            .field("sweeper", &self.sweeper.is_some())
            .finish()
    }
}

impl Catalog {
    /// Wire the lists to their gateways
    ///
    /// A background sweeper is started when `settings` asks for one; it gets
    /// its own clone of the part gateway.
    pub fn new<W, P, I, U>(
        warehouses: W,
        parts: P,
        inventory: I,
        users: U,
        session: SessionContext,
        settings: LockSettings,
    ) -> Self
    where
        W: TableGateway<Warehouse> + 'static,
        P: TableGateway<Part> + LockGateway + Clone + Send + 'static,
        I: InventoryGateway + 'static,
        U: TableGateway<User> + 'static,
    {
        let sweeper = settings
            .sweep_interval()
            .map(|every| LockSweeper::spawn(parts.clone(), settings.timeout(), every));

        let parts = Rc::new(parts);
        let inventory = Rc::new(inventory);
        let part_table: Rc<dyn TableGateway<Part>> = parts.clone();
        let part_locks: Rc<dyn LockGateway> = parts;
        let inventory_table: Rc<dyn TableGateway<InventoryLine>> = inventory.clone();
        let inventory_gateway: Rc<dyn InventoryGateway> = inventory;

        let locks = EditLockCoordinator::new(
            part_locks,
            session.session_id().clone(),
            settings.timeout(),
        );
        log::info!(
            "Opened catalog for {} (session {})",
            session.login(),
            session.session_id()
        );

        Self {
            session,
            settings,
            warehouses: EntityList::new(Rc::new(warehouses)),
            parts: EntityList::new(part_table),
            inventory: EntityList::new(inventory_table),
            users: EntityList::new(Rc::new(users)),
            inventory_gateway,
            locks,
            sweeper,
        }
    }

    /// A catalog over an in-process store
    pub fn in_memory(store: &MemoryStore, session: SessionContext, settings: LockSettings) -> Self {
        Self::new(
            store.warehouses(),
            store.parts(),
            store.inventory(),
            store.users(),
            session,
            settings,
        )
    }

    /// A catalog over Postgres; every table shares `executor`
    pub fn postgres(
        executor: Arc<dyn SqlExecutor + Send + Sync>,
        session: SessionContext,
        settings: LockSettings,
    ) -> Self {
        Self::new(
            PgTable::<Warehouse>::new(Arc::clone(&executor)),
            PgTable::<Part>::new(Arc::clone(&executor)),
            PgTable::<InventoryLine>::new(Arc::clone(&executor)),
            PgTable::<User>::new(executor),
            session,
            settings,
        )
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn warehouses(&self) -> &EntityList<Warehouse> {
        &self.warehouses
    }

    pub fn parts(&self) -> &EntityList<Part> {
        &self.parts
    }

    pub fn inventory(&self) -> &EntityList<InventoryLine> {
        &self.inventory
    }

    pub fn users(&self) -> &EntityList<User> {
        &self.users
    }

    pub fn locks(&self) -> &EditLockCoordinator {
        &self.locks
    }

    fn require(&self, capability: Capability) -> Result<(), DepotError> {
        if self.session.can(capability) {
            return Ok(());
        }
        log::info!("{} may not {capability}", self.session.login());
        Err(DepotError::PermissionDenied(capability.to_string()))
    }

    /// Load the part list, then clear stale locks if configured to
    pub fn open_parts(&self) -> Result<(), GatewayError> {
        self.parts.reload()?;
        if self.settings.sweep_on_open {
            self.locks.sweep();
        }
        Ok(())
    }

    pub fn reload_all(&self) -> Result<(), GatewayError> {
        self.warehouses.reload()?;
        self.open_parts()?;
        self.inventory.reload()?;
        self.users.reload()
    }

    /// Show only the inventory of one warehouse
    ///
    /// Lines of other warehouses are evicted from the inventory list.
    pub fn reload_inventory_for(&self, warehouse_id: EntityId) -> Result<(), GatewayError> {
        let gateway = Rc::clone(&self.inventory_gateway);
        self.inventory
            .reload_from(move || gateway.fetch_for_warehouse(warehouse_id))
    }

    pub fn new_warehouse(&self, warehouse: Warehouse) -> Result<Record<Warehouse>, DepotError> {
        self.require(Capability::Add)?;
        self.warehouses.add_local(warehouse)
    }

    pub fn new_part(&self, part: Part) -> Result<Record<Part>, DepotError> {
        self.require(Capability::Add)?;
        self.parts.add_local(part)
    }

    pub fn new_inventory_line(
        &self,
        line: InventoryLine,
    ) -> Result<Record<InventoryLine>, DepotError> {
        self.require(Capability::Add)?;
        self.inventory.add_local(line)
    }

    pub fn new_user(&self, user: User) -> Result<Record<User>, DepotError> {
        self.require(Capability::Add)?;
        self.users.add_local(user)
    }

    /// Open a part for editing
    ///
    /// A part locked by another session comes back as
    /// [`LeaseOutcome::Denied`]. Keep the lease for as long as the edit view
    /// is open; dropping it gives the lock back.
    pub fn edit_part(&self, part: &Record<Part>) -> Result<LeaseOutcome, DepotError> {
        self.require(Capability::Edit)?;
        Ok(self.locks.lease(part.id())?)
    }

    /// Save any record, checking the Add or Edit permission first
    pub fn save<E: Entity>(&self, record: &Record<E>) -> Result<(), DepotError> {
        self.require(if record.is_new() {
            Capability::Add
        } else {
            Capability::Edit
        })?;
        record.save()
    }

    /// Save an inventory line unless it duplicates another line or overfills
    /// its warehouse
    pub fn save_inventory_line(&self, line: &Record<InventoryLine>) -> Result<(), DepotError> {
        let candidate = line.snapshot();
        let resident = self.inventory.snapshot();

        if let Some(existing) = guard::duplicate_line(&resident, &candidate) {
            return Err(DepotError::Refused(format!(
                "Part {} is already stocked in warehouse {} (line {})",
                candidate.part_id(),
                candidate.warehouse_id(),
                existing.id()
            )));
        }

        if let Some(warehouse) = self.warehouses.find_by_id(candidate.warehouse_id()) {
            let warehouse = warehouse.snapshot();
            let remaining = guard::remaining_capacity(&resident, &warehouse, &candidate);
            if remaining < 0 {
                return Err(DepotError::Refused(format!(
                    "Warehouse {} does not have room for {} more (over by {})",
                    warehouse.label(),
                    candidate.quantity(),
                    -remaining
                )));
            }
        }

        self.save(line)
    }

    /// Delete a warehouse that no inventory line refers to
    pub fn delete_warehouse(&self, warehouse: &Record<Warehouse>) -> Result<(), DepotError> {
        self.require(Capability::Delete)?;
        let id = warehouse.id();
        let references = guard::references_warehouse(&self.inventory.snapshot(), id);
        if references > 0 {
            return Err(DepotError::Referenced {
                kind: Warehouse::KIND,
                id,
                references,
            });
        }
        warehouse.delete()?;
        self.warehouses.remove_local(warehouse);
        Ok(())
    }

    /// Delete a part that no inventory line refers to
    pub fn delete_part(&self, part: &Record<Part>) -> Result<(), DepotError> {
        self.require(Capability::Delete)?;
        let id = part.id();
        let references = guard::references_part(&self.inventory.snapshot(), id);
        if references > 0 {
            return Err(DepotError::Referenced {
                kind: Part::KIND,
                id,
                references,
            });
        }
        part.delete()?;
        self.locks.forget(id);
        self.parts.remove_local(part);
        Ok(())
    }

    pub fn delete_inventory_line(&self, line: &Record<InventoryLine>) -> Result<(), DepotError> {
        self.require(Capability::Delete)?;
        line.delete()?;
        self.inventory.remove_local(line);
        Ok(())
    }

    pub fn delete_user(&self, user: &Record<User>) -> Result<(), DepotError> {
        self.require(Capability::Delete)?;
        user.delete()?;
        self.users.remove_local(user);
        Ok(())
    }

    /// Stop the background sweeper and give back every lock still held
    pub fn shutdown(&mut self) -> Result<(), GatewayError> {
        if let Some(sweeper) = self.sweeper.take() {
            let passes = sweeper.stop();
            log::debug!("Background sweeper stopped after {passes} pass(es)");
        }
        let held = self.locks.held().len();
        self.locks.release_all()?;
        log::info!(
            "Closed catalog for {} ({held} lock(s) released)",
            self.session.login()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::UnitOfQuantity;
    use crate::session::{Permissions, SessionId};
    use crate::store::memory::Operation;

    fn session(permissions: Permissions) -> SessionContext {
        SessionContext::new("clerk", SessionId::new("clerk-1"), permissions)
    }

    fn seeded() -> (MemoryStore, Vec<EntityId>, Vec<EntityId>) {
        let store = MemoryStore::new();
        let warehouses = store.warehouses().seed(vec![
            Warehouse::new("Main", "1 Dock St", "Austin", "TX", "78701", 100).unwrap(),
            Warehouse::new("Annex", "2 Dock St", "Austin", "TX", "78701", 50).unwrap(),
        ]);
        let parts = store.parts().seed(vec![
            Part::new("P-1", "Bolt", "Acme", UnitOfQuantity::Pieces, "").unwrap(),
            Part::new("P-2", "Cable", "Acme", UnitOfQuantity::LinearFeet, "").unwrap(),
        ]);
        store
            .inventory()
            .seed(vec![InventoryLine::new(warehouses[0], parts[0], 60).unwrap()]);
        (store, warehouses, parts)
    }

    #[test]
    fn test_permissions_gate_every_flow() {
        let (store, _, _) = seeded();
        let catalog = Catalog::in_memory(
            &store,
            SessionContext::anonymous(),
            LockSettings::default(),
        );
        catalog.reload_all().unwrap();

        let err = catalog
            .new_part(Part::new("P-9", "Nut", "", UnitOfQuantity::Pieces, "").unwrap())
            .unwrap_err();
        assert!(matches!(err, DepotError::PermissionDenied(_)));

        let part = catalog.parts().items()[0].clone();
        assert!(matches!(
            catalog.edit_part(&part).unwrap_err(),
            DepotError::PermissionDenied(_)
        ));
        assert!(matches!(
            catalog.delete_part(&part).unwrap_err(),
            DepotError::PermissionDenied(_)
        ));
        assert_eq!(store.parts().calls(Operation::AcquireLock), 0);
    }

    #[test]
    fn test_referenced_warehouse_is_not_deleted() {
        let (store, warehouses, _) = seeded();
        let catalog = Catalog::in_memory(
            &store,
            session(Permissions::all()),
            LockSettings::default(),
        );
        catalog.reload_all().unwrap();

        let main = catalog.warehouses().find_by_id(warehouses[0]).unwrap();
        let err = catalog.delete_warehouse(&main).unwrap_err();
        assert!(matches!(err, DepotError::Referenced { references: 1, .. }));
        assert_eq!(store.warehouses().calls(Operation::Delete), 0);
        assert!(catalog.warehouses().contains(&main));

        let annex = catalog.warehouses().find_by_id(warehouses[1]).unwrap();
        catalog.delete_warehouse(&annex).unwrap();
        assert!(!catalog.warehouses().contains(&annex));
        assert!(store.warehouses().get(warehouses[1]).is_none());
    }

    #[test]
    fn test_inventory_rules_refuse_duplicates_and_overfill() {
        let (store, warehouses, parts) = seeded();
        let catalog = Catalog::in_memory(
            &store,
            session(Permissions::all()),
            LockSettings::default(),
        );
        catalog.reload_all().unwrap();

        let dup = catalog
            .new_inventory_line(InventoryLine::new(warehouses[0], parts[0], 1).unwrap())
            .unwrap();
        assert!(matches!(
            catalog.save_inventory_line(&dup).unwrap_err(),
            DepotError::Refused(_)
        ));
        catalog.inventory().remove_local(&dup);

        let over = catalog
            .new_inventory_line(InventoryLine::new(warehouses[0], parts[1], 41).unwrap())
            .unwrap();
        assert!(matches!(
            catalog.save_inventory_line(&over).unwrap_err(),
            DepotError::Refused(_)
        ));
        assert_eq!(store.inventory().calls(Operation::Insert), 0);

        over.edit(|l| l.set_quantity(40)).unwrap();
        catalog.save_inventory_line(&over).unwrap();
        assert!(!over.is_new());
    }

    #[test]
    fn test_edit_lease_and_shutdown_release_locks() {
        let (store, _, parts) = seeded();
        let mut catalog = Catalog::in_memory(
            &store,
            session(Permissions::all()),
            LockSettings::default(),
        );
        catalog.open_parts().unwrap();

        let bolt = catalog.parts().find_by_id(parts[0]).unwrap();
        let _lease = catalog.edit_part(&bolt).unwrap().into_lease().unwrap();
        assert!(catalog.locks().is_held(parts[0]));
        assert!(store.parts().query_lock(parts[0]).unwrap().is_some());

        catalog.shutdown().unwrap();
        assert!(store.parts().query_lock(parts[0]).unwrap().is_none());
        assert!(catalog.locks().held().is_empty());
    }

    #[test]
    fn test_lease_on_deleted_part_skips_release() {
        let (store, _, parts) = seeded();
        let catalog = Catalog::in_memory(
            &store,
            session(Permissions::all()),
            LockSettings::default(),
        );
        catalog.open_parts().unwrap();

        let cable = catalog.parts().find_by_id(parts[1]).unwrap();
        let lease = catalog.edit_part(&cable).unwrap().into_lease().unwrap();
        let lock_calls = store.parts().calls(Operation::AcquireLock);

        catalog.delete_part(&cable).unwrap();
        assert!(!catalog.locks().is_held(parts[1]));
        drop(lease);

        assert_eq!(store.parts().calls(Operation::AcquireLock), lock_calls);
    }

    #[test]
    fn test_reload_inventory_for_one_warehouse() {
        let (store, warehouses, parts) = seeded();
        store
            .inventory()
            .seed(vec![InventoryLine::new(warehouses[1], parts[1], 5).unwrap()]);
        let catalog = Catalog::in_memory(
            &store,
            session(Permissions::all()),
            LockSettings::default(),
        );
        catalog.reload_all().unwrap();
        assert_eq!(catalog.inventory().len(), 2);

        catalog.reload_inventory_for(warehouses[1]).unwrap();
        let lines = catalog.inventory().snapshot();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].warehouse_id(), warehouses[1]);
    }
}
