//! In-process store.
//!
//! [`MemoryTable`] implements the gateway traits over a mutex-guarded map.
//! Clones share state, so two caches built over clones of one
//! [`MemoryStore`] behave like two client processes on one database. Tests
//! use the fault queue to make the next call of an operation fail and the
//! call counters to assert that a refused operation never reached the store.

use crate::clock::{Clock, SystemClock};
use crate::entity::{Entity, EntityId, InventoryLine, Part, User, Warehouse, INVALID_ID};
use crate::error::GatewayError;
use crate::gateway::{InventoryGateway, LockGateway, LockHolder, TableGateway};
use crate::session::SessionId;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Gateway operations, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchAll,
    FetchById,
    Insert,
    Update,
    Delete,
    KeyExists,
    FetchForWarehouse,
    QueryLock,
    AcquireLock,
    SweepLocks,
}

struct TableState<E> {
    rows: BTreeMap<EntityId, E>,
    next_id: EntityId,
    locks: HashMap<EntityId, LockHolder>,
    faults: HashMap<Operation, VecDeque<GatewayError>>,
    calls: HashMap<Operation, usize>,
}

impl<E> TableState<E> {
    /// Count the call and pop a queued fault, if any
    fn enter(&mut self, op: Operation) -> Result<(), GatewayError> {
        *self.calls.entry(op).or_default() += 1;
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// One table held in memory
pub struct MemoryTable<E> {
    state: Arc<Mutex<TableState<E>>>,
    clock: Arc<dyn Clock>,
}

impl<E> Clone for MemoryTable<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<E: Entity> Default for MemoryTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemoryTable<E> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TableState {
                rows: BTreeMap::new(),
                next_id: 1,
                locks: HashMap::new(),
                faults: HashMap::new(),
                calls: HashMap::new(),
            })),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, TableState<E>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert rows directly, bypassing counters and faults. Returns the ids.
    pub fn seed(&self, rows: Vec<E>) -> Vec<EntityId> {
        let mut state = self.state();
        rows.into_iter()
            .map(|mut row| {
                let id = state.next_id;
                state.next_id += 1;
                row.set_id(id);
                state.rows.insert(id, row);
                id
            })
            .collect()
    }

    /// Read a row directly, bypassing counters and faults
    pub fn get(&self, id: EntityId) -> Option<E> {
        self.state().rows.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().rows.is_empty()
    }

    /// Make the next call of `op` fail with `err`. Faults queue up in order.
    pub fn fail_next(&self, op: Operation, err: GatewayError) {
        self.state().faults.entry(op).or_default().push_back(err);
    }

    /// How many times `op` was called, failed calls included
    pub fn calls(&self, op: Operation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }
}

impl<E: Entity> TableGateway<E> for MemoryTable<E> {
    fn fetch_all(&self) -> Result<Vec<E>, GatewayError> {
        let mut state = self.state();
        state.enter(Operation::FetchAll)?;
        Ok(state.rows.values().cloned().collect())
    }

    fn fetch_by_id(&self, id: EntityId) -> Result<E, GatewayError> {
        let mut state = self.state();
        state.enter(Operation::FetchById)?;
        state
            .rows
            .get(&id)
            .cloned()
            .ok_or(GatewayError::NotFound { kind: E::KIND, id })
    }

    fn insert(&self, entity: &E) -> Result<EntityId, GatewayError> {
        let mut state = self.state();
        state.enter(Operation::Insert)?;
        if entity.id() != INVALID_ID {
            return Err(GatewayError::Conflict(format!(
                "{} {} is already persisted",
                E::KIND,
                entity.id()
            )));
        }
        let id = state.next_id;
        state.next_id += 1;
        let mut row = entity.clone();
        row.set_id(id);
        state.rows.insert(id, row);
        Ok(id)
    }

    fn update(&self, entity: &E) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.enter(Operation::Update)?;
        let id = entity.id();
        match state.rows.get_mut(&id) {
            Some(row) => {
                *row = entity.clone();
                Ok(())
            }
            None => Err(GatewayError::Conflict(format!(
                "{} {id} no longer exists",
                E::KIND
            ))),
        }
    }

    fn delete(&self, id: EntityId) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.enter(Operation::Delete)?;
        state.locks.remove(&id);
        match state.rows.remove(&id) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound { kind: E::KIND, id }),
        }
    }

    fn key_exists(&self, key: &str, excluding: EntityId) -> Result<bool, GatewayError> {
        let mut state = self.state();
        state.enter(Operation::KeyExists)?;
        Ok(state
            .rows
            .iter()
            .any(|(id, row)| *id != excluding && row.unique_key() == Some(key)))
    }
}

impl InventoryGateway for MemoryTable<InventoryLine> {
    fn fetch_for_warehouse(
        &self,
        warehouse_id: EntityId,
    ) -> Result<Vec<InventoryLine>, GatewayError> {
        let mut state = self.state();
        state.enter(Operation::FetchForWarehouse)?;
        Ok(state
            .rows
            .values()
            .filter(|line| line.warehouse_id() == warehouse_id)
            .cloned()
            .collect())
    }
}

impl LockGateway for MemoryTable<Part> {
    fn query_lock(&self, id: EntityId) -> Result<Option<LockHolder>, GatewayError> {
        let mut state = self.state();
        state.enter(Operation::QueryLock)?;
        if !state.rows.contains_key(&id) {
            return Err(GatewayError::NotFound {
                kind: Part::KIND,
                id,
            });
        }
        Ok(state.locks.get(&id).cloned())
    }

    fn acquire_lock(
        &self,
        id: EntityId,
        session: Option<&SessionId>,
    ) -> Result<bool, GatewayError> {
        let now = self.clock.now();
        let mut state = self.state();
        state.enter(Operation::AcquireLock)?;
        if !state.rows.contains_key(&id) {
            return Err(GatewayError::NotFound {
                kind: Part::KIND,
                id,
            });
        }
        let Some(session) = session else {
            state.locks.remove(&id);
            return Ok(true);
        };
        match state.locks.get(&id) {
            Some(holder) => Ok(&holder.session == session),
            None => {
                state.locks.insert(
                    id,
                    LockHolder {
                        session: session.clone(),
                        acquired_at: now,
                    },
                );
                Ok(true)
            }
        }
    }

    fn sweep_locks(&self, older_than: Duration) -> Result<u64, GatewayError> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| GatewayError::Store(format!("lock timeout out of range: {e}")))?;
        let cutoff = self.clock.now() - older_than;
        let mut state = self.state();
        state.enter(Operation::SweepLocks)?;
        let before = state.locks.len();
        state.locks.retain(|_, holder| holder.acquired_at >= cutoff);
        Ok((before - state.locks.len()) as u64)
    }
}

/// The four tables of one simulated database
#[derive(Clone)]
pub struct MemoryStore {
    warehouses: MemoryTable<Warehouse>,
    parts: MemoryTable<Part>,
    inventory: MemoryTable<InventoryLine>,
    users: MemoryTable<User>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            warehouses: MemoryTable::with_clock(Arc::clone(&clock)),
            parts: MemoryTable::with_clock(Arc::clone(&clock)),
            inventory: MemoryTable::with_clock(Arc::clone(&clock)),
            users: MemoryTable::with_clock(clock),
        }
    }

    pub fn warehouses(&self) -> MemoryTable<Warehouse> {
        self.warehouses.clone()
    }

    pub fn parts(&self) -> MemoryTable<Part> {
        self.parts.clone()
    }

    pub fn inventory(&self) -> MemoryTable<InventoryLine> {
        self.inventory.clone()
    }

    pub fn users(&self) -> MemoryTable<User> {
        self.users.clone()
    }
}
