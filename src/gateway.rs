//! Store gateway interfaces.
//!
//! The cache never talks to a database directly. Each entity kind is backed
//! by a [`TableGateway`]; parts additionally expose the edit-lock columns via
//! [`LockGateway`]. All calls are synchronous and block until the store
//! answers or fails.
//!
//! Implementations live in [`crate::store`].

use crate::entity::{EntityId, InventoryLine};
use crate::error::GatewayError;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// CRUD access to one table
pub trait TableGateway<E> {
    fn fetch_all(&self) -> Result<Vec<E>, GatewayError>;

    fn fetch_by_id(&self, id: EntityId) -> Result<E, GatewayError>;

    /// Insert a transient record and return the id the store assigned
    fn insert(&self, entity: &E) -> Result<EntityId, GatewayError>;

    fn update(&self, entity: &E) -> Result<(), GatewayError>;

    fn delete(&self, id: EntityId) -> Result<(), GatewayError>;

    /// Whether another row (not `excluding`) already uses this business key
    fn key_exists(&self, _key: &str, _excluding: EntityId) -> Result<bool, GatewayError> {
        Ok(false)
    }
}

/// Inventory lines can also be loaded one warehouse at a time
pub trait InventoryGateway: TableGateway<InventoryLine> {
    fn fetch_for_warehouse(&self, warehouse_id: EntityId)
        -> Result<Vec<InventoryLine>, GatewayError>;
}

/// Current holder of an edit lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub session: SessionId,
    pub acquired_at: DateTime<Utc>,
}

/// Store-side edit lock columns
///
/// Lock state lives in the store, not in process memory, so that separate
/// client processes coordinate through it.
pub trait LockGateway {
    fn query_lock(&self, id: EntityId) -> Result<Option<LockHolder>, GatewayError>;

    /// Take the lock for `session`, or release it when `session` is `None`
    ///
    /// Returns `true` when the lock is now held by `session` (or was
    /// released), `false` when another session holds it.
    fn acquire_lock(&self, id: EntityId, session: Option<&SessionId>)
        -> Result<bool, GatewayError>;

    /// Clear every lock acquired more than `older_than` ago; returns how many
    fn sweep_locks(&self, older_than: Duration) -> Result<u64, GatewayError>;
}
