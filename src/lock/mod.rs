//! Advisory edit locks.
//!
//! A record being edited is marked store-side with the editing session and
//! the time the lock was taken. The state machine per record:
//!
//! - Free → Held(session) when `session` acquires it.
//! - Held(session) → Free when the same session releases it, or when a
//!   sweep finds it older than the configured timeout.
//! - Held(a) + acquire by `b` → denied, nothing changes.
//! - Held(a) + acquire by `a` → granted again, nothing changes.
//!
//! This only keeps well-behaved clients from editing the same record at
//! once. A sweep can take a lock away from a live but idle session, so
//! saves must still cope with a concurrent write.
//!
//! A denied lock is an outcome ([`LockOutcome::Denied`]), not an error.

pub mod sweeper;

use crate::entity::{EntityId, INVALID_ID};
use crate::error::GatewayError;
use crate::gateway::{LockGateway, LockHolder};
use crate::session::SessionId;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub use sweeper::LockSweeper;

/// Result of a lock request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Granted,
    /// Another session holds the record. `holder` is filled in when the
    /// store could tell us who.
    Denied { holder: Option<LockHolder> },
}

impl LockOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockOutcome::Granted)
    }
}

/// Result of [`EditLockCoordinator::lease`]
#[derive(Debug)]
pub enum LeaseOutcome {
    Granted(EditLease),
    Denied { holder: Option<LockHolder> },
}

impl LeaseOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, LeaseOutcome::Granted(_))
    }

    pub fn into_lease(self) -> Option<EditLease> {
        match self {
            LeaseOutcome::Granted(lease) => Some(lease),
            LeaseOutcome::Denied { .. } => None,
        }
    }
}

struct CoordinatorInner {
    gateway: Rc<dyn LockGateway>,
    session: SessionId,
    timeout: Duration,
    held: RefCell<BTreeSet<EntityId>>,
}

/// One session's view of the edit locks of one table
#[derive(Clone)]
pub struct EditLockCoordinator {
    inner: Rc<CoordinatorInner>,
}

impl fmt::Debug for EditLockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditLockCoordinator")
            .field("session", &self.inner.session)
            .field("timeout", &self.inner.timeout)
            .field("held", &self.inner.held.borrow())
            .finish()
    }
}

impl EditLockCoordinator {
    /// `timeout` is how old a lock must be before a sweep may clear it
    pub fn new(gateway: Rc<dyn LockGateway>, session: SessionId, timeout: Duration) -> Self {
        Self {
            inner: Rc::new(CoordinatorInner {
                gateway,
                session,
                timeout,
                held: RefCell::new(BTreeSet::new()),
            }),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.inner.session
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Lock `id` for this session
    pub fn acquire(&self, id: EntityId) -> Result<LockOutcome, GatewayError> {
        let session = self.inner.session.clone();
        self.acquire_as(id, Some(&session))
    }

    /// The raw protocol: lock for `session`, or release when `None`
    ///
    /// Unsaved records (sentinel id) have no store row to lock and are
    /// always granted without a store call.
    pub fn acquire_as(
        &self,
        id: EntityId,
        session: Option<&SessionId>,
    ) -> Result<LockOutcome, GatewayError> {
        if id == INVALID_ID {
            return Ok(LockOutcome::Granted);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::lock_span(
            if session.is_some() { "acquire" } else { "release" },
            id,
        )
        .entered();

        let granted = self.inner.gateway.acquire_lock(id, session).map_err(|e| {
            log::warn!("Lock request for part {id} failed: {e}");
            #[cfg(feature = "metrics")]
            METRICS.record_gateway_failure("acquire_lock");
            e
        })?;

        if granted {
            let mut held = self.inner.held.borrow_mut();
            match session {
                None => {
                    held.remove(&id);
                }
                Some(s) if *s == self.inner.session => {
                    held.insert(id);
                }
                Some(_) => {}
            }
            return Ok(LockOutcome::Granted);
        }

        let holder = match self.inner.gateway.query_lock(id) {
            Ok(holder) => holder,
            Err(e) => {
                log::debug!("Could not read lock holder of part {id}: {e}");
                None
            }
        };
        match &holder {
            Some(h) => log::info!("Part {id} is being edited by {}", h.session),
            None => log::info!("Part {id} is locked by another session"),
        }
        #[cfg(feature = "metrics")]
        METRICS.record_lock_denied();
        Ok(LockOutcome::Denied { holder })
    }

    /// Lock `id` and tie the release to the returned lease
    pub fn lease(&self, id: EntityId) -> Result<LeaseOutcome, GatewayError> {
        match self.acquire(id)? {
            LockOutcome::Granted => Ok(LeaseOutcome::Granted(EditLease {
                coordinator: self.clone(),
                id,
                released: false,
            })),
            LockOutcome::Denied { holder } => Ok(LeaseOutcome::Denied { holder }),
        }
    }

    pub fn release(&self, id: EntityId) -> Result<(), GatewayError> {
        self.acquire_as(id, None).map(|_| ())
    }

    /// Release every lock this session took; used at shutdown
    ///
    /// Keeps going past failures and returns the first one.
    pub fn release_all(&self) -> Result<(), GatewayError> {
        let ids: Vec<EntityId> = self.inner.held.borrow().iter().copied().collect();
        let mut first_err = None;
        for id in ids {
            if let Err(e) = self.release(id) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn holder(&self, id: EntityId) -> Result<Option<LockHolder>, GatewayError> {
        if id == INVALID_ID {
            return Ok(None);
        }
        self.inner.gateway.query_lock(id)
    }

    /// Ids this session believes it holds
    pub fn held(&self) -> Vec<EntityId> {
        self.inner.held.borrow().iter().copied().collect()
    }

    pub fn is_held(&self, id: EntityId) -> bool {
        self.inner.held.borrow().contains(&id)
    }

    /// Stop tracking `id` without a store call; its row is gone
    pub(crate) fn forget(&self, id: EntityId) {
        self.inner.held.borrow_mut().remove(&id);
    }

    /// Clear every lock older than the timeout
    ///
    /// Maintenance only: a failure is logged and reported as `None`, never
    /// returned as an error.
    pub fn sweep(&self) -> Option<u64> {
        match self.inner.gateway.sweep_locks(self.inner.timeout) {
            Ok(cleared) => {
                if cleared > 0 {
                    log::info!("Swept {cleared} stale edit lock(s)");
                }
                #[cfg(feature = "metrics")]
                METRICS.record_locks_swept(cleared);
                Some(cleared)
            }
            Err(e) => {
                log::warn!("Edit lock sweep failed: {e}");
                #[cfg(feature = "metrics")]
                METRICS.record_gateway_failure("sweep_locks");
                None
            }
        }
    }
}

/// A granted edit lock, released when the lease is released or dropped
///
/// Dropping the lease on every exit path of an edit view (cancel, save,
/// close, shutdown) is what guarantees the lock is given back. A release
/// that fails on drop is logged; the sweep reclaims the lock later.
#[derive(Debug)]
pub struct EditLease {
    coordinator: EditLockCoordinator,
    id: EntityId,
    released: bool,
}

impl EditLease {
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Release now and report failure
    pub fn release(mut self) -> Result<(), GatewayError> {
        self.released = true;
        if !self.coordinator.is_held(self.id) {
            return Ok(());
        }
        self.coordinator.release(self.id)
    }
}

impl Drop for EditLease {
    fn drop(&mut self) {
        // Already given back, or the row was deleted and forgotten.
        if self.released || !self.coordinator.is_held(self.id) {
            return;
        }
        if let Err(e) = self.coordinator.release(self.id) {
            log::warn!("Failed to release edit lock on part {}: {e}", self.id);
        }
    }
}
