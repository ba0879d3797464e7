//! Error types shared by the cache, the entities and the store gateways.
//!
//! The taxonomy follows how failures are handled by callers:
//!
//! - [`ValidationError`]: a setter or constructor rejected a value. Always
//!   recoverable locally; the mutation is not applied and nothing reaches the store.
//! - [`GatewayError`]: a store operation failed. Cache state is left unchanged.
//! - [`DepotError`]: the umbrella returned by user-initiated operations
//!   (save, delete, add, edit), wrapping the two above plus the refusals
//!   decided by the cache itself.
//!
//! A denied edit lock is not an error; see [`crate::lock::LockOutcome`].

use crate::entity::{EntityId, EntityKind};
use std::fmt;

/// A field value rejected by an entity's validation rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the offending field
    pub field: &'static str,
    /// User-facing message
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Store gateway error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The backing store rejected or failed the operation
    Store(String),
    /// No row exists for the requested id
    NotFound { kind: EntityKind, id: EntityId },
    /// Someone else wrote or removed the row underneath us
    Conflict(String),
    /// A fetched row could not be turned into an entity
    Decode(String),
    /// The entity is not attached to any gateway yet
    Detached,
    /// The store cannot be reached
    Unavailable(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Store(msg) => write!(f, "Store error: {msg}"),
            GatewayError::NotFound { kind, id } => {
                write!(f, "{kind} {id} was not found in the store")
            }
            GatewayError::Conflict(msg) => write!(f, "Concurrent modification: {msg}"),
            GatewayError::Decode(msg) => write!(f, "Could not decode stored record: {msg}"),
            GatewayError::Detached => {
                write!(f, "Record is not attached to a store gateway")
            }
            GatewayError::Unavailable(msg) => write!(f, "Store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<may_postgres::Error> for GatewayError {
    fn from(err: may_postgres::Error) -> Self {
        GatewayError::Store(err.to_string())
    }
}

/// Error returned by user-initiated cache and entity operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepotError {
    /// A field failed validation; nothing was sent to the store
    Validation(ValidationError),
    /// The store operation failed; cache state is unchanged
    Gateway(GatewayError),
    /// A new, unsaved record of this kind is already open in the list
    UnsavedPending { kind: EntityKind, label: String },
    /// `add_local` was handed a record that already has a store id
    NotTransient { kind: EntityKind, id: EntityId },
    /// The session lacks the capability for this action
    PermissionDenied(String),
    /// The record is still referenced by inventory lines
    Referenced {
        kind: EntityKind,
        id: EntityId,
        references: usize,
    },
    /// A record with the same business key already exists
    Duplicate { kind: EntityKind, key: String },
    /// A business rule refused the operation
    Refused(String),
}

impl fmt::Display for DepotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepotError::Validation(e) => write!(f, "{e}"),
            DepotError::Gateway(e) => write!(f, "{e}"),
            DepotError::UnsavedPending { kind, label } => write!(
                f,
                "Please save changes to new {kind} \"{label}\" before trying to add another."
            ),
            DepotError::NotTransient { kind, id } => {
                write!(f, "{kind} {id} is already persisted and cannot be added as new")
            }
            DepotError::PermissionDenied(action) => {
                write!(f, "You don't have permission to {action}")
            }
            DepotError::Referenced {
                kind,
                id,
                references,
            } => write!(
                f,
                "Can not delete {kind} {id} because it exists in the inventory table ({references} line(s))"
            ),
            DepotError::Duplicate { kind, key } => {
                write!(f, "A {kind} named \"{key}\" already exists")
            }
            DepotError::Refused(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DepotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DepotError::Validation(e) => Some(e),
            DepotError::Gateway(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for DepotError {
    fn from(err: ValidationError) -> Self {
        DepotError::Validation(err)
    }
}

impl From<GatewayError> for DepotError {
    fn from(err: GatewayError) -> Self {
        DepotError::Gateway(err)
    }
}
