//! Persisted entity types.
//!
//! Every entity kind implements [`Entity`]: an integer id where
//! [`INVALID_ID`] marks "not yet persisted", plus field validation. Shared,
//! observable instances are handed out as [`Record`]s by the owning
//! [`EntityList`](crate::cache::EntityList).

pub mod inventory;
pub mod part;
pub mod record;
pub mod user;
pub mod warehouse;

pub use inventory::InventoryLine;
pub use part::{Part, UnitOfQuantity};
pub use record::Record;
pub use user::User;
pub use warehouse::Warehouse;

use crate::error::ValidationError;
use std::fmt;

/// Store-assigned record identifier
pub type EntityId = i64;

/// Sentinel id of a record that has never been inserted
pub const INVALID_ID: EntityId = 0;

/// The entity kinds managed by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Warehouse,
    Part,
    InventoryLine,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Warehouse => "Warehouse",
            EntityKind::Part => "Part",
            EntityKind::InventoryLine => "Inventory line",
            EntityKind::User => "User",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted record type
///
/// Implementations are plain data. Sharing, change notification and the
/// gateway reference live in [`Record`].
pub trait Entity: Clone + fmt::Debug + 'static {
    /// Which kind of record this is
    const KIND: EntityKind;

    fn id(&self) -> EntityId;

    /// Set the store-assigned id. Only gateways and [`Record::save`] call this.
    fn set_id(&mut self, id: EntityId);

    /// Check every field against its validation rule
    fn validate(&self) -> Result<(), ValidationError>;

    /// Short display text (window titles, list rows, messages)
    fn label(&self) -> String;

    /// Business key that must be unique across the table, checked before insert
    fn unique_key(&self) -> Option<&str> {
        None
    }

    fn is_new(&self) -> bool {
        self.id() == INVALID_ID
    }
}

/// Shared length check used by the entity setters
pub(crate) fn check_length(
    field: &'static str,
    value: &str,
    allow_empty: bool,
    max_chars: usize,
    message: &str,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if (!allow_empty && len == 0) || len > max_chars {
        return Err(ValidationError::new(field, message));
    }
    Ok(())
}

pub(crate) fn check_persisted_id(id: EntityId) -> Result<(), ValidationError> {
    if id < 1 {
        return Err(ValidationError::new("id", "Invalid id!"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_length_bounds() {
        assert!(check_length("f", "", true, 5, "bad").is_ok());
        assert!(check_length("f", "", false, 5, "bad").is_err());
        assert!(check_length("f", "abcde", false, 5, "bad").is_ok());
        assert!(check_length("f", "abcdef", false, 5, "bad").is_err());
    }

    #[test]
    fn test_check_length_counts_chars_not_bytes() {
        assert!(check_length("f", "ééééé", false, 5, "bad").is_ok());
    }

    #[test]
    fn test_persisted_id_must_be_positive() {
        assert!(check_persisted_id(INVALID_ID).is_err());
        assert!(check_persisted_id(-4).is_err());
        assert!(check_persisted_id(1).is_ok());
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::InventoryLine.to_string(), "Inventory line");
        assert_eq!(EntityKind::Part.to_string(), "Part");
    }
}
