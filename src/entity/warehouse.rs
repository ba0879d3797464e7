//! Warehouse records.

use super::{check_length, check_persisted_id, Entity, EntityId, EntityKind, INVALID_ID};
use crate::error::ValidationError;

pub const ERRORMSG_INVALID_NAME: &str = "Invalid warehouse name!";
pub const ERRORMSG_INVALID_ADDRESS: &str = "Invalid address!";
pub const ERRORMSG_INVALID_CITY: &str = "Invalid city!";
pub const ERRORMSG_INVALID_STATE: &str = "Invalid state!";
pub const ERRORMSG_INVALID_ZIP: &str = "Invalid zip!";
pub const ERRORMSG_INVALID_CAPACITY: &str = "Invalid storage capacity!";

/// Display name of a warehouse whose name has not been entered yet
pub const DEFAULT_EMPTY_WAREHOUSE: &str = "Unknown";

/// A storage location with a unit capacity
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Warehouse {
    id: EntityId,
    name: String,
    address: String,
    city: String,
    state: String,
    zip: String,
    storage_capacity: i64,
}

impl Warehouse {
    /// Build a validated, not-yet-persisted warehouse
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
        storage_capacity: i64,
    ) -> Result<Self, ValidationError> {
        let mut warehouse = Self::default();
        warehouse.set_name(name)?;
        warehouse.set_address(address)?;
        warehouse.set_city(city)?;
        warehouse.set_state(state)?;
        warehouse.set_zip(zip)?;
        warehouse.set_storage_capacity(storage_capacity)?;
        Ok(warehouse)
    }

    /// Build a warehouse read back from the store
    pub fn with_id(
        id: EntityId,
        name: impl Into<String>,
        address: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
        storage_capacity: i64,
    ) -> Result<Self, ValidationError> {
        check_persisted_id(id)?;
        let mut warehouse = Self::new(name, address, city, state, zip, storage_capacity)?;
        warehouse.id = id;
        Ok(warehouse)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn zip(&self) -> &str {
        &self.zip
    }

    pub fn storage_capacity(&self) -> i64 {
        self.storage_capacity
    }

    /// Rules: non-empty, at most 255 characters
    pub fn valid_name(name: &str) -> Result<(), ValidationError> {
        check_length("name", name, false, 255, ERRORMSG_INVALID_NAME)
    }

    /// Rules: non-empty, at most 255 characters
    pub fn valid_address(address: &str) -> Result<(), ValidationError> {
        check_length("address", address, false, 255, ERRORMSG_INVALID_ADDRESS)
    }

    /// Rules: at most 100 characters
    pub fn valid_city(city: &str) -> Result<(), ValidationError> {
        check_length("city", city, true, 100, ERRORMSG_INVALID_CITY)
    }

    /// Rules: at most 50 characters
    pub fn valid_state(state: &str) -> Result<(), ValidationError> {
        check_length("state", state, true, 50, ERRORMSG_INVALID_STATE)
    }

    /// Rules: at most 5 characters
    pub fn valid_zip(zip: &str) -> Result<(), ValidationError> {
        check_length("zip", zip, true, 5, ERRORMSG_INVALID_ZIP)
    }

    /// Rules: strictly positive
    pub fn valid_storage_capacity(capacity: i64) -> Result<(), ValidationError> {
        if capacity <= 0 {
            return Err(ValidationError::new(
                "storage_capacity",
                ERRORMSG_INVALID_CAPACITY,
            ));
        }
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ValidationError> {
        let name = name.into();
        Self::valid_name(&name)?;
        self.name = name;
        Ok(())
    }

    pub fn set_address(&mut self, address: impl Into<String>) -> Result<(), ValidationError> {
        let address = address.into();
        Self::valid_address(&address)?;
        self.address = address;
        Ok(())
    }

    pub fn set_city(&mut self, city: impl Into<String>) -> Result<(), ValidationError> {
        let city = city.into();
        Self::valid_city(&city)?;
        self.city = city;
        Ok(())
    }

    pub fn set_state(&mut self, state: impl Into<String>) -> Result<(), ValidationError> {
        let state = state.into();
        Self::valid_state(&state)?;
        self.state = state;
        Ok(())
    }

    pub fn set_zip(&mut self, zip: impl Into<String>) -> Result<(), ValidationError> {
        let zip = zip.into();
        Self::valid_zip(&zip)?;
        self.zip = zip;
        Ok(())
    }

    pub fn set_storage_capacity(&mut self, capacity: i64) -> Result<(), ValidationError> {
        Self::valid_storage_capacity(capacity)?;
        self.storage_capacity = capacity;
        Ok(())
    }
}

impl Entity for Warehouse {
    const KIND: EntityKind = EntityKind::Warehouse;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.id != INVALID_ID {
            check_persisted_id(self.id)?;
        }
        Self::valid_name(&self.name)?;
        Self::valid_address(&self.address)?;
        Self::valid_city(&self.city)?;
        Self::valid_state(&self.state)?;
        Self::valid_zip(&self.zip)?;
        Self::valid_storage_capacity(self.storage_capacity)
    }

    fn label(&self) -> String {
        if self.name.is_empty() {
            DEFAULT_EMPTY_WAREHOUSE.to_string()
        } else {
            self.name.clone()
        }
    }

    fn unique_key(&self) -> Option<&str> {
        Some(&self.name)
    }
}
