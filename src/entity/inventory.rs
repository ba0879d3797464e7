//! Inventory lines: a quantity of one part held in one warehouse.

use super::{check_persisted_id, Entity, EntityId, EntityKind, INVALID_ID};
use crate::error::ValidationError;

pub const ERRORMSG_INVALID_WAREHOUSE: &str = "Invalid warehouse!";
pub const ERRORMSG_INVALID_PART: &str = "Invalid part!";
pub const ERRORMSG_INVALID_QUANTITY: &str = "Invalid quantity!";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InventoryLine {
    id: EntityId,
    warehouse_id: EntityId,
    part_id: EntityId,
    quantity: i64,
}

impl InventoryLine {
    pub fn new(
        warehouse_id: EntityId,
        part_id: EntityId,
        quantity: i64,
    ) -> Result<Self, ValidationError> {
        let mut line = Self::default();
        line.set_warehouse_id(warehouse_id)?;
        line.set_part_id(part_id)?;
        line.set_quantity(quantity)?;
        Ok(line)
    }

    pub fn with_id(
        id: EntityId,
        warehouse_id: EntityId,
        part_id: EntityId,
        quantity: i64,
    ) -> Result<Self, ValidationError> {
        check_persisted_id(id)?;
        let mut line = Self::new(warehouse_id, part_id, quantity)?;
        line.id = id;
        Ok(line)
    }

    pub fn warehouse_id(&self) -> EntityId {
        self.warehouse_id
    }

    pub fn part_id(&self) -> EntityId {
        self.part_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn valid_warehouse_id(id: EntityId) -> Result<(), ValidationError> {
        if id < 1 {
            return Err(ValidationError::new("warehouse_id", ERRORMSG_INVALID_WAREHOUSE));
        }
        Ok(())
    }

    pub fn valid_part_id(id: EntityId) -> Result<(), ValidationError> {
        if id < 1 {
            return Err(ValidationError::new("part_id", ERRORMSG_INVALID_PART));
        }
        Ok(())
    }

    pub fn valid_quantity(quantity: i64) -> Result<(), ValidationError> {
        if quantity < 0 {
            return Err(ValidationError::new("quantity", ERRORMSG_INVALID_QUANTITY));
        }
        Ok(())
    }

    pub fn set_warehouse_id(&mut self, id: EntityId) -> Result<(), ValidationError> {
        Self::valid_warehouse_id(id)?;
        self.warehouse_id = id;
        Ok(())
    }

    pub fn set_part_id(&mut self, id: EntityId) -> Result<(), ValidationError> {
        Self::valid_part_id(id)?;
        self.part_id = id;
        Ok(())
    }

    pub fn set_quantity(&mut self, quantity: i64) -> Result<(), ValidationError> {
        Self::valid_quantity(quantity)?;
        self.quantity = quantity;
        Ok(())
    }
}

impl Entity for InventoryLine {
    const KIND: EntityKind = EntityKind::InventoryLine;

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
        Self::valid_warehouse_id(self.warehouse_id)?;
        Self::valid_part_id(self.part_id)?;
        Self::valid_quantity(self.quantity)
    }

    fn label(&self) -> String {
        format!(
            "{} x part {} @ warehouse {}",
            self.quantity, self.part_id, self.warehouse_id
        )
    }
}
