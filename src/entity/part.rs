//! Part records.
//!
//! Parts are the only kind that carries an edit lock store-side; see
//! [`crate::gateway::LockGateway`].

use super::{check_length, check_persisted_id, Entity, EntityId, EntityKind, INVALID_ID};
use crate::error::ValidationError;
use std::fmt;
use std::str::FromStr;

pub const ERRORMSG_INVALID_PART_NUMBER: &str = "Invalid part number!";
pub const ERRORMSG_INVALID_PART_NAME: &str = "Invalid part name!";
pub const ERRORMSG_INVALID_VENDOR: &str = "Invalid vendor!";
pub const ERRORMSG_INVALID_UNIT: &str = "Invalid unit of quantity!";
pub const ERRORMSG_INVALID_VENDOR_PART: &str = "Invalid vendor part number!";

pub const DEFAULT_EMPTY_PART: &str = "Unknown";

/// Unit a part is counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitOfQuantity {
    #[default]
    Unknown,
    Pieces,
    LinearFeet,
}

impl UnitOfQuantity {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfQuantity::Unknown => "Unknown",
            UnitOfQuantity::Pieces => "Pieces",
            UnitOfQuantity::LinearFeet => "Linear Ft.",
        }
    }
}

impl fmt::Display for UnitOfQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitOfQuantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" | "" => Ok(UnitOfQuantity::Unknown),
            "Pieces" => Ok(UnitOfQuantity::Pieces),
            "Linear Ft." => Ok(UnitOfQuantity::LinearFeet),
            _ => Err(ValidationError::new("unit_of_quantity", ERRORMSG_INVALID_UNIT)),
        }
    }
}

/// A stocked part
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Part {
    id: EntityId,
    part_number: String,
    name: String,
    vendor: String,
    unit_of_quantity: UnitOfQuantity,
    vendor_part_number: String,
}

impl Part {
    pub fn new(
        part_number: impl Into<String>,
        name: impl Into<String>,
        vendor: impl Into<String>,
        unit_of_quantity: UnitOfQuantity,
        vendor_part_number: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let mut part = Self::default();
        part.set_part_number(part_number)?;
        part.set_name(name)?;
        part.set_vendor(vendor)?;
        part.set_unit_of_quantity(unit_of_quantity);
        part.set_vendor_part_number(vendor_part_number)?;
        Ok(part)
    }

    pub fn with_id(
        id: EntityId,
        part_number: impl Into<String>,
        name: impl Into<String>,
        vendor: impl Into<String>,
        unit_of_quantity: UnitOfQuantity,
        vendor_part_number: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        check_persisted_id(id)?;
        let mut part = Self::new(part_number, name, vendor, unit_of_quantity, vendor_part_number)?;
        part.id = id;
        Ok(part)
    }

    pub fn part_number(&self) -> &str {
        &self.part_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn unit_of_quantity(&self) -> UnitOfQuantity {
        self.unit_of_quantity
    }

    pub fn vendor_part_number(&self) -> &str {
        &self.vendor_part_number
    }

    /// Rules: non-empty, at most 20 characters
    pub fn valid_part_number(value: &str) -> Result<(), ValidationError> {
        check_length("part_number", value, false, 20, ERRORMSG_INVALID_PART_NUMBER)
    }

    /// Rules: non-empty, at most 255 characters
    pub fn valid_name(value: &str) -> Result<(), ValidationError> {
        check_length("name", value, false, 255, ERRORMSG_INVALID_PART_NAME)
    }

    pub fn valid_vendor(value: &str) -> Result<(), ValidationError> {
        check_length("vendor", value, true, 255, ERRORMSG_INVALID_VENDOR)
    }

    pub fn valid_vendor_part_number(value: &str) -> Result<(), ValidationError> {
        check_length(
            "vendor_part_number",
            value,
            true,
            255,
            ERRORMSG_INVALID_VENDOR_PART,
        )
    }

    pub fn set_part_number(&mut self, value: impl Into<String>) -> Result<(), ValidationError> {
        let value = value.into();
        Self::valid_part_number(&value)?;
        self.part_number = value;
        Ok(())
    }

    pub fn set_name(&mut self, value: impl Into<String>) -> Result<(), ValidationError> {
        let value = value.into();
        Self::valid_name(&value)?;
        self.name = value;
        Ok(())
    }

    pub fn set_vendor(&mut self, value: impl Into<String>) -> Result<(), ValidationError> {
        let value = value.into();
        Self::valid_vendor(&value)?;
        self.vendor = value;
        Ok(())
    }

    pub fn set_unit_of_quantity(&mut self, unit: UnitOfQuantity) {
        self.unit_of_quantity = unit;
    }

    /// Parse and set the unit from its display text
    pub fn set_unit_of_quantity_str(&mut self, unit: &str) -> Result<(), ValidationError> {
        self.unit_of_quantity = unit.parse()?;
        Ok(())
    }

    pub fn set_vendor_part_number(
        &mut self,
        value: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let value = value.into();
        Self::valid_vendor_part_number(&value)?;
        self.vendor_part_number = value;
        Ok(())
    }
}

impl Entity for Part {
    const KIND: EntityKind = EntityKind::Part;

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
        Self::valid_part_number(&self.part_number)?;
        Self::valid_name(&self.name)?;
        Self::valid_vendor(&self.vendor)?;
        Self::valid_vendor_part_number(&self.vendor_part_number)
    }

    fn label(&self) -> String {
        if self.name.is_empty() {
            DEFAULT_EMPTY_PART.to_string()
        } else {
            self.name.clone()
        }
    }
}
