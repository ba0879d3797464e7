//! Column mappings for the depot tables.

use super::PgEntity;
use crate::entity::{InventoryLine, Part, UnitOfQuantity, User, Warehouse};
use crate::error::{GatewayError, ValidationError};
use may_postgres::Row;
use sea_query::Value;

fn column<'a, T>(row: &'a Row, name: &str) -> Result<T, GatewayError>
where
    T: may_postgres::types::FromSql<'a>,
{
    row.try_get(name)
        .map_err(|e| GatewayError::Decode(format!("column {name}: {e}")))
}

fn invalid(table: &str, err: ValidationError) -> GatewayError {
    GatewayError::Decode(format!("{table}.{}: {}", err.field, err.message))
}

/// NULL text columns read back as empty strings
fn text(row: &Row, name: &str) -> Result<String, GatewayError> {
    Ok(column::<Option<String>>(row, name)?.unwrap_or_default())
}

impl PgEntity for Warehouse {
    const TABLE: &'static str = "warehouse";
    const COLUMNS: &'static [&'static str] = &[
        "warehouse_name",
        "address",
        "city",
        "state",
        "zip",
        "storage_cap",
    ];
    const KEY_COLUMN: Option<&'static str> = Some("warehouse_name");

    fn values(&self) -> Vec<Value> {
        vec![
            self.name().into(),
            self.address().into(),
            self.city().into(),
            self.state().into(),
            self.zip().into(),
            self.storage_capacity().into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, GatewayError> {
        Warehouse::with_id(
            column(row, "id")?,
            text(row, "warehouse_name")?,
            text(row, "address")?,
            text(row, "city")?,
            text(row, "state")?,
            text(row, "zip")?,
            column(row, "storage_cap")?,
        )
        .map_err(|e| invalid(Self::TABLE, e))
    }
}

impl PgEntity for Part {
    const TABLE: &'static str = "part";
    // user_access and datetime belong to the lock protocol, never to updates
    const COLUMNS: &'static [&'static str] = &[
        "part_number",
        "part_name",
        "unit_of_qty",
        "vendor_part_id",
        "vendor_name",
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            self.part_number().into(),
            self.name().into(),
            self.unit_of_quantity().as_str().into(),
            self.vendor_part_number().into(),
            self.vendor().into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, GatewayError> {
        // Unrecognised units are kept as Unknown rather than failing the load
        let unit = text(row, "unit_of_qty")?
            .parse::<UnitOfQuantity>()
            .unwrap_or_default();
        Part::with_id(
            column(row, "id")?,
            text(row, "part_number")?,
            text(row, "part_name")?,
            text(row, "vendor_name")?,
            unit,
            text(row, "vendor_part_id")?,
        )
        .map_err(|e| invalid(Self::TABLE, e))
    }
}

impl PgEntity for InventoryLine {
    const TABLE: &'static str = "inventory";
    const COLUMNS: &'static [&'static str] = &["warehouse_id", "part_id", "quantity"];

    fn values(&self) -> Vec<Value> {
        vec![
            self.warehouse_id().into(),
            self.part_id().into(),
            self.quantity().into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, GatewayError> {
        InventoryLine::with_id(
            column(row, "id")?,
            column(row, "warehouse_id")?,
            column(row, "part_id")?,
            column(row, "quantity")?,
        )
        .map_err(|e| invalid(Self::TABLE, e))
    }
}

impl PgEntity for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "user_name",
        "password",
        "full_name",
        "add_user",
        "edit_user",
        "delete_user",
    ];
    const KEY_COLUMN: Option<&'static str> = Some("user_name");

    fn values(&self) -> Vec<Value> {
        vec![
            self.login().into(),
            self.password().into(),
            self.full_name().into(),
            self.can_add().into(),
            self.can_edit().into(),
            self.can_delete().into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, GatewayError> {
        let user = User::with_id(
            column(row, "id")?,
            text(row, "user_name")?,
            text(row, "password")?,
            text(row, "full_name")?,
        )
        .map_err(|e| invalid(Self::TABLE, e))?;
        Ok(user.with_permissions(
            column(row, "add_user")?,
            column(row, "edit_user")?,
            column(row, "delete_user")?,
        ))
    }
}
