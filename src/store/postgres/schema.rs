//! Table definitions for a fresh depot database.

use crate::error::GatewayError;
use crate::executor::SqlExecutor;

/// `CREATE TABLE IF NOT EXISTS` statements in dependency order
pub const TABLES: &[(&str, &str)] = &[
    (
        "warehouse",
        r#"
        CREATE TABLE IF NOT EXISTS warehouse (
            id BIGSERIAL PRIMARY KEY,
            warehouse_name VARCHAR(255) NOT NULL UNIQUE,
            address VARCHAR(255) NOT NULL,
            city VARCHAR(100),
            state VARCHAR(50),
            zip VARCHAR(5),
            storage_cap BIGINT NOT NULL CHECK (storage_cap > 0)
        )
    "#,
    ),
    (
        "part",
        r#"
        CREATE TABLE IF NOT EXISTS part (
            id BIGSERIAL PRIMARY KEY,
            part_number VARCHAR(20) NOT NULL,
            part_name VARCHAR(255) NOT NULL,
            unit_of_qty VARCHAR(20) NOT NULL DEFAULT 'Unknown',
            vendor_part_id VARCHAR(255),
            vendor_name VARCHAR(255),
            user_access VARCHAR(255),
            datetime TIMESTAMPTZ
        )
    "#,
    ),
    (
        "inventory",
        r#"
        CREATE TABLE IF NOT EXISTS inventory (
            id BIGSERIAL PRIMARY KEY,
            warehouse_id BIGINT NOT NULL REFERENCES warehouse(id),
            part_id BIGINT NOT NULL REFERENCES part(id),
            quantity BIGINT NOT NULL CHECK (quantity >= 0)
        )
    "#,
    ),
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            user_name VARCHAR(50) NOT NULL UNIQUE,
            password VARCHAR(255) NOT NULL,
            full_name VARCHAR(255),
            add_user BOOLEAN NOT NULL DEFAULT false,
            edit_user BOOLEAN NOT NULL DEFAULT false,
            delete_user BOOLEAN NOT NULL DEFAULT false
        )
    "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_inventory_warehouse_id ON inventory(warehouse_id)",
    "CREATE INDEX IF NOT EXISTS idx_part_user_access ON part(user_access)",
];

/// Create the depot tables and indexes; existing ones are left alone
pub fn install(executor: &dyn SqlExecutor) -> Result<(), GatewayError> {
    for (table, sql) in TABLES {
        executor.execute(sql, &[])?;
        log::debug!("Ensured table {table}");
    }
    for sql in INDEXES {
        executor.execute(sql, &[])?;
    }
    log::info!("Depot schema installed ({} tables)", TABLES.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_created_before_their_references() {
        let order: Vec<&str> = TABLES.iter().map(|(t, _)| *t).collect();
        let pos = |t: &str| order.iter().position(|x| *x == t).unwrap();
        assert!(pos("warehouse") < pos("inventory"));
        assert!(pos("part") < pos("inventory"));
    }

    #[test]
    fn test_statements_are_idempotent() {
        for (_, sql) in TABLES {
            assert!(sql.contains("IF NOT EXISTS"));
        }
        for sql in INDEXES {
            assert!(sql.contains("IF NOT EXISTS"));
        }
    }
}
