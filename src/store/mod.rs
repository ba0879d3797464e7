//! Store gateway implementations.
//!
//! [`memory`] keeps rows in process and is what the tests run against;
//! [`postgres`] talks to a live database through `may_postgres`.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, MemoryTable, Operation};
pub use postgres::{PgEntity, PgTable};
