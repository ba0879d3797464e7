//! # Depot
//!
//! Client-side consistency layer for inventory data-entry clients.
//!
//! - [`cache::EntityList`] keeps one identity-mapped list per entity kind and
//!   reconciles it against the store without replacing resident instances.
//! - [`entity::Record`] is the shared, observable handle views edit and save.
//! - [`lock::EditLockCoordinator`] runs the store-side advisory edit-lock
//!   protocol for parts.
//! - [`catalog::Catalog`] ties the lists, locks and session permissions
//!   together.
//!
//! Store access goes through the [`gateway`] traits; [`store::memory`] and
//! [`store::postgres`] implement them.
//!
//! ```
//! use depot::{Catalog, LockSettings, MemoryStore, Permissions, SessionContext, SessionId};
//! use depot::entity::Warehouse;
//!
//! let store = MemoryStore::new();
//! let session = SessionContext::new("ana", SessionId::generate("ana"), Permissions::all());
//! let catalog = Catalog::in_memory(&store, session, LockSettings::default());
//!
//! let main = catalog
//!     .new_warehouse(Warehouse::new("Main", "1 Dock St", "Austin", "TX", "78701", 500)?)?;
//! catalog.save(&main)?;
//! assert_eq!(catalog.warehouses().find_by_id(main.id()).map(|r| r.id()), Some(main.id()));
//! # Ok::<(), depot::DepotError>(())
//! ```

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod lock;
pub mod metrics;
pub mod notify;
pub mod session;
pub mod store;

pub use cache::EntityList;
pub use catalog::Catalog;
pub use config::{DepotConfig, LockSettings};
pub use entity::{Entity, EntityId, Record, INVALID_ID};
pub use error::{DepotError, GatewayError, ValidationError};
pub use lock::{EditLease, EditLockCoordinator, LeaseOutcome, LockOutcome};
pub use notify::Listener;
pub use session::{Capability, Permissions, SessionContext, SessionId};
pub use store::memory::MemoryStore;
