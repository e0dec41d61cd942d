//! Storage layer for the marketplace.
//!
//! Each concern has its own trait ([`OrderStore`], [`CartStore`],
//! [`VendorStore`], [`PincodeStore`], [`ShipmentStore`]); [`Store`] bundles
//! them. Two implementations share the same semantics:
//! - [`InMemoryStore`] for tests and local runs
//! - [`PostgresStore`] backed by sqlx

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::OrderQuery;
pub use store::{CartStore, OrderStore, PincodeStore, ShipmentStore, Store, VendorStore};
