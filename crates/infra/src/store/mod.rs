//! Inventory persistence boundary.
//!
//! `InventoryStore` is the synchronous storage contract the service layer is
//! written against. The in-memory implementation backs tests and dev; the
//! Postgres adapter implements the same contract with row locks inside one
//! transaction per call.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use r#trait::{CommitReceipt, InventoryCommit, InventoryStore, LedgerSnapshot, StoreError};
