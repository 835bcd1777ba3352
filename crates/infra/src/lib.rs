//! Infrastructure layer: storage adapters, per-product locking, configuration
//! and the inventory service that ties the domain crates together.

pub mod alerts;
pub mod config;
pub mod error;
pub mod lock;
pub mod service;
pub mod store;


pub use alerts::{AlertManager, ReconcileOutcome};
pub use config::InventoryConfig;
pub use error::InventoryError;
pub use service::{AdjustmentOutcome, InventoryService, StockReport};
