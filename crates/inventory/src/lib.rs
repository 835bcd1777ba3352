//! Inventory domain module.
//!
//! Business rules for stock tracking, implemented purely as deterministic
//! domain logic (no IO, no locking, no storage): status classification, the
//! movement ledger and its replay audit, alert reconciliation and
//! availability checks.

pub mod alert;
pub mod availability;
pub mod ledger;
pub mod movement;
pub mod record;
pub mod status;

pub use alert::{AlertPlan, AlertResolution, AlertType, NewAlert, StockAlert, StockSnapshot};
pub use availability::{Availability, AvailabilityReason};
pub use ledger::{LedgerAudit, LedgerBreak};
pub use movement::{AdjustStock, MovementReference, MovementType, NewMovement, StockMovement};
pub use record::{InventoryRecord, InventorySettings};
pub use status::{StockStatus, classify};
