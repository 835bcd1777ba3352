use std::sync::Arc;

use thiserror::Error;

use storefront_core::{AlertId, ProductId};
use storefront_inventory::{
    AlertPlan, AlertResolution, AlertType, InventoryRecord, NewMovement, StockAlert, StockMovement,
};

/// Errors raised by an [`InventoryStore`] backend.
///
/// ## Error Categories
///
/// - **Unavailable / Conflict**: transient; the caller may retry the whole operation
/// - **AlreadyExists / NotFound**: the addressed row does (not) exist
/// - **Invalid**: the write would break a ledger or alert invariant; nothing was applied
/// - **Storage**: backend fault (poisoned lock, corrupt row)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("concurrent write conflict: {0}")]
    Conflict(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid write: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Everything one stock-changing operation writes, applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryCommit {
    /// The record as it must look after the commit.
    pub record: InventoryRecord,
    /// Quantity the writer read before changing it. A mismatch with the stored
    /// quantity means another writer got in first, and the commit is refused.
    pub expected_quantity: i64,
    pub movement: Option<NewMovement>,
    pub alerts: AlertPlan,
}

impl InventoryCommit {
    /// Settings or alert-only change: quantity stays where it is.
    pub fn without_movement(record: InventoryRecord, alerts: AlertPlan) -> Self {
        Self {
            expected_quantity: record.quantity_on_hand(),
            record,
            movement: None,
            alerts,
        }
    }

    /// Checks that need no stored state: the movement links
    /// `expected_quantity` to the new quantity, and every write targets the
    /// record's product.
    pub fn validate(&self) -> Result<(), StoreError> {
        let product_id = self.record.product_id();
        let new_quantity = self.record.quantity_on_hand();

        match &self.movement {
            Some(m) => {
                if m.product_id != product_id {
                    return Err(StoreError::Invalid(format!(
                        "movement for product {} committed with record {product_id}",
                        m.product_id
                    )));
                }
                if !m.is_consistent()
                    || m.quantity_before != self.expected_quantity
                    || m.quantity_after != new_quantity
                {
                    return Err(StoreError::Invalid(format!(
                        "movement {} + {} = {} does not link {} to {new_quantity}",
                        m.quantity_before, m.delta, m.quantity_after, self.expected_quantity
                    )));
                }
            }
            None if new_quantity != self.expected_quantity => {
                return Err(StoreError::Invalid(format!(
                    "product {product_id}: quantity changed without a movement"
                )));
            }
            None => {}
        }

        for (idx, new) in self.alerts.open.iter().enumerate() {
            if new.product_id != product_id {
                return Err(StoreError::Invalid(format!(
                    "alert for product {} committed with record {product_id}",
                    new.product_id
                )));
            }
            if self.alerts.open[..idx]
                .iter()
                .any(|other| other.alert_type == new.alert_type)
            {
                return Err(StoreError::Invalid(format!(
                    "plan opens two {} alerts for product {product_id}",
                    new.alert_type
                )));
            }
        }
        Ok(())
    }
}

/// What a successful commit assigned ids to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub movement: Option<StockMovement>,
    pub opened: Vec<StockAlert>,
    pub resolved: Vec<AlertId>,
}

/// A record with the ledger that must replay to its quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub record: InventoryRecord,
    /// Oldest first.
    pub movements: Vec<StockMovement>,
}

/// Persistence boundary for inventory records, the movement ledger and stock alerts.
///
/// Implementations must apply an [`InventoryCommit`] atomically: either the
/// record, the movement and every alert write become visible together, or none
/// of them do. Movement and alert ids are assigned by the store and strictly
/// increase in insertion order.
pub trait InventoryStore: Send + Sync {
    /// Create the record for a product, with its opening movement and alerts,
    /// as one atomic write. `expected_quantity` must be 0 (nothing on hand
    /// before the record existed) and the plan may not resolve anything.
    /// Fails with `AlreadyExists` on a second call.
    fn insert_record(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError>;

    fn get_record(&self, product_id: ProductId) -> Result<Option<InventoryRecord>, StoreError>;

    fn list_records(&self) -> Result<Vec<InventoryRecord>, StoreError>;

    fn commit(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError>;

    /// Newest first, at most `limit` rows.
    fn movements(&self, product_id: ProductId, limit: usize) -> Result<Vec<StockMovement>, StoreError>;

    /// Full ledger of a product, oldest first.
    fn ledger(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError>;

    /// The record and its full ledger read from one consistent state.
    fn ledger_snapshot(&self, product_id: ProductId) -> Result<Option<LedgerSnapshot>, StoreError>;

    fn open_alerts(&self, product_id: ProductId) -> Result<Vec<StockAlert>, StoreError>;

    /// Open alerts across all products, newest first.
    fn active_alerts(
        &self,
        alert_type: Option<AlertType>,
        limit: usize,
    ) -> Result<Vec<StockAlert>, StoreError>;

    fn get_alert(&self, alert_id: AlertId) -> Result<Option<StockAlert>, StoreError>;

    /// Resolve one alert. Returns whether this call changed it; an already
    /// resolved alert is left untouched. Unknown ids are `NotFound`.
    fn resolve_alert(&self, alert_id: AlertId, resolution: AlertResolution) -> Result<bool, StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn insert_record(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError> {
        (**self).insert_record(commit)
    }

    fn get_record(&self, product_id: ProductId) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).get_record(product_id)
    }

    fn list_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).list_records()
    }

    fn commit(&self, commit: InventoryCommit) -> Result<CommitReceipt, StoreError> {
        (**self).commit(commit)
    }

    fn movements(&self, product_id: ProductId, limit: usize) -> Result<Vec<StockMovement>, StoreError> {
        (**self).movements(product_id, limit)
    }

    fn ledger(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        (**self).ledger(product_id)
    }

    fn ledger_snapshot(&self, product_id: ProductId) -> Result<Option<LedgerSnapshot>, StoreError> {
        (**self).ledger_snapshot(product_id)
    }

    fn open_alerts(&self, product_id: ProductId) -> Result<Vec<StockAlert>, StoreError> {
        (**self).open_alerts(product_id)
    }

    fn active_alerts(
        &self,
        alert_type: Option<AlertType>,
        limit: usize,
    ) -> Result<Vec<StockAlert>, StoreError> {
        (**self).active_alerts(alert_type, limit)
    }

    fn get_alert(&self, alert_id: AlertId) -> Result<Option<StockAlert>, StoreError> {
        (**self).get_alert(alert_id)
    }

    fn resolve_alert(&self, alert_id: AlertId, resolution: AlertResolution) -> Result<bool, StoreError> {
        (**self).resolve_alert(alert_id, resolution)
    }
}
