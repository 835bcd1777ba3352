//! Alert lifecycle on top of an [`InventoryStore`].
//!
//! Deciding which alerts to open or resolve is pure domain logic
//! ([`storefront_inventory::alert::reconcile`]); this manager loads the open
//! alerts a plan needs. Plans are committed by [`crate::InventoryService`]
//! under the product lock, together with the record they were derived from.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use storefront_core::{AlertId, UserId};
use storefront_inventory::alert::reconcile;
use storefront_inventory::{AlertPlan, AlertResolution, AlertType, StockAlert, StockSnapshot};

use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::store::{CommitReceipt, InventoryStore};

/// Open/resolved alert ids produced by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub opened: Vec<AlertId>,
    pub resolved: Vec<AlertId>,
}

impl From<&CommitReceipt> for ReconcileOutcome {
    fn from(receipt: &CommitReceipt) -> Self {
        Self {
            opened: receipt.opened.iter().map(|a| a.id).collect(),
            resolved: receipt.resolved.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertManager<S> {
    store: S,
    config: InventoryConfig,
}

impl<S> AlertManager<S>
where
    S: InventoryStore,
{
    pub fn new(store: S, config: InventoryConfig) -> Self {
        Self { store, config }
    }

    /// Alert writes that bring the product's open alerts in line with `snapshot`.
    pub fn plan(&self, snapshot: StockSnapshot, now: DateTime<Utc>) -> Result<AlertPlan, InventoryError> {
        let open = self.store.open_alerts(snapshot.product_id)?;
        Ok(reconcile(snapshot, &open, now))
    }

    /// Plan that closes every open alert of the product (tracking switched off).
    pub fn plan_close_all(
        &self,
        snapshot: StockSnapshot,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<AlertPlan, InventoryError> {
        let open = self.store.open_alerts(snapshot.product_id)?;
        Ok(AlertPlan::resolve_all(&open, note, now))
    }

    /// Manually resolve an alert. Resolving an already resolved alert succeeds
    /// and changes nothing; an unknown id is `NotFound`.
    #[instrument(skip(self, note), fields(alert_id = %alert_id), err)]
    pub fn resolve(
        &self,
        alert_id: AlertId,
        resolved_by: Option<UserId>,
        note: Option<String>,
    ) -> Result<bool, InventoryError> {
        let resolution = AlertResolution::manual(resolved_by, note, Utc::now());
        let changed = self.store.resolve_alert(alert_id, resolution)?;
        if changed {
            info!("alert resolved");
        } else {
            debug!("alert was already resolved");
        }
        Ok(true)
    }

    /// Open alerts, newest first. `limit` is clamped to the configured maximum.
    pub fn active(&self, alert_type: Option<AlertType>, limit: usize) -> Result<Vec<StockAlert>, InventoryError> {
        Ok(self
            .store
            .active_alerts(alert_type, self.config.clamp_limit(limit))?)
    }
}
