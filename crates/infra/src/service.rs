//! Inventory service: the transactional entry point for stock changes.
//!
//! Every write takes the per-product lock, computes the new record, ledger row
//! and alert plan in memory, then hands them to the store as one
//! [`InventoryCommit`]. Reads go straight to the store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use storefront_core::{AlertId, MovementId, ProductId, UserId};
use storefront_inventory::alert::reconcile;
use storefront_inventory::availability::check;
use storefront_inventory::ledger::audit;
use storefront_inventory::{
    AdjustStock, AlertType, Availability, InventoryRecord, InventorySettings, LedgerAudit,
    MovementType, NewMovement, StockAlert, StockMovement, StockSnapshot, StockStatus,
};

use crate::alerts::{AlertManager, ReconcileOutcome};
use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::lock::{KeyGuard, KeyedLock};
use crate::store::{InventoryCommit, InventoryStore};

/// Result of a committed stock adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    pub product_id: ProductId,
    pub movement_id: MovementId,
    pub quantity_before: i64,
    pub quantity: i64,
    pub previous_status: StockStatus,
    pub status: StockStatus,
    pub alerts_opened: Vec<AlertId>,
    pub alerts_resolved: Vec<AlertId>,
}

impl AdjustmentOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }
}

/// Status counts for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReport {
    pub total: usize,
    pub in_stock: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub on_backorder: usize,
    pub untracked: usize,
    pub low_stock_products: Vec<ProductId>,
    pub out_of_stock_products: Vec<ProductId>,
}

impl StockReport {
    fn count(&mut self, record: &InventoryRecord) {
        self.total += 1;
        match record.status() {
            StockStatus::InStock => self.in_stock += 1,
            StockStatus::LowStock => {
                self.low_stock += 1;
                self.low_stock_products.push(record.product_id());
            }
            StockStatus::OutOfStock => {
                self.out_of_stock += 1;
                self.out_of_stock_products.push(record.product_id());
            }
            StockStatus::OnBackorder => self.on_backorder += 1,
            StockStatus::Untracked => self.untracked += 1,
        }
    }
}

const TRACKING_DISABLED_NOTE: &str = "auto-resolved: inventory tracking disabled";

pub struct InventoryService<S> {
    store: S,
    alerts: AlertManager<S>,
    locks: KeyedLock<ProductId>,
    config: InventoryConfig,
}

impl<S> InventoryService<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, config: InventoryConfig) -> Self {
        Self {
            alerts: AlertManager::new(store.clone(), config.clone()),
            store,
            locks: KeyedLock::new(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn alerts(&self) -> &AlertManager<S> {
        &self.alerts
    }

    fn lock(&self, product_id: ProductId) -> Result<KeyGuard<'_, ProductId>, InventoryError> {
        self.locks
            .acquire(product_id, self.config.lock_timeout)
            .map_err(|timeout| {
                warn!(product_id = %product_id, waited_ms = timeout.waited.as_millis() as u64, "lock wait timed out");
                InventoryError::from(timeout)
            })
    }

    fn load(&self, product_id: ProductId) -> Result<InventoryRecord, InventoryError> {
        self.store
            .get_record(product_id)?
            .ok_or_else(|| InventoryError::NotFound(format!("inventory for product {product_id}")))
    }

    /// Create the inventory row for a product.
    ///
    /// A positive `opening_quantity` is booked as one `adjustment` movement so the
    /// ledger replays to the on-hand quantity from the first row on.
    #[instrument(skip(self, settings), fields(product_id = %product_id), err)]
    pub fn register(
        &self,
        product_id: ProductId,
        settings: InventorySettings,
        opening_quantity: i64,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord, InventoryError> {
        if opening_quantity < 0 {
            return Err(InventoryError::Validation(format!(
                "opening quantity must be >= 0 (got {opening_quantity})"
            )));
        }
        if opening_quantity > 0 && !settings.tracking_enabled() {
            return Err(InventoryError::Validation(
                "opening stock requires inventory tracking".to_string(),
            ));
        }

        let _guard = self.lock(product_id)?;
        let now = Utc::now();
        let mut record = InventoryRecord::new(product_id, settings, now);

        let movement = if opening_quantity > 0 {
            let mut cmd = AdjustStock::new(product_id, opening_quantity, MovementType::Adjustment)
                .with_note("opening stock");
            if let Some(actor) = actor {
                cmd = cmd.with_actor(actor);
            }
            let (before, after) = record.apply_delta(opening_quantity, now)?;
            Some(NewMovement::from_command(&cmd, before, after, now)?)
        } else {
            None
        };
        // A new product has no open alerts yet; an empty tracked shelf may need one.
        let plan = reconcile(StockSnapshot::from(&record), &[], now);

        let receipt = self.store.insert_record(InventoryCommit {
            record: record.clone(),
            expected_quantity: 0,
            movement,
            alerts: plan,
        })?;

        info!(
            quantity = record.quantity_on_hand(),
            status = %record.status(),
            movement_id = ?receipt.movement.as_ref().map(|m| m.id),
            alerts_opened = receipt.opened.len(),
            "inventory registered"
        );
        Ok(record)
    }

    /// Apply a signed stock change.
    ///
    /// Serialized per product. Quantity, ledger row, status and alerts are
    /// committed together; on any error nothing is written. The result may be
    /// negative (an overdraft is logged, not refused).
    #[instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            delta = cmd.delta,
            movement_type = %cmd.movement_type
        ),
        err
    )]
    pub fn adjust(&self, cmd: AdjustStock) -> Result<AdjustmentOutcome, InventoryError> {
        cmd.validate()?;
        let _guard = self.lock(cmd.product_id)?;
        self.adjust_locked(&cmd)
    }

    fn adjust_locked(&self, cmd: &AdjustStock) -> Result<AdjustmentOutcome, InventoryError> {
        let mut record = self.load(cmd.product_id)?;
        let previous_status = record.status();
        let now = Utc::now();

        let (before, after) = record.apply_delta(cmd.delta, now)?;
        let movement = NewMovement::from_command(cmd, before, after, now)?;
        let plan = self.alerts.plan(StockSnapshot::from(&record), now)?;

        let receipt = self.store.commit(InventoryCommit {
            record: record.clone(),
            expected_quantity: before,
            movement: Some(movement),
            alerts: plan,
        })?;

        let movement_id = receipt
            .movement
            .as_ref()
            .map(|m| m.id)
            .ok_or_else(|| InventoryError::Storage("commit returned no movement".to_string()))?;
        let alerts = ReconcileOutcome::from(&receipt);

        if after < 0 {
            warn!(quantity_before = before, quantity_after = after, "stock overdrawn");
        }
        info!(
            movement_id = %movement_id,
            quantity_before = before,
            quantity_after = after,
            status_before = %previous_status,
            status_after = %record.status(),
            alerts_opened = alerts.opened.len(),
            alerts_resolved = alerts.resolved.len(),
            "stock adjusted"
        );

        Ok(AdjustmentOutcome {
            product_id: cmd.product_id,
            movement_id,
            quantity_before: before,
            quantity: after,
            previous_status,
            status: record.status(),
            alerts_opened: alerts.opened,
            alerts_resolved: alerts.resolved,
        })
    }

    /// Replace a product's inventory policy. Status is re-derived and alerts
    /// reconciled in the same commit; no movement is written. Switching
    /// tracking off resolves every open alert.
    #[instrument(skip(self, settings), fields(product_id = %product_id), err)]
    pub fn update_settings(
        &self,
        product_id: ProductId,
        settings: InventorySettings,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord, InventoryError> {
        let _guard = self.lock(product_id)?;
        let mut record = self.load(product_id)?;
        let previous_status = record.status();
        let now = Utc::now();

        record.update_settings(settings, now);
        let snapshot = StockSnapshot::from(&record);
        let plan = if settings.tracking_enabled() {
            self.alerts.plan(snapshot, now)?
        } else {
            self.alerts.plan_close_all(snapshot, TRACKING_DISABLED_NOTE, now)?
        };

        self.store
            .commit(InventoryCommit::without_movement(record.clone(), plan))?;
        info!(
            actor = ?actor,
            status_before = %previous_status,
            status_after = %record.status(),
            tracking_enabled = settings.tracking_enabled(),
            threshold = settings.low_stock_threshold(),
            "inventory settings updated"
        );
        Ok(record)
    }

    /// Bring a product's open alerts in line with its stored record.
    ///
    /// Runs under the product lock; a second run in a row has nothing to do.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub fn reconcile_alerts(&self, product_id: ProductId) -> Result<ReconcileOutcome, InventoryError> {
        let _guard = self.lock(product_id)?;
        let record = self.load(product_id)?;

        let plan = self.alerts.plan(StockSnapshot::from(&record), Utc::now())?;
        if plan.is_empty() {
            debug!(status = %record.status(), "alerts already consistent");
            return Ok(ReconcileOutcome::default());
        }

        let receipt = self.store.commit(InventoryCommit::without_movement(record, plan))?;
        let outcome = ReconcileOutcome::from(&receipt);
        info!(opened = outcome.opened.len(), resolved = outcome.resolved.len(), "alerts reconciled");
        Ok(outcome)
    }

    /// Can `requested` units be fulfilled right now? Read-only.
    pub fn check_availability(&self, product_id: ProductId, requested: i64) -> Result<Availability, InventoryError> {
        let record = self.load(product_id)?;
        let availability = check(&record, requested)?;
        debug!(product_id = %product_id, requested, available = availability.available, "availability checked");
        Ok(availability)
    }

    pub fn get_inventory(&self, product_id: ProductId) -> Result<InventoryRecord, InventoryError> {
        self.load(product_id)
    }

    /// Most recent movements first; `limit` is clamped to the configured maximum.
    pub fn movement_history(&self, product_id: ProductId, limit: usize) -> Result<Vec<StockMovement>, InventoryError> {
        self.load(product_id)?;
        Ok(self.store.movements(product_id, self.config.clamp_limit(limit))?)
    }

    pub fn active_alerts(&self, alert_type: Option<AlertType>, limit: usize) -> Result<Vec<StockAlert>, InventoryError> {
        self.alerts.active(alert_type, limit)
    }

    pub fn resolve_alert(
        &self,
        alert_id: AlertId,
        actor: Option<UserId>,
        note: Option<String>,
    ) -> Result<bool, InventoryError> {
        self.alerts.resolve(alert_id, actor, note)
    }

    /// Replay the ledger and compare it with the stored quantity.
    ///
    /// The record and ledger come from one store snapshot, so writers in other
    /// processes cannot tear the read.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub fn verify_ledger(&self, product_id: ProductId) -> Result<LedgerAudit, InventoryError> {
        let snapshot = self
            .store
            .ledger_snapshot(product_id)?
            .ok_or_else(|| InventoryError::NotFound(format!("inventory for product {product_id}")))?;
        let report = audit(product_id, &snapshot.movements, snapshot.record.quantity_on_hand());

        if report.is_consistent() {
            debug!(movements = report.movement_count, "ledger consistent");
        } else {
            warn!(
                movements = report.movement_count,
                replayed = report.replayed_quantity,
                on_hand = report.on_hand,
                breaks = report.breaks.len(),
                "ledger inconsistent"
            );
        }
        Ok(report)
    }

    pub fn stock_report(&self) -> Result<StockReport, InventoryError> {
        let mut report = StockReport::default();
        for record in self.store.list_records()? {
            report.count(&record);
        }
        Ok(report)
    }
}
