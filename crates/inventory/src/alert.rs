use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{AlertId, DomainError, Entity, ProductId, UserId};

use crate::record::InventoryRecord;
use crate::status::StockStatus;

/// Kind of threshold crossing an alert flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowStock,
    OutOfStock,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::LowStock => "low_stock",
            AlertType::OutOfStock => "out_of_stock",
        }
    }
}

impl core::fmt::Display for AlertType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low_stock" => Ok(AlertType::LowStock),
            "out_of_stock" => Ok(AlertType::OutOfStock),
            other => Err(DomainError::validation(format!("unknown alert type '{other}'"))),
        }
    }
}

/// An alert ready to be inserted (not yet assigned an id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlert {
    pub product_id: ProductId,
    pub alert_type: AlertType,
    pub quantity_at_open: i64,
    pub opened_at: DateTime<Utc>,
}

impl NewAlert {
    pub fn into_stored(self, id: AlertId) -> StockAlert {
        StockAlert {
            id,
            product_id: self.product_id,
            alert_type: self.alert_type,
            quantity_at_open: self.quantity_at_open,
            resolved: false,
            opened_at: self.opened_at,
            resolved_at: None,
            resolved_by: None,
            notes: None,
        }
    }
}

/// Operator-facing record that a product crossed a stock threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub id: AlertId,
    pub product_id: ProductId,
    pub alert_type: AlertType,
    pub quantity_at_open: i64,
    pub resolved: bool,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
    pub notes: Option<String>,
}

impl StockAlert {
    pub fn is_open(&self) -> bool {
        !self.resolved
    }

    /// Mark the alert resolved. Returns `false` (and changes nothing) when it
    /// already was.
    pub fn resolve(&mut self, resolution: &AlertResolution) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(resolution.resolved_at);
        self.resolved_by = resolution.resolved_by;
        self.notes = resolution.note.clone();
        true
    }
}

impl Entity for StockAlert {
    type Id = AlertId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Who/when/why an alert was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertResolution {
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: Option<UserId>,
    pub note: Option<String>,
}

impl AlertResolution {
    pub fn manual(resolved_by: Option<UserId>, note: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            resolved_at: at,
            resolved_by,
            note,
        }
    }

    /// Resolution written by reconciliation when stock recovers.
    pub fn automatic(quantity: i64, at: DateTime<Utc>) -> Self {
        Self {
            resolved_at: at,
            resolved_by: None,
            note: Some(format!("auto-resolved: quantity restored to {quantity}")),
        }
    }
}

/// Inputs of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockSnapshot {
    pub product_id: ProductId,
    pub quantity: i64,
    pub status: StockStatus,
    pub threshold: i64,
}

impl From<&InventoryRecord> for StockSnapshot {
    fn from(record: &InventoryRecord) -> Self {
        Self {
            product_id: record.product_id(),
            quantity: record.quantity_on_hand(),
            status: record.status(),
            threshold: record.low_stock_threshold(),
        }
    }
}

/// Alert writes needed to bring a product's alerts in line with its stock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertPlan {
    pub open: Vec<NewAlert>,
    pub resolve: Vec<(AlertId, AlertResolution)>,
}

impl AlertPlan {
    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.resolve.is_empty()
    }

    /// Close every open alert (tracking was switched off).
    pub fn resolve_all(open_alerts: &[StockAlert], note: &str, now: DateTime<Utc>) -> Self {
        let resolve = open_alerts
            .iter()
            .filter(|a| a.is_open())
            .map(|a| {
                (
                    a.id,
                    AlertResolution::manual(None, Some(note.to_string()), now),
                )
            })
            .collect();
        Self {
            open: Vec::new(),
            resolve,
        }
    }
}

/// Decide which alerts to open and which to resolve.
///
/// `open_alerts` are the product's currently open alerts. The plan never opens
/// a type that already has an open alert, so applying it twice is a no-op the
/// second time.
pub fn reconcile(snapshot: StockSnapshot, open_alerts: &[StockAlert], now: DateTime<Utc>) -> AlertPlan {
    let mut plan = AlertPlan::default();
    let open_of = |alert_type: AlertType| {
        open_alerts
            .iter()
            .filter(move |a| a.is_open() && a.product_id == snapshot.product_id && a.alert_type == alert_type)
    };

    let wanted = match snapshot.status {
        StockStatus::LowStock => Some(AlertType::LowStock),
        StockStatus::OutOfStock => Some(AlertType::OutOfStock),
        _ => None,
    };
    if let Some(alert_type) = wanted {
        if open_of(alert_type).next().is_none() {
            plan.open.push(NewAlert {
                product_id: snapshot.product_id,
                alert_type,
                quantity_at_open: snapshot.quantity,
                opened_at: now,
            });
        }
    }

    if snapshot.quantity > snapshot.threshold {
        plan.resolve.extend(
            open_of(AlertType::LowStock)
                .map(|a| (a.id, AlertResolution::automatic(snapshot.quantity, now))),
        );
    }
    if snapshot.quantity > 0 {
        plan.resolve.extend(
            open_of(AlertType::OutOfStock)
                .map(|a| (a.id, AlertResolution::automatic(snapshot.quantity, now))),
        );
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::classify;

    fn snapshot(product_id: ProductId, quantity: i64, threshold: i64, backorders: bool) -> StockSnapshot {
        StockSnapshot {
            product_id,
            quantity,
            status: classify(quantity, threshold, backorders, true),
            threshold,
        }
    }

    fn materialize(plan: AlertPlan, next_id: &mut u64) -> Vec<StockAlert> {
        plan.open
            .into_iter()
            .map(|a| {
                *next_id += 1;
                a.into_stored(AlertId::new(*next_id))
            })
            .collect()
    }

    #[test]
    fn low_stock_opens_once() {
        let product_id = ProductId::new();
        let mut next_id = 0;

        let plan = reconcile(snapshot(product_id, 5, 10, false), &[], Utc::now());
        assert_eq!(plan.open.len(), 1);
        assert_eq!(plan.open[0].alert_type, AlertType::LowStock);
        assert_eq!(plan.open[0].quantity_at_open, 5);
        let open = materialize(plan, &mut next_id);

        let again = reconcile(snapshot(product_id, 5, 10, false), &open, Utc::now());
        assert!(again.is_empty());
    }

    #[test]
    fn recovery_resolves_both_kinds() {
        let product_id = ProductId::new();
        let mut next_id = 0;
        let mut open = materialize(reconcile(snapshot(product_id, 5, 10, false), &[], Utc::now()), &mut next_id);
        open.extend(materialize(
            reconcile(snapshot(product_id, 0, 10, false), &open, Utc::now()),
            &mut next_id,
        ));
        assert_eq!(open.len(), 2);

        let plan = reconcile(snapshot(product_id, 50, 10, false), &open, Utc::now());
        assert!(plan.open.is_empty());
        let mut resolved: Vec<u64> = plan.resolve.iter().map(|(id, _)| id.get()).collect();
        resolved.sort();
        assert_eq!(resolved, vec![1, 2]);
    }

    #[test]
    fn restock_into_low_band_only_clears_out_of_stock() {
        let product_id = ProductId::new();
        let mut next_id = 0;
        let open = materialize(reconcile(snapshot(product_id, 0, 10, false), &[], Utc::now()), &mut next_id);

        let plan = reconcile(snapshot(product_id, 4, 10, false), &open, Utc::now());
        assert_eq!(plan.open.len(), 1);
        assert_eq!(plan.open[0].alert_type, AlertType::LowStock);
        assert_eq!(plan.resolve.len(), 1);
        assert_eq!(plan.resolve[0].0, AlertId::new(1));
    }

    #[test]
    fn backorder_status_opens_nothing() {
        let plan = reconcile(snapshot(ProductId::new(), 0, 10, true), &[], Utc::now());
        assert!(plan.is_empty());
    }

    #[test]
    fn other_products_alerts_are_ignored() {
        let product_id = ProductId::new();
        let mut next_id = 0;
        let foreign = materialize(
            reconcile(snapshot(ProductId::new(), 3, 10, false), &[], Utc::now()),
            &mut next_id,
        );
        let plan = reconcile(snapshot(product_id, 3, 10, false), &foreign, Utc::now());
        assert_eq!(plan.open.len(), 1);
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut alert = NewAlert {
            product_id: ProductId::new(),
            alert_type: AlertType::LowStock,
            quantity_at_open: 2,
            opened_at: Utc::now(),
        }
        .into_stored(AlertId::new(9));

        let first = AlertResolution::manual(Some(UserId::new()), Some("reordered".into()), Utc::now());
        assert!(alert.resolve(&first));
        let resolved_at = alert.resolved_at;

        let second = AlertResolution::manual(None, Some("again".into()), Utc::now());
        assert!(!alert.resolve(&second));
        assert_eq!(alert.resolved_at, resolved_at);
        assert_eq!(alert.notes.as_deref(), Some("reordered"));
    }

    #[test]
    fn resolve_all_only_targets_open_alerts() {
        let product_id = ProductId::new();
        let mut a = NewAlert {
            product_id,
            alert_type: AlertType::LowStock,
            quantity_at_open: 2,
            opened_at: Utc::now(),
        }
        .into_stored(AlertId::new(1));
        let b = NewAlert {
            product_id,
            alert_type: AlertType::OutOfStock,
            quantity_at_open: 0,
            opened_at: Utc::now(),
        }
        .into_stored(AlertId::new(2));
        a.resolve(&AlertResolution::automatic(20, Utc::now()));

        let plan = AlertPlan::resolve_all(&[a, b], "tracking disabled", Utc::now());
        assert_eq!(plan.resolve.len(), 1);
        assert_eq!(plan.resolve[0].0, AlertId::new(2));
    }
}
