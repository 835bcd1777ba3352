use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Entity, ProductId};

use crate::status::{StockStatus, classify};

/// Per-product inventory policy, validated on construction.
///
/// Deserialization goes through [`InventorySettings::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SettingsFields")]
pub struct InventorySettings {
    tracking_enabled: bool,
    low_stock_threshold: i64,
    allow_backorders: bool,
}

impl InventorySettings {
    pub fn new(
        tracking_enabled: bool,
        low_stock_threshold: i64,
        allow_backorders: bool,
    ) -> DomainResult<Self> {
        if low_stock_threshold < 0 {
            return Err(DomainError::validation(format!(
                "low stock threshold must be >= 0 (got {low_stock_threshold})"
            )));
        }
        Ok(Self {
            tracking_enabled,
            low_stock_threshold,
            allow_backorders,
        })
    }

    /// Tracked inventory with the given threshold and no backorders.
    pub fn tracked(low_stock_threshold: i64) -> DomainResult<Self> {
        Self::new(true, low_stock_threshold, false)
    }

    pub fn untracked() -> Self {
        Self {
            tracking_enabled: false,
            low_stock_threshold: 0,
            allow_backorders: false,
        }
    }

    pub fn with_backorders(mut self, allow: bool) -> Self {
        self.allow_backorders = allow;
        self
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    pub fn allow_backorders(&self) -> bool {
        self.allow_backorders
    }
}

#[derive(Deserialize)]
struct SettingsFields {
    tracking_enabled: bool,
    low_stock_threshold: i64,
    allow_backorders: bool,
}

impl TryFrom<SettingsFields> for InventorySettings {
    type Error = DomainError;

    fn try_from(raw: SettingsFields) -> Result<Self, Self::Error> {
        Self::new(raw.tracking_enabled, raw.low_stock_threshold, raw.allow_backorders)
    }
}

/// One inventory row per product.
///
/// The cached `status` is always the classifier output for the current
/// quantity and settings; every mutator recomputes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RecordFields")]
pub struct InventoryRecord {
    product_id: ProductId,
    quantity_on_hand: i64,
    settings: InventorySettings,
    status: StockStatus,
    updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// A freshly registered product starts at zero on hand.
    pub fn new(product_id: ProductId, settings: InventorySettings, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            product_id,
            quantity_on_hand: 0,
            settings,
            status: StockStatus::Untracked,
            updated_at: now,
        };
        record.recompute_status();
        record
    }

    /// Rebuild a record from persisted columns (status is re-derived, never trusted).
    pub fn from_parts(
        product_id: ProductId,
        quantity_on_hand: i64,
        settings: InventorySettings,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            product_id,
            quantity_on_hand,
            settings,
            status: StockStatus::Untracked,
            updated_at,
        };
        record.recompute_status();
        record
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn settings(&self) -> &InventorySettings {
        &self.settings
    }

    pub fn tracking_enabled(&self) -> bool {
        self.settings.tracking_enabled
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.settings.low_stock_threshold
    }

    pub fn allow_backorders(&self) -> bool {
        self.settings.allow_backorders
    }

    pub fn status(&self) -> StockStatus {
        self.status
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply a signed delta, returning `(before, after)`.
    ///
    /// No clamping: an overdraft stays visible as a negative quantity.
    pub fn apply_delta(&mut self, delta: i64, now: DateTime<Utc>) -> DomainResult<(i64, i64)> {
        if !self.settings.tracking_enabled {
            return Err(DomainError::tracking_disabled(self.product_id));
        }
        let before = self.quantity_on_hand;
        let after = before.checked_add(delta).ok_or_else(|| {
            DomainError::validation(format!("delta {delta} overflows quantity {before}"))
        })?;
        self.quantity_on_hand = after;
        self.updated_at = now;
        self.recompute_status();
        Ok((before, after))
    }

    /// Replace the policy and re-derive status (quantity is untouched).
    pub fn update_settings(&mut self, settings: InventorySettings, now: DateTime<Utc>) {
        self.settings = settings;
        self.updated_at = now;
        self.recompute_status();
    }

    fn recompute_status(&mut self) {
        self.status = classify(
            self.quantity_on_hand,
            self.settings.low_stock_threshold,
            self.settings.allow_backorders,
            self.settings.tracking_enabled,
        );
    }
}

/// Serialized form; `status` is accepted but re-derived.
#[derive(Deserialize)]
struct RecordFields {
    product_id: ProductId,
    quantity_on_hand: i64,
    settings: InventorySettings,
    updated_at: DateTime<Utc>,
}

impl From<RecordFields> for InventoryRecord {
    fn from(raw: RecordFields) -> Self {
        Self::from_parts(raw.product_id, raw.quantity_on_hand, raw.settings, raw.updated_at)
    }
}

impl Entity for InventoryRecord {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }
}
