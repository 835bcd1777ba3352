//! Read-only "can N units be fulfilled now?" check.

use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult};

use crate::record::InventoryRecord;

/// Why an availability answer came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityReason {
    /// Fewer units on hand than requested.
    Insufficient { on_hand: i64 },
    /// Nothing on hand and backorders are not allowed.
    OutOfStock,
    /// Nothing on hand; the sale proceeds as a backorder.
    Backorder,
}

impl core::fmt::Display for AvailabilityReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AvailabilityReason::Insufficient { on_hand } => {
                write!(f, "insufficient stock: only {on_hand} available")
            }
            AvailabilityReason::OutOfStock => f.write_str("out of stock"),
            AvailabilityReason::Backorder => f.write_str("available on backorder"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub reason: Option<AvailabilityReason>,
    /// `None` means unbounded (inventory not tracked).
    pub available_quantity: Option<i64>,
}

impl Availability {
    pub fn is_backorder(&self) -> bool {
        matches!(self.reason, Some(AvailabilityReason::Backorder))
    }
}

/// Answer whether `requested` units of `record` can be fulfilled.
pub fn check(record: &InventoryRecord, requested: i64) -> DomainResult<Availability> {
    if requested <= 0 {
        return Err(DomainError::validation(format!(
            "requested quantity must be positive (got {requested})"
        )));
    }

    if !record.tracking_enabled() {
        return Ok(Availability {
            available: true,
            reason: None,
            available_quantity: None,
        });
    }

    let on_hand = record.quantity_on_hand().max(0);
    if on_hand >= requested {
        return Ok(Availability {
            available: true,
            reason: None,
            available_quantity: Some(on_hand),
        });
    }

    if on_hand == 0 {
        let reason = if record.allow_backorders() {
            AvailabilityReason::Backorder
        } else {
            AvailabilityReason::OutOfStock
        };
        return Ok(Availability {
            available: record.allow_backorders(),
            reason: Some(reason),
            available_quantity: Some(0),
        });
    }

    Ok(Availability {
        available: false,
        reason: Some(AvailabilityReason::Insufficient { on_hand }),
        available_quantity: Some(on_hand),
    })
}
