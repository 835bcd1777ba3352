//! Ledger replay and audit.
//!
//! Replaying every movement of a product in creation order, starting from
//! zero, must land on the current on-hand quantity.

use serde::{Deserialize, Serialize};

use storefront_core::{MovementId, ProductId};

use crate::movement::StockMovement;

/// A point where the ledger chain does not line up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerBreak {
    /// `quantity_before + delta != quantity_after` inside one row.
    Arithmetic { movement_id: MovementId },
    /// A row's `quantity_before` differs from the running total so far.
    Discontinuity {
        movement_id: MovementId,
        expected_before: i64,
        recorded_before: i64,
    },
}

/// Result of replaying a product's ledger against its inventory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub product_id: ProductId,
    pub movement_count: usize,
    pub replayed_quantity: i64,
    pub on_hand: i64,
    pub breaks: Vec<LedgerBreak>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.breaks.is_empty() && self.replayed_quantity == self.on_hand
    }
}

/// Sum of all deltas from zero, in the given order.
pub fn replay<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> i64 {
    movements
        .into_iter()
        .fold(0i64, |total, m| total.saturating_add(m.delta))
}

/// Replay `movements` (any order; sorted by id here) and compare with `on_hand`.
pub fn audit(product_id: ProductId, movements: &[StockMovement], on_hand: i64) -> LedgerAudit {
    let mut ordered: Vec<&StockMovement> = movements.iter().collect();
    ordered.sort_by_key(|m| m.id);

    let mut running = 0i64;
    let mut breaks = Vec::new();
    for m in &ordered {
        if !m.is_consistent() {
            breaks.push(LedgerBreak::Arithmetic { movement_id: m.id });
        }
        if m.quantity_before != running {
            breaks.push(LedgerBreak::Discontinuity {
                movement_id: m.id,
                expected_before: running,
                recorded_before: m.quantity_before,
            });
        }
        running = running.saturating_add(m.delta);
    }

    LedgerAudit {
        product_id,
        movement_count: ordered.len(),
        replayed_quantity: running,
        on_hand,
        breaks,
    }
}
