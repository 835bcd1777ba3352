//! Stock status classification.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use storefront_core::DomainError;

/// Categorical stock status derived from quantity and product policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    OnBackorder,
    /// Inventory is not tracked; storefronts must not render a badge.
    Untracked,
}

impl StockStatus {
    pub const ALL: [StockStatus; 5] = [
        StockStatus::InStock,
        StockStatus::LowStock,
        StockStatus::OutOfStock,
        StockStatus::OnBackorder,
        StockStatus::Untracked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::OnBackorder => "on_backorder",
            StockStatus::Untracked => "untracked",
        }
    }

    /// Whether a storefront should surface a stock badge for this status.
    pub fn shows_badge(&self) -> bool {
        !matches!(self, StockStatus::Untracked)
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StockStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown stock status '{s}'")))
    }
}

/// Map quantity + policy onto a [`StockStatus`].
///
/// The bands are mutually exclusive. An overdrawn quantity (below zero) falls
/// into the same band as zero.
pub fn classify(
    quantity: i64,
    threshold: i64,
    allow_backorders: bool,
    tracking_enabled: bool,
) -> StockStatus {
    if !tracking_enabled {
        return StockStatus::Untracked;
    }
    if quantity > threshold && quantity > 0 {
        return StockStatus::InStock;
    }
    if quantity > 0 {
        return StockStatus::LowStock;
    }
    if allow_backorders {
        StockStatus::OnBackorder
    } else {
        StockStatus::OutOfStock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundary_cases() {
        assert_eq!(classify(11, 10, false, true), StockStatus::InStock);
        assert_eq!(classify(10, 10, false, true), StockStatus::LowStock);
        assert_eq!(classify(1, 10, false, true), StockStatus::LowStock);
        assert_eq!(classify(0, 10, true, true), StockStatus::OnBackorder);
        assert_eq!(classify(0, 10, false, true), StockStatus::OutOfStock);
    }

    #[test]
    fn untracked_wins_over_everything() {
        assert_eq!(classify(500, 10, false, false), StockStatus::Untracked);
        assert_eq!(classify(0, 10, true, false), StockStatus::Untracked);
        assert!(!StockStatus::Untracked.shows_badge());
        assert!(StockStatus::OutOfStock.shows_badge());
    }

    #[test]
    fn zero_threshold_never_reports_low_stock() {
        assert_eq!(classify(1, 0, false, true), StockStatus::InStock);
        assert_eq!(classify(0, 0, false, true), StockStatus::OutOfStock);
    }

    #[test]
    fn overdraft_is_classified_like_zero() {
        assert_eq!(classify(-3, 10, false, true), StockStatus::OutOfStock);
        assert_eq!(classify(-3, 10, true, true), StockStatus::OnBackorder);
    }

    #[test]
    fn wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&StockStatus::OnBackorder).unwrap(),
            "\"on_backorder\""
        );
        for status in StockStatus::ALL {
            assert_eq!(status.as_str().parse::<StockStatus>().unwrap(), status);
        }
        assert!("sold_out".parse::<StockStatus>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: for non-negative quantities exactly one tracked band applies,
        /// and it agrees with the threshold arithmetic.
        #[test]
        fn tracked_bands_are_exhaustive(
            quantity in 0i64..10_000,
            threshold in 0i64..1_000,
            backorders in any::<bool>(),
        ) {
            let status = classify(quantity, threshold, backorders, true);
            let expected = if quantity > threshold {
                StockStatus::InStock
            } else if quantity > 0 {
                StockStatus::LowStock
            } else if backorders {
                StockStatus::OnBackorder
            } else {
                StockStatus::OutOfStock
            };
            prop_assert_eq!(status, expected);
        }
    }
}
