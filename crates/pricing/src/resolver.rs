//! Tier resolution for order lines.
//!
//! Given a product's tiers, a line quantity and the unit price recorded at
//! checkout, decide which tier to present. Price comparisons use a fixed
//! tolerance of one currency subunit.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult};

use crate::tier::{PriceTier, TierDefinition, TierName};

/// Two prices closer than this are the same price.
pub const PRICE_TOLERANCE: Decimal = dec!(0.01);

pub fn prices_match(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() < PRICE_TOLERANCE
}

/// What wins when the quantity qualifies for a tier whose price differs from
/// the charged one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Report the tier the quantity qualifies for today, even if the line was
    /// billed at another price.
    #[default]
    QualifiedTier,
    /// Only report a tier whose price matches what was billed; otherwise the
    /// line is legacy-priced.
    ChargedPrice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierResolution {
    pub tier: TierName,
    pub display_label: String,
    pub min_qty: Option<u32>,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

impl TierResolution {
    fn for_tier(name: TierName, tier: &PriceTier, quantity: u32) -> DomainResult<Self> {
        Self::build(name, Some(tier.min_qty()), tier.price(), quantity)
    }

    fn legacy(charged_unit_price: Decimal, quantity: u32) -> DomainResult<Self> {
        Self::build(TierName::Legacy, None, charged_unit_price, quantity)
    }

    fn build(tier: TierName, min_qty: Option<u32>, unit_price: Decimal, quantity: u32) -> DomainResult<Self> {
        let line_total = unit_price.checked_mul(Decimal::from(quantity)).ok_or_else(|| {
            DomainError::validation(format!("line total overflows ({unit_price} x {quantity})"))
        })?;
        Ok(Self {
            tier,
            display_label: tier.display_label(min_qty),
            min_qty,
            unit_price,
            quantity,
            line_total,
        })
    }

    /// True when the presented unit price is not what was billed.
    pub fn differs_from_charged(&self, charged_unit_price: Decimal) -> bool {
        !prices_match(self.unit_price, charged_unit_price)
    }
}

/// Highest-volume tier the quantity qualifies for (distributor, wholesale, retail).
pub fn expected_tier(tiers: &TierDefinition, quantity: u32) -> Option<(TierName, PriceTier)> {
    tiers
        .by_priority()
        .find(|(_, tier)| tier.qualifies(quantity))
        .map(|(name, tier)| (name, *tier))
}

/// Reverse search: a qualifying tier whose price matches the charged price.
fn match_charged_price(
    tiers: &TierDefinition,
    quantity: u32,
    charged_unit_price: Decimal,
) -> Option<(TierName, PriceTier)> {
    for (name, tier) in tiers.by_priority() {
        if !tier.qualifies(quantity) || !prices_match(tier.price(), charged_unit_price) {
            continue;
        }
        if name == TierName::Retail && retail_shadowed(tiers, tier, quantity) {
            continue;
        }
        return Some((name, *tier));
    }
    None
}

/// Retail must not claim a price that a higher tier the quantity qualifies for
/// also carries.
fn retail_shadowed(tiers: &TierDefinition, retail: &PriceTier, quantity: u32) -> bool {
    [tiers.wholesale(), tiers.distributor()]
        .into_iter()
        .flatten()
        .any(|higher| higher.qualifies(quantity) && prices_match(higher.price(), retail.price()))
}

fn validate_line(quantity: u32, charged_unit_price: Decimal) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("line quantity must be positive"));
    }
    if charged_unit_price < Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "charged unit price must be >= 0 (got {charged_unit_price})"
        )));
    }
    Ok(())
}

/// Resolve with the default [`ResolutionPolicy::QualifiedTier`].
pub fn resolve(
    tiers: &TierDefinition,
    quantity: u32,
    charged_unit_price: Decimal,
) -> DomainResult<TierResolution> {
    resolve_with(tiers, quantity, charged_unit_price, ResolutionPolicy::default())
}

pub fn resolve_with(
    tiers: &TierDefinition,
    quantity: u32,
    charged_unit_price: Decimal,
    policy: ResolutionPolicy,
) -> DomainResult<TierResolution> {
    validate_line(quantity, charged_unit_price)?;

    let chosen = match policy {
        ResolutionPolicy::QualifiedTier => expected_tier(tiers, quantity)
            .or_else(|| match_charged_price(tiers, quantity, charged_unit_price)),
        ResolutionPolicy::ChargedPrice => match_charged_price(tiers, quantity, charged_unit_price),
    };

    match chosen {
        Some((name, tier)) => TierResolution::for_tier(name, &tier, quantity),
        None => TierResolution::legacy(charged_unit_price, quantity),
    }
}

/// Checkout-time price for `quantity` units (no charged price yet).
pub fn quote(tiers: &TierDefinition, quantity: u32) -> DomainResult<Option<TierResolution>> {
    if quantity == 0 {
        return Err(DomainError::validation("line quantity must be positive"));
    }
    expected_tier(tiers, quantity)
        .map(|(name, tier)| TierResolution::for_tier(name, &tier, quantity))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tier(price: Decimal, min_qty: u32) -> PriceTier {
        PriceTier::new(price, min_qty).unwrap()
    }

    fn three_tiers() -> TierDefinition {
        TierDefinition::new()
            .with_distributor(tier(dec!(800), 100))
            .with_wholesale(tier(dec!(900), 20))
            .with_retail(tier(dec!(1000), 1))
    }

    #[test]
    fn qualified_tier_overrides_charged_price() {
        let r = resolve(&three_tiers(), 150, dec!(1000)).unwrap();
        assert_eq!(r.tier, TierName::Distributor);
        assert_eq!(r.unit_price, dec!(800));
        assert_eq!(r.line_total, dec!(120000));
        assert_eq!(r.min_qty, Some(100));
        assert_eq!(r.display_label, "Distributor (100+ units)");
        assert!(r.differs_from_charged(dec!(1000)));
    }

    #[test]
    fn retail_only_product() {
        let tiers = TierDefinition::new().with_retail(tier(dec!(1000), 1));
        let r = resolve(&tiers, 5, dec!(1000)).unwrap();
        assert_eq!(r.tier, TierName::Retail);
        assert_eq!(r.line_total, dec!(5000));
        assert!(!r.differs_from_charged(dec!(1000)));
    }

    #[test]
    fn wholesale_band_between_minimums() {
        let r = resolve(&three_tiers(), 20, dec!(900)).unwrap();
        assert_eq!(r.tier, TierName::Wholesale);
        assert_eq!(r.line_total, dec!(18000));

        let r = resolve(&three_tiers(), 19, dec!(900)).unwrap();
        assert_eq!(r.tier, TierName::Retail);
    }

    #[test]
    fn nothing_qualifies_falls_back_to_legacy() {
        let tiers = TierDefinition::new().with_wholesale(tier(dec!(9), 20));
        let r = resolve(&tiers, 5, dec!(11.25)).unwrap();
        assert_eq!(r.tier, TierName::Legacy);
        assert_eq!(r.min_qty, None);
        assert_eq!(r.unit_price, dec!(11.25));
        assert_eq!(r.line_total, dec!(56.25));
        assert_eq!(r.display_label, "Legacy pricing");

        let r = resolve(&TierDefinition::new(), 3, dec!(4.10)).unwrap();
        assert_eq!(r.tier, TierName::Legacy);
        assert_eq!(r.line_total, dec!(12.30));
    }

    #[test]
    fn charged_price_policy_reports_what_was_billed() {
        let tiers = three_tiers();

        let r = resolve_with(&tiers, 150, dec!(1000), ResolutionPolicy::ChargedPrice).unwrap();
        assert_eq!(r.tier, TierName::Retail);
        assert_eq!(r.line_total, dec!(150000));

        let r = resolve_with(&tiers, 150, dec!(900), ResolutionPolicy::ChargedPrice).unwrap();
        assert_eq!(r.tier, TierName::Wholesale);

        let r = resolve_with(&tiers, 150, dec!(950), ResolutionPolicy::ChargedPrice).unwrap();
        assert_eq!(r.tier, TierName::Legacy);
        assert_eq!(r.unit_price, dec!(950));
    }

    #[test]
    fn retail_never_claims_a_qualifying_higher_tier_price() {
        let tiers = TierDefinition::new()
            .with_wholesale(tier(dec!(900), 20))
            .with_retail(tier(dec!(900), 1));

        let r = resolve_with(&tiers, 25, dec!(900), ResolutionPolicy::ChargedPrice).unwrap();
        assert_eq!(r.tier, TierName::Wholesale);

        // Below the wholesale minimum retail is the honest answer.
        let r = resolve_with(&tiers, 5, dec!(900), ResolutionPolicy::ChargedPrice).unwrap();
        assert_eq!(r.tier, TierName::Retail);
    }

    #[test]
    fn tolerance_is_one_subunit() {
        assert!(prices_match(dec!(900), dec!(899.995)));
        assert!(!prices_match(dec!(900), dec!(899.99)));

        let tiers = three_tiers();
        let r = resolve_with(&tiers, 50, dec!(899.995), ResolutionPolicy::ChargedPrice).unwrap();
        assert_eq!(r.tier, TierName::Wholesale);
        let r = resolve_with(&tiers, 50, dec!(899.99), ResolutionPolicy::ChargedPrice).unwrap();
        assert_eq!(r.tier, TierName::Legacy);
    }

    #[test]
    fn invalid_lines_are_rejected() {
        assert!(matches!(resolve(&three_tiers(), 0, dec!(1)), Err(DomainError::Validation(_))));
        assert!(matches!(resolve(&three_tiers(), 1, dec!(-1)), Err(DomainError::Validation(_))));
        assert!(matches!(quote(&three_tiers(), 0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn overflowing_line_total_is_an_error() {
        let err = resolve(&TierDefinition::new(), 1000, Decimal::MAX).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let huge = TierDefinition::new().with_retail(tier(Decimal::MAX, 1));
        assert!(matches!(quote(&huge, 2), Err(DomainError::Validation(_))));
        assert_eq!(quote(&huge, 1).unwrap().unwrap().line_total, Decimal::MAX);
    }

    #[test]
    fn quote_uses_the_qualified_tier() {
        let q = quote(&three_tiers(), 40).unwrap().unwrap();
        assert_eq!(q.tier, TierName::Wholesale);
        assert_eq!(q.line_total, dec!(36000));

        let none = quote(&TierDefinition::new().with_wholesale(tier(dec!(9), 20)), 2).unwrap();
        assert!(none.is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the chosen tier qualifies, no higher tier qualifies, and the
        /// total is always unit price times quantity.
        #[test]
        fn resolution_is_highest_qualifying_tier(
            quantity in 1u32..500,
            charged_cents in 0i64..200_000,
            wholesale_min in 2u32..60,
            distributor_extra in 1u32..200,
        ) {
            let distributor_min = wholesale_min + distributor_extra;
            let tiers = TierDefinition::new()
                .with_distributor(tier(dec!(7.50), distributor_min))
                .with_wholesale(tier(dec!(8.25), wholesale_min))
                .with_retail(tier(dec!(10.00), 1));
            let charged = Decimal::new(charged_cents, 2);

            let r = resolve(&tiers, quantity, charged).unwrap();
            prop_assert_eq!(r.line_total, r.unit_price * Decimal::from(quantity));

            let expected = if quantity >= distributor_min {
                TierName::Distributor
            } else if quantity >= wholesale_min {
                TierName::Wholesale
            } else {
                TierName::Retail
            };
            prop_assert_eq!(r.tier, expected);
        }
    }
}
