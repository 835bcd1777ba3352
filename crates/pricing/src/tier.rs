use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult};

/// Volume tier a line can be priced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    Retail,
    Wholesale,
    Distributor,
    /// No configured tier explains the line; the charged price stands as-is.
    Legacy,
}

impl TierName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Retail => "retail",
            TierName::Wholesale => "wholesale",
            TierName::Distributor => "distributor",
            TierName::Legacy => "legacy",
        }
    }

    /// Customer-facing label, e.g. `Wholesale (20+ units)`.
    pub fn display_label(&self, min_qty: Option<u32>) -> String {
        match (self, min_qty) {
            (TierName::Retail, _) => "Retail".to_string(),
            (TierName::Wholesale, Some(n)) => format!("Wholesale ({n}+ units)"),
            (TierName::Wholesale, None) => "Wholesale".to_string(),
            (TierName::Distributor, Some(n)) => format!("Distributor ({n}+ units)"),
            (TierName::Distributor, None) => "Distributor".to_string(),
            (TierName::Legacy, _) => "Legacy pricing".to_string(),
        }
    }
}

impl core::fmt::Display for TierName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price breakpoint: unit `price` from `min_qty` units up.
///
/// Configuration enters through [`ProductPricing`], never raw deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceTier {
    price: Decimal,
    min_qty: u32,
}

impl PriceTier {
    pub fn new(price: Decimal, min_qty: u32) -> DomainResult<Self> {
        if price < Decimal::ZERO {
            return Err(DomainError::validation(format!("tier price must be >= 0 (got {price})")));
        }
        if min_qty == 0 {
            return Err(DomainError::validation("tier minimum quantity must be >= 1"));
        }
        Ok(Self { price, min_qty })
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn min_qty(&self) -> u32 {
        self.min_qty
    }

    pub fn qualifies(&self, quantity: u32) -> bool {
        quantity >= self.min_qty
    }
}

/// Up to three optional tiers configured on a product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierDefinition {
    retail: Option<PriceTier>,
    wholesale: Option<PriceTier>,
    distributor: Option<PriceTier>,
}

impl TierDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retail(mut self, tier: PriceTier) -> Self {
        self.retail = Some(tier);
        self
    }

    pub fn with_wholesale(mut self, tier: PriceTier) -> Self {
        self.wholesale = Some(tier);
        self
    }

    pub fn with_distributor(mut self, tier: PriceTier) -> Self {
        self.distributor = Some(tier);
        self
    }

    pub fn retail(&self) -> Option<&PriceTier> {
        self.retail.as_ref()
    }

    pub fn wholesale(&self) -> Option<&PriceTier> {
        self.wholesale.as_ref()
    }

    pub fn distributor(&self) -> Option<&PriceTier> {
        self.distributor.as_ref()
    }

    pub fn get(&self, name: TierName) -> Option<&PriceTier> {
        match name {
            TierName::Retail => self.retail(),
            TierName::Wholesale => self.wholesale(),
            TierName::Distributor => self.distributor(),
            TierName::Legacy => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.retail.is_none() && self.wholesale.is_none() && self.distributor.is_none()
    }

    /// Configured tiers, highest volume first.
    pub fn by_priority(&self) -> impl Iterator<Item = (TierName, &PriceTier)> {
        [TierName::Distributor, TierName::Wholesale, TierName::Retail]
            .into_iter()
            .filter_map(|name| self.get(name).map(|tier| (name, tier)))
    }
}

/// Flat pricing columns as stored on a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductPricing {
    pub price: Option<Decimal>,
    pub retail_min_qty: Option<u32>,
    pub wholesale_price: Option<Decimal>,
    pub wholesale_min_qty: Option<u32>,
    pub distributor_price: Option<Decimal>,
    pub distributor_min_qty: Option<u32>,
}

fn paired_tier(
    name: TierName,
    price: Option<Decimal>,
    min_qty: Option<u32>,
) -> DomainResult<Option<PriceTier>> {
    match (price, min_qty) {
        (None, None) => Ok(None),
        (Some(price), Some(min_qty)) => PriceTier::new(price, min_qty).map(Some),
        (Some(_), None) => Err(DomainError::configuration(format!(
            "{name} tier has a price but no minimum quantity"
        ))),
        (None, Some(_)) => Err(DomainError::configuration(format!(
            "{name} tier has a minimum quantity but no price"
        ))),
    }
}

impl TryFrom<ProductPricing> for TierDefinition {
    type Error = DomainError;

    fn try_from(p: ProductPricing) -> Result<Self, Self::Error> {
        // Retail is the only tier with an implied minimum.
        let retail = match (p.price, p.retail_min_qty) {
            (Some(price), min_qty) => Some(PriceTier::new(price, min_qty.unwrap_or(1))?),
            (None, Some(_)) => {
                return Err(DomainError::configuration(
                    "retail tier has a minimum quantity but no price",
                ));
            }
            (None, None) => None,
        };

        Ok(Self {
            retail,
            wholesale: paired_tier(TierName::Wholesale, p.wholesale_price, p.wholesale_min_qty)?,
            distributor: paired_tier(TierName::Distributor, p.distributor_price, p.distributor_min_qty)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn retail_min_qty_defaults_to_one() {
        let tiers = TierDefinition::try_from(ProductPricing {
            price: Some(dec!(10.00)),
            ..ProductPricing::default()
        })
        .unwrap();
        assert_eq!(tiers.retail().unwrap().min_qty(), 1);
        assert!(tiers.wholesale().is_none());
    }

    #[test]
    fn half_configured_tiers_are_configuration_errors() {
        let err = TierDefinition::try_from(ProductPricing {
            price: Some(dec!(10)),
            wholesale_price: Some(dec!(8)),
            ..ProductPricing::default()
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(msg) if msg.contains("wholesale")));

        let err = TierDefinition::try_from(ProductPricing {
            distributor_min_qty: Some(100),
            ..ProductPricing::default()
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(msg) if msg.contains("distributor")));

        let err = TierDefinition::try_from(ProductPricing {
            retail_min_qty: Some(2),
            ..ProductPricing::default()
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn malformed_values_are_validation_errors() {
        assert!(matches!(PriceTier::new(dec!(-1), 1), Err(DomainError::Validation(_))));
        assert!(matches!(PriceTier::new(dec!(5), 0), Err(DomainError::Validation(_))));
        assert!(PriceTier::new(dec!(0), 1).is_ok());
    }

    #[test]
    fn priority_order_is_distributor_first() {
        let tiers = TierDefinition::new()
            .with_retail(PriceTier::new(dec!(10), 1).unwrap())
            .with_distributor(PriceTier::new(dec!(8), 100).unwrap());
        let names: Vec<TierName> = tiers.by_priority().map(|(n, _)| n).collect();
        assert_eq!(names, vec![TierName::Distributor, TierName::Retail]);
    }

    #[test]
    fn pricing_columns_deserialize_from_json() {
        let raw: ProductPricing = serde_json::from_str(
            r#"{"price":"12.50","wholesale_price":"10.00","wholesale_min_qty":20}"#,
        )
        .unwrap();
        let tiers = TierDefinition::try_from(raw).unwrap();
        assert_eq!(tiers.wholesale().unwrap().price(), dec!(10.00));
        assert_eq!(tiers.wholesale().unwrap().min_qty(), 20);
    }

    #[test]
    fn labels_mention_minimums() {
        assert_eq!(TierName::Wholesale.display_label(Some(20)), "Wholesale (20+ units)");
        assert_eq!(TierName::Retail.display_label(Some(1)), "Retail");
        assert_eq!(TierName::Legacy.display_label(None), "Legacy pricing");
    }
}
