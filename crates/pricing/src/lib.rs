//! Volume-tier pricing.
//!
//! Pure domain logic: validated tier configuration plus the resolver that
//! reconstructs which tier applied to a historical order line.

pub mod resolver;
pub mod tier;

pub use resolver::{
    PRICE_TOLERANCE, ResolutionPolicy, TierResolution, expected_tier, prices_match, quote, resolve,
    resolve_with,
};
pub use tier::{PriceTier, ProductPricing, TierDefinition, TierName};
