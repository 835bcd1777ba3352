//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only. Storage and lock timeouts live in the
/// infrastructure layer, which is the only place a retryable failure can arise.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed delta, movement type, quantity...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Product configuration is inconsistent (e.g. a tier with a price but no
    /// minimum quantity).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stock mutation attempted on a product whose inventory is not tracked.
    #[error("inventory tracking is disabled for product {0}")]
    TrackingDisabled(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn tracking_disabled(product: impl core::fmt::Display) -> Self {
        Self::TrackingDisabled(product.to_string())
    }
}
