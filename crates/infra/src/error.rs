//! Public error taxonomy of the inventory engine.

use thiserror::Error;

use storefront_core::DomainError;

use crate::lock::LockTimeout;
use crate::store::StoreError;

/// Error returned by every operation of the inventory engine.
///
/// Only [`InventoryError::Transient`] is worth retrying; nothing is retried
/// internally. Every variant guarantees that no partial state was committed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("inventory tracking is disabled for product {0}")]
    TrackingDisabled(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Lock wait or storage timeout; retry with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Backend fault that a retry will not fix (corrupt row, poisoned store).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl InventoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::Transient(_))
    }
}

impl From<DomainError> for InventoryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => InventoryError::Validation(msg),
            DomainError::InvalidId(msg) => InventoryError::Validation(msg),
            DomainError::Configuration(msg) => InventoryError::Configuration(msg),
            DomainError::NotFound(msg) => InventoryError::NotFound(msg),
            DomainError::TrackingDisabled(product) => InventoryError::TrackingDisabled(product),
        }
    }
}

impl From<StoreError> for InventoryError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(msg) | StoreError::Conflict(msg) => InventoryError::Transient(msg),
            StoreError::NotFound(msg) => InventoryError::NotFound(msg),
            StoreError::AlreadyExists(msg) => InventoryError::Validation(format!("already exists: {msg}")),
            StoreError::Invalid(msg) | StoreError::Storage(msg) => InventoryError::Storage(msg),
        }
    }
}

impl From<LockTimeout> for InventoryError {
    fn from(value: LockTimeout) -> Self {
        InventoryError::Transient(value.to_string())
    }
}
