//! `storefront-core`: shared building blocks for the storefront engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the entity marker and the domain error taxonomy.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AlertId, MovementId, ProductId, UserId};
