use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Entity, MovementId, ProductId, UserId};

/// Reason code of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
    Adjustment,
    Return,
    Damaged,
    Transfer,
}

/// Which delta signs a movement type accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSign {
    Positive,
    Negative,
    Either,
}

impl MovementType {
    pub const ALL: [MovementType; 6] = [
        MovementType::Purchase,
        MovementType::Sale,
        MovementType::Adjustment,
        MovementType::Return,
        MovementType::Damaged,
        MovementType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::Sale => "sale",
            MovementType::Adjustment => "adjustment",
            MovementType::Return => "return",
            MovementType::Damaged => "damaged",
            MovementType::Transfer => "transfer",
        }
    }

    pub fn expected_sign(&self) -> DeltaSign {
        match self {
            MovementType::Purchase | MovementType::Return => DeltaSign::Positive,
            MovementType::Sale | MovementType::Damaged => DeltaSign::Negative,
            MovementType::Adjustment | MovementType::Transfer => DeltaSign::Either,
        }
    }

    /// Check a delta against this movement type.
    pub fn validate_delta(&self, delta: i64) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let ok = match self.expected_sign() {
            DeltaSign::Positive => delta > 0,
            DeltaSign::Negative => delta < 0,
            DeltaSign::Either => true,
        };
        if !ok {
            return Err(DomainError::validation(format!(
                "delta {delta} has the wrong sign for a {} movement",
                self.as_str()
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{s}'")))
    }
}

/// Opaque correlation to the business object that caused a movement
/// (e.g. `order` / `1042`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReference {
    pub reference_type: String,
    pub reference_id: String,
}

impl MovementReference {
    pub fn new(reference_type: impl Into<String>, reference_id: impl Into<String>) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id: reference_id.into(),
        }
    }

    pub fn order(order_id: impl Into<String>) -> Self {
        Self::new("order", order_id)
    }
}

/// Command: AdjustStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub product_id: ProductId,
    pub delta: i64,
    pub movement_type: MovementType,
    pub reference: Option<MovementReference>,
    pub note: Option<String>,
    pub actor: Option<UserId>,
}

impl AdjustStock {
    pub fn new(product_id: ProductId, delta: i64, movement_type: MovementType) -> Self {
        Self {
            product_id,
            delta,
            movement_type,
            reference: None,
            note: None,
            actor: None,
        }
    }

    pub fn with_reference(mut self, reference: MovementReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.movement_type.validate_delta(self.delta)?;
        if let Some(reference) = &self.reference {
            if reference.reference_type.trim().is_empty() || reference.reference_id.trim().is_empty() {
                return Err(DomainError::validation(
                    "movement reference needs both a type and an id",
                ));
            }
        }
        Ok(())
    }
}

/// A movement ready to be appended (not yet assigned an id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub movement_type: MovementType,
    pub reference: Option<MovementReference>,
    pub note: Option<String>,
    pub actor: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl NewMovement {
    /// Build the ledger row for an applied adjustment.
    pub fn from_command(
        cmd: &AdjustStock,
        quantity_before: i64,
        quantity_after: i64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let movement = Self {
            product_id: cmd.product_id,
            delta: cmd.delta,
            quantity_before,
            quantity_after,
            movement_type: cmd.movement_type,
            reference: cmd.reference.clone(),
            note: cmd.note.clone(),
            actor: cmd.actor,
            created_at,
        };
        if !movement.is_consistent() {
            return Err(DomainError::validation(format!(
                "movement arithmetic mismatch: {quantity_before} + {} != {quantity_after}",
                cmd.delta
            )));
        }
        Ok(movement)
    }

    pub fn is_consistent(&self) -> bool {
        self.quantity_before.checked_add(self.delta) == Some(self.quantity_after)
    }

    /// Stamp the store-assigned id (the row becomes immutable from here on).
    pub fn into_stored(self, id: MovementId) -> StockMovement {
        StockMovement {
            id,
            product_id: self.product_id,
            delta: self.delta,
            quantity_before: self.quantity_before,
            quantity_after: self.quantity_after,
            movement_type: self.movement_type,
            reference: self.reference,
            note: self.note,
            actor: self.actor,
            created_at: self.created_at,
        }
    }
}

/// An immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub movement_type: MovementType,
    pub reference: Option<MovementReference>,
    pub note: Option<String>,
    pub actor: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn is_consistent(&self) -> bool {
        self.quantity_before.checked_add(self.delta) == Some(self.quantity_after)
    }
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
