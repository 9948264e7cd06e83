use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only ledger entry recording one signed quantity change against a
/// lot. Rows are created and read, never updated or deleted; the table has
/// no foreign key to `stock_lots` so history survives lot deletion (the
/// lot number is denormalized here for that reason).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_type: String,
    pub product_id: Uuid,
    pub lot_id: Uuid,
    pub lot_number: String,
    pub movement_type: String,
    /// Signed quantity: positive = inbound, negative = outbound.
    pub quantity: i32,
    pub center_id: Uuid,
    pub professional_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Types of stock movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    Reception,
    Dispensation,
    CorrectionIn,
    CorrectionOut,
    Adjustment,
    ExpiryWriteOff,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Reception => "RECEPTION",
            MovementType::Dispensation => "DISPENSATION",
            MovementType::CorrectionIn => "CORRECTION_IN",
            MovementType::CorrectionOut => "CORRECTION_OUT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::ExpiryWriteOff => "EXPIRY_WRITE_OFF",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RECEPTION" => Some(MovementType::Reception),
            "DISPENSATION" => Some(MovementType::Dispensation),
            "CORRECTION_IN" => Some(MovementType::CorrectionIn),
            "CORRECTION_OUT" => Some(MovementType::CorrectionOut),
            "ADJUSTMENT" => Some(MovementType::Adjustment),
            "EXPIRY_WRITE_OFF" => Some(MovementType::ExpiryWriteOff),
            _ => None,
        }
    }

    /// Whether this movement type normally carries a positive quantity.
    pub fn is_inbound(&self) -> bool {
        matches!(self, MovementType::Reception | MovementType::CorrectionIn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_type_round_trips() {
        for t in [
            MovementType::Reception,
            MovementType::Dispensation,
            MovementType::CorrectionIn,
            MovementType::CorrectionOut,
            MovementType::Adjustment,
            MovementType::ExpiryWriteOff,
        ] {
            assert_eq!(MovementType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(MovementType::from_str("TELEPORT"), None);
    }
}
