use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One medicament entry within a prescription.
///
/// `status` is derived from the dispensation history and recomputed inside
/// every dispensation transaction, never set directly by callers.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "prescription_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub medicament_id: Uuid,
    pub quantity_prescribed: i32,
    pub posology: String,
    pub duration_days: Option<i32>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::prescription::Entity",
        from = "Column::PrescriptionId",
        to = "super::prescription::Column::Id"
    )]
    Prescription,
    #[sea_orm(
        belongs_to = "super::medicament::Entity",
        from = "Column::MedicamentId",
        to = "super::medicament::Column::Id"
    )]
    Medicament,
    #[sea_orm(has_many = "super::dispensation::Entity")]
    Dispensations,
}

impl Related<super::prescription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prescription.def()
    }
}

impl Related<super::medicament::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Medicament.def()
    }
}

impl Related<super::dispensation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dispensations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Fulfillment status of a prescription line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStatus {
    Prescribed,
    PartiallyDispensed,
    Dispensed,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Prescribed => "PRESCRIBED",
            LineStatus::PartiallyDispensed => "PARTIALLY_DISPENSED",
            LineStatus::Dispensed => "DISPENSED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PRESCRIBED" => Some(LineStatus::Prescribed),
            "PARTIALLY_DISPENSED" => Some(LineStatus::PartiallyDispensed),
            "DISPENSED" => Some(LineStatus::Dispensed),
            _ => None,
        }
    }

    /// Derives the status from delivered vs. prescribed totals.
    pub fn derive(delivered: i32, prescribed: i32) -> Self {
        if delivered <= 0 {
            LineStatus::Prescribed
        } else if delivered < prescribed {
            LineStatus::PartiallyDispensed
        } else {
            LineStatus::Dispensed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_reflects_delivery_progress() {
        assert_eq!(LineStatus::derive(0, 30), LineStatus::Prescribed);
        assert_eq!(LineStatus::derive(10, 30), LineStatus::PartiallyDispensed);
        assert_eq!(LineStatus::derive(30, 30), LineStatus::Dispensed);
        assert_eq!(LineStatus::derive(45, 30), LineStatus::Dispensed);
    }
}
