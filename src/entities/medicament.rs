use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Medicament reference data. Administrative edits only; stock levels live
/// in `stock_lots` and `stock_movements`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "medicaments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub commercial_name: String,
    pub generic_name: String,
    pub dosage: String,
    pub pharmaceutical_form: String,
    pub category: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_price: rust_decimal::Decimal,
    pub sale_unit: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::prescription_line::Entity")]
    PrescriptionLines,
}

impl Related<super::prescription_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrescriptionLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
