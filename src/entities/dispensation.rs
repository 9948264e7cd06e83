use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Record of a quantity delivered to the patient from one lot against one
/// prescription line. Paired 1—1 with the negative DISPENSATION movement
/// created in the same transaction.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dispensations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub prescription_line_id: Uuid,
    pub lot_id: Uuid,
    pub movement_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub center_id: Uuid,
    pub quantity: i32,
    pub dispensed_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::prescription_line::Entity",
        from = "Column::PrescriptionLineId",
        to = "super::prescription_line::Column::Id"
    )]
    PrescriptionLine,
}

impl Related<super::prescription_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrescriptionLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
