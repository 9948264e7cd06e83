use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One exam order within a prescription (lab work, imaging...).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "prescription_exams")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub exam_type: String,
    pub label: String,
    pub instructions: Option<String>,
    pub priority: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
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
}

impl Related<super::prescription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prescription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamStatus {
    Requested,
    AwaitingResults,
    Completed,
    Cancelled,
}

impl ExamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamStatus::Requested => "REQUESTED",
            ExamStatus::AwaitingResults => "AWAITING_RESULTS",
            ExamStatus::Completed => "COMPLETED",
            ExamStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "REQUESTED" => Some(ExamStatus::Requested),
            "AWAITING_RESULTS" => Some(ExamStatus::AwaitingResults),
            "COMPLETED" => Some(ExamStatus::Completed),
            "CANCELLED" => Some(ExamStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExamStatus::Completed | ExamStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamPriority {
    Routine,
    Urgent,
}

impl ExamPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamPriority::Routine => "ROUTINE",
            ExamPriority::Urgent => "URGENT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ROUTINE" => Some(ExamPriority::Routine),
            "URGENT" => Some(ExamPriority::Urgent),
            _ => None,
        }
    }
}
