use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One clinical encounter, from intake to completion.
///
/// `status` holds a `ConsultationStatus` string; `version` is bumped on
/// every update so concurrent writers are detectable beyond the
/// status-guarded compare-and-set.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "consultations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Option<Uuid>,
    pub center_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub motive: Option<String>,
    pub urgency: Option<String>,
    pub anamnesis: Option<String>,
    pub clinical_exam: Option<String>,
    pub diagnosis: Option<String>,
    pub icd10_code: Option<String>,
    pub treatment_plan: Option<String>,
    pub evolution_notes: Option<String>,
    pub status: String,
    pub consultation_type: Option<String>,
    pub appointment_id: Option<Uuid>,
    pub previous_consultation_id: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::prescription::Entity")]
    Prescriptions,
}

impl Related<super::prescription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prescriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Workflow status of a consultation, mirroring physical patient flow
/// through the facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsultationStatus {
    AwaitingVitals,
    AwaitingConsultation,
    InProgress,
    Done,
    Cancelled,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::AwaitingVitals => "AWAITING_VITALS",
            ConsultationStatus::AwaitingConsultation => "AWAITING_CONSULTATION",
            ConsultationStatus::InProgress => "IN_PROGRESS",
            ConsultationStatus::Done => "DONE",
            ConsultationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "AWAITING_VITALS" => Some(ConsultationStatus::AwaitingVitals),
            "AWAITING_CONSULTATION" => Some(ConsultationStatus::AwaitingConsultation),
            "IN_PROGRESS" => Some(ConsultationStatus::InProgress),
            "DONE" => Some(ConsultationStatus::Done),
            "CANCELLED" => Some(ConsultationStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsultationStatus::Done | ConsultationStatus::Cancelled)
    }
}

/// Triage urgency degree. Ordering matters: queues list the most urgent
/// band first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrgencyDegree {
    Critical,
    VeryUrgent,
    Urgent,
    Normal,
}

impl UrgencyDegree {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyDegree::Critical => "CRITICAL",
            UrgencyDegree::VeryUrgent => "VERY_URGENT",
            UrgencyDegree::Urgent => "URGENT",
            UrgencyDegree::Normal => "NORMAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CRITICAL" => Some(UrgencyDegree::Critical),
            "VERY_URGENT" => Some(UrgencyDegree::VeryUrgent),
            "URGENT" => Some(UrgencyDegree::Urgent),
            "NORMAL" => Some(UrgencyDegree::Normal),
            _ => None,
        }
    }

    /// Queue rank: lower sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            UrgencyDegree::Critical => 0,
            UrgencyDegree::VeryUrgent => 1,
            UrgencyDegree::Urgent => 2,
            UrgencyDegree::Normal => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsultationType {
    FirstVisit,
    FollowUp,
    Appointment,
}

impl ConsultationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationType::FirstVisit => "FIRST_VISIT",
            ConsultationType::FollowUp => "FOLLOW_UP",
            ConsultationType::Appointment => "APPOINTMENT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FIRST_VISIT" => Some(ConsultationType::FirstVisit),
            "FOLLOW_UP" => Some(ConsultationType::FollowUp),
            "APPOINTMENT" => Some(ConsultationType::Appointment),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_rank_orders_critical_first() {
        assert!(UrgencyDegree::Critical.rank() < UrgencyDegree::VeryUrgent.rank());
        assert!(UrgencyDegree::VeryUrgent.rank() < UrgencyDegree::Urgent.rank());
        assert!(UrgencyDegree::Urgent.rank() < UrgencyDegree::Normal.rank());
    }

    #[test]
    fn terminal_states() {
        assert!(ConsultationStatus::Done.is_terminal());
        assert!(ConsultationStatus::Cancelled.is_terminal());
        assert!(!ConsultationStatus::InProgress.is_terminal());
    }
}
