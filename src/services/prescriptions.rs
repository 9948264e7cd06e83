use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        consultation::{self, ConsultationStatus},
        medicament,
        prescription::{self, PrescriptionStatus},
        prescription_exam::{self, ExamPriority, ExamStatus},
        prescription_line::{self, LineStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Service owning prescriptions and their exam orders.
///
/// Creation is gated on the owning consultation being IN_PROGRESS — the
/// ordering guarantee the triage state machine publishes — and writes the
/// header with all lines and exams in one transaction.
#[derive(Clone)]
pub struct PrescriptionService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PrescriptionLineInput {
    pub medicament_id: Uuid,
    pub quantity: i32,
    #[validate(length(min = 1, max = 512))]
    pub posology: String,
    pub duration_days: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PrescriptionExamInput {
    #[validate(length(min = 1, max = 128))]
    pub exam_type: String,
    #[validate(length(min = 1, max = 256))]
    pub label: String,
    pub instructions: Option<String>,
    pub priority: Option<ExamPriority>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePrescriptionInput {
    pub consultation_id: Uuid,
    pub professional_id: Uuid,
    pub notes: Option<String>,
    #[validate]
    pub lines: Vec<PrescriptionLineInput>,
    #[validate]
    pub exams: Vec<PrescriptionExamInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionDetail {
    pub prescription: prescription::Model,
    pub lines: Vec<prescription_line::Model>,
    pub exams: Vec<prescription_exam::Model>,
}

/// Exam workflow transitions. Same-status moves are retry-safe no-ops.
fn is_valid_exam_transition(from: ExamStatus, to: ExamStatus) -> bool {
    use ExamStatus::*;
    match (from, to) {
        (Requested, AwaitingResults) => true,
        (Requested, Completed) => true,
        (AwaitingResults, Completed) => true,
        (Requested, Cancelled) => true,
        (AwaitingResults, Cancelled) => true,
        _ => from == to,
    }
}

impl PrescriptionService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a prescription with its lines and exam orders.
    ///
    /// Rejected with `InvalidTransition` unless the owning consultation is
    /// IN_PROGRESS. All rows are inserted atomically: a prescription is
    /// never visible in storage with only part of its lines.
    #[instrument(skip(self, input), fields(consultation_id = %input.consultation_id))]
    pub async fn create_prescription(
        &self,
        input: CreatePrescriptionInput,
    ) -> Result<PrescriptionDetail, ServiceError> {
        input.validate()?;

        if input.lines.is_empty() && input.exams.is_empty() {
            return Err(ServiceError::ValidationError(
                "A prescription needs at least one medicament line or exam order".to_string(),
            ));
        }
        if let Some(bad) = input.lines.iter().find(|l| l.quantity <= 0) {
            return Err(ServiceError::InvalidQuantity(bad.quantity));
        }

        let detail = self
            .db
            .transaction::<_, PrescriptionDetail, ServiceError>(move |txn| {
                Box::pin(async move {
                    let consultation =
                        consultation::Entity::find_by_id(input.consultation_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Consultation {} not found",
                                    input.consultation_id
                                ))
                            })?;

                    let status =
                        ConsultationStatus::from_str(&consultation.status).ok_or_else(|| {
                            ServiceError::ValidationError(format!(
                                "Consultation {} carries unrecognized status '{}'",
                                consultation.id, consultation.status
                            ))
                        })?;
                    if status != ConsultationStatus::InProgress {
                        return Err(ServiceError::InvalidTransition {
                            from: status.as_str().to_string(),
                            to: ConsultationStatus::InProgress.as_str().to_string(),
                        });
                    }

                    for line in &input.lines {
                        let exists = medicament::Entity::find_by_id(line.medicament_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .is_some();
                        if !exists {
                            return Err(ServiceError::InvalidProductReference(format!(
                                "MEDICAMENT {} does not exist",
                                line.medicament_id
                            )));
                        }
                    }

                    let now = Utc::now();
                    let header = prescription::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        consultation_id: Set(input.consultation_id),
                        professional_id: Set(input.professional_id),
                        status: Set(PrescriptionStatus::Active.as_str().to_string()),
                        notes: Set(input.notes.clone()),
                        prescribed_at: Set(now),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    let header = header.insert(txn).await.map_err(ServiceError::db_error)?;

                    let mut lines = Vec::with_capacity(input.lines.len());
                    for line in &input.lines {
                        let model = prescription_line::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            prescription_id: Set(header.id),
                            medicament_id: Set(line.medicament_id),
                            quantity_prescribed: Set(line.quantity),
                            posology: Set(line.posology.clone()),
                            duration_days: Set(line.duration_days),
                            status: Set(LineStatus::Prescribed.as_str().to_string()),
                            notes: Set(line.notes.clone()),
                            created_at: Set(now),
                            updated_at: Set(now),
                        };
                        lines.push(model.insert(txn).await.map_err(ServiceError::db_error)?);
                    }

                    let mut exams = Vec::with_capacity(input.exams.len());
                    for exam in &input.exams {
                        let model = prescription_exam::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            prescription_id: Set(header.id),
                            exam_type: Set(exam.exam_type.clone()),
                            label: Set(exam.label.clone()),
                            instructions: Set(exam.instructions.clone()),
                            priority: Set(exam
                                .priority
                                .unwrap_or(ExamPriority::Routine)
                                .as_str()
                                .to_string()),
                            status: Set(ExamStatus::Requested.as_str().to_string()),
                            requested_at: Set(now),
                            created_at: Set(now),
                            updated_at: Set(now),
                        };
                        exams.push(model.insert(txn).await.map_err(ServiceError::db_error)?);
                    }

                    Ok(PrescriptionDetail {
                        prescription: header,
                        lines,
                        exams,
                    })
                })
            })
            .await?;

        info!(
            prescription_id = %detail.prescription.id,
            lines = detail.lines.len(),
            exams = detail.exams.len(),
            "prescription created"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::PrescriptionCreated {
                prescription_id: detail.prescription.id,
                consultation_id: detail.prescription.consultation_id,
                line_count: detail.lines.len(),
                exam_count: detail.exams.len(),
            })
            .await
        {
            warn!("failed to publish prescription creation event: {}", e);
        }

        Ok(detail)
    }

    /// Moves an exam order through its workflow with a compare-and-set on
    /// the previous status.
    #[instrument(skip(self), fields(exam_id = %exam_id, target = target.as_str()))]
    pub async fn update_exam_status(
        &self,
        exam_id: Uuid,
        target: ExamStatus,
    ) -> Result<ExamStatus, ServiceError> {
        let outcome = self
            .db
            .transaction::<_, Option<ExamStatus>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let exam = prescription_exam::Entity::find_by_id(exam_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Exam order {} not found", exam_id))
                        })?;

                    let from = ExamStatus::from_str(&exam.status).ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "Exam order {} carries unrecognized status '{}'",
                            exam.id, exam.status
                        ))
                    })?;

                    if from == target {
                        return Ok(None);
                    }

                    if !is_valid_exam_transition(from, target) {
                        return Err(ServiceError::InvalidTransition {
                            from: from.as_str().to_string(),
                            to: target.as_str().to_string(),
                        });
                    }

                    let result = prescription_exam::Entity::update_many()
                        .col_expr(
                            prescription_exam::Column::Status,
                            Expr::value(target.as_str()),
                        )
                        .col_expr(
                            prescription_exam::Column::UpdatedAt,
                            Expr::value(Utc::now()),
                        )
                        .filter(prescription_exam::Column::Id.eq(exam_id))
                        .filter(prescription_exam::Column::Status.eq(from.as_str()))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(exam_id));
                    }

                    Ok(Some(from))
                })
            })
            .await?;

        if let Some(from) = outcome {
            if let Err(e) = self
                .event_sender
                .send(Event::ExamStatusChanged {
                    exam_id,
                    old_status: from.as_str().to_string(),
                    new_status: target.as_str().to_string(),
                })
                .await
            {
                warn!("failed to publish exam status event: {}", e);
            }
        }

        Ok(target)
    }

    /// Prescription header with its lines and exam orders.
    pub async fn get_prescription(
        &self,
        prescription_id: Uuid,
    ) -> Result<PrescriptionDetail, ServiceError> {
        let db = self.db.as_ref();

        let header = prescription::Entity::find_by_id(prescription_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Prescription {} not found", prescription_id))
            })?;

        let lines = prescription_line::Entity::find()
            .filter(prescription_line::Column::PrescriptionId.eq(prescription_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let exams = prescription_exam::Entity::find()
            .filter(prescription_exam::Column::PrescriptionId.eq(prescription_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(PrescriptionDetail {
            prescription: header,
            lines,
            exams,
        })
    }

    /// Lines still awaiting the pharmacy for one patient.
    #[instrument(skip(self), fields(patient_id = %patient_id))]
    pub async fn pending_lines_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<prescription_line::Model>, ServiceError> {
        let db = self.db.as_ref();

        let consultation_ids: Vec<Uuid> = consultation::Entity::find()
            .filter(consultation::Column::PatientId.eq(patient_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if consultation_ids.is_empty() {
            return Ok(Vec::new());
        }

        let prescription_ids: Vec<Uuid> = prescription::Entity::find()
            .filter(prescription::Column::ConsultationId.is_in(consultation_ids))
            .filter(prescription::Column::Status.eq(PrescriptionStatus::Active.as_str()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if prescription_ids.is_empty() {
            return Ok(Vec::new());
        }

        prescription_line::Entity::find()
            .filter(prescription_line::Column::PrescriptionId.is_in(prescription_ids))
            .filter(prescription_line::Column::Status.is_in([
                LineStatus::Prescribed.as_str(),
                LineStatus::PartiallyDispensed.as_str(),
            ]))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Flips an active prescription to COMPLETED once every line is fully
    /// dispensed. Returns whether the header changed.
    #[instrument(skip(self), fields(prescription_id = %prescription_id))]
    pub async fn complete_if_fulfilled(
        &self,
        prescription_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let completed = self
            .db
            .transaction::<_, bool, ServiceError>(move |txn| {
                Box::pin(async move {
                    let header = prescription::Entity::find_by_id(prescription_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Prescription {} not found",
                                prescription_id
                            ))
                        })?;

                    if PrescriptionStatus::from_str(&header.status)
                        != Some(PrescriptionStatus::Active)
                    {
                        return Ok(false);
                    }

                    let lines = prescription_line::Entity::find()
                        .filter(prescription_line::Column::PrescriptionId.eq(prescription_id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let all_dispensed = !lines.is_empty()
                        && lines
                            .iter()
                            .all(|l| l.status == LineStatus::Dispensed.as_str());
                    if !all_dispensed {
                        return Ok(false);
                    }

                    let result = prescription::Entity::update_many()
                        .col_expr(
                            prescription::Column::Status,
                            Expr::value(PrescriptionStatus::Completed.as_str()),
                        )
                        .col_expr(prescription::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(prescription::Column::Id.eq(prescription_id))
                        .filter(
                            prescription::Column::Status
                                .eq(PrescriptionStatus::Active.as_str()),
                        )
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(prescription_id));
                    }

                    Ok(true)
                })
            })
            .await?;

        if completed {
            if let Err(e) = self
                .event_sender
                .send(Event::PrescriptionCompleted { prescription_id })
                .await
            {
                warn!("failed to publish prescription completion event: {}", e);
            }
        }

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExamStatus::*;

    #[test]
    fn exam_workflow_transitions() {
        assert!(is_valid_exam_transition(Requested, AwaitingResults));
        assert!(is_valid_exam_transition(AwaitingResults, Completed));
        assert!(is_valid_exam_transition(Requested, Completed));
        assert!(is_valid_exam_transition(Requested, Cancelled));

        assert!(!is_valid_exam_transition(Completed, Requested));
        assert!(!is_valid_exam_transition(Completed, Cancelled));
        assert!(!is_valid_exam_transition(Cancelled, AwaitingResults));
    }

    #[test]
    fn same_exam_status_is_retry_safe() {
        assert!(is_valid_exam_transition(Completed, Completed));
        assert!(is_valid_exam_transition(Requested, Requested));
    }
}
