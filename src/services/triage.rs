use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::consultation::{self, ConsultationStatus, ConsultationType, UrgencyDegree},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Service owning the consultation lifecycle.
///
/// All status writes go through a compare-and-set on the previous status,
/// so two staff members updating the same consultation cannot silently
/// overwrite each other.
#[derive(Clone)]
pub struct TriageService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

/// Input for patient intake at the front desk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitIntakeInput {
    pub patient_id: Option<Uuid>,
    pub center_id: Option<Uuid>,
    pub consultation_type: Option<ConsultationType>,
    pub appointment_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub motive: Option<String>,
}

/// Input for assigning a professional and urgency to a waiting patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageInput {
    pub professional_id: Option<Uuid>,
    pub urgency: UrgencyDegree,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub motive: Option<String>,
    /// Explicit target status; defaults to AWAITING_CONSULTATION.
    pub target_status: Option<ConsultationStatus>,
}

/// Free-text clinical fields recorded during or at the end of a
/// consultation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalFields {
    pub anamnesis: Option<String>,
    pub clinical_exam: Option<String>,
    pub diagnosis: Option<String>,
    pub icd10_code: Option<String>,
    pub treatment_plan: Option<String>,
    pub evolution_notes: Option<String>,
}

impl ClinicalFields {
    fn is_empty(&self) -> bool {
        self.anamnesis.is_none()
            && self.clinical_exam.is_none()
            && self.diagnosis.is_none()
            && self.icd10_code.is_none()
            && self.treatment_plan.is_none()
            && self.evolution_notes.is_none()
    }
}

/// Validates a status transition. Same-status moves are allowed so client
/// retries after a network failure stay safe.
fn is_valid_transition(from: ConsultationStatus, to: ConsultationStatus) -> bool {
    use ConsultationStatus::*;
    match (from, to) {
        (AwaitingVitals, AwaitingConsultation) => true,
        (AwaitingConsultation, InProgress) => true,
        (InProgress, Done) => true,

        // Administrative cancellation from any non-terminal state
        (AwaitingVitals, Cancelled) => true,
        (AwaitingConsultation, Cancelled) => true,
        (InProgress, Cancelled) => true,

        _ => from == to,
    }
}

/// Orders a queue by urgency band (most urgent first), then scheduled
/// time ascending. Consultations without an urgency rank last within
/// their arrival order.
pub(crate) fn sort_queue(consultations: &mut [consultation::Model]) {
    consultations.sort_by_key(|c| {
        let rank = c
            .urgency
            .as_deref()
            .and_then(UrgencyDegree::from_str)
            .map(|u| u.rank())
            .unwrap_or(u8::MAX);
        (rank, c.scheduled_at)
    });
}

fn parse_status(consultation: &consultation::Model) -> Result<ConsultationStatus, ServiceError> {
    ConsultationStatus::from_str(&consultation.status).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Consultation {} carries unrecognized status '{}'",
            consultation.id, consultation.status
        ))
    })
}

impl TriageService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a consultation at intake, in AWAITING_VITALS.
    #[instrument(skip(self, input))]
    pub async fn init_intake(
        &self,
        input: InitIntakeInput,
    ) -> Result<consultation::Model, ServiceError> {
        let patient_id = input
            .patient_id
            .ok_or(ServiceError::MissingRequiredField("patient_id"))?;
        let center_id = input
            .center_id
            .ok_or(ServiceError::MissingRequiredField("center_id"))?;

        let consultation_type = if input.appointment_id.is_some() {
            Some(ConsultationType::Appointment)
        } else {
            input.consultation_type
        };

        let now = Utc::now();
        let model = consultation::ActiveModel {
            id: Set(Uuid::new_v4()),
            patient_id: Set(patient_id),
            professional_id: Set(None),
            center_id: Set(center_id),
            scheduled_at: Set(input.scheduled_at.unwrap_or(now)),
            motive: Set(input.motive),
            urgency: Set(None),
            anamnesis: Set(None),
            clinical_exam: Set(None),
            diagnosis: Set(None),
            icd10_code: Set(None),
            treatment_plan: Set(None),
            evolution_notes: Set(None),
            status: Set(ConsultationStatus::AwaitingVitals.as_str().to_string()),
            consultation_type: Set(consultation_type.map(|t| t.as_str().to_string())),
            appointment_id: Set(input.appointment_id),
            previous_consultation_id: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        info!(consultation_id = %created.id, "consultation created at intake");

        if let Err(e) = self
            .event_sender
            .send(Event::ConsultationCreated {
                consultation_id: created.id,
                patient_id,
                center_id,
            })
            .await
        {
            warn!("failed to publish consultation creation event: {}", e);
        }

        Ok(created)
    }

    /// Assigns a professional, urgency and schedule to a waiting patient
    /// and moves the consultation forward (AWAITING_CONSULTATION unless an
    /// explicit target status is supplied).
    #[instrument(skip(self, input), fields(consultation_id = %consultation_id))]
    pub async fn assign_and_triage(
        &self,
        consultation_id: Uuid,
        input: TriageInput,
    ) -> Result<ConsultationStatus, ServiceError> {
        let professional_id = input
            .professional_id
            .ok_or(ServiceError::MissingRequiredField("professional_id"))?;
        let target = input
            .target_status
            .unwrap_or(ConsultationStatus::AwaitingConsultation);

        let (old_status, new_status) = self
            .db
            .transaction::<_, (ConsultationStatus, ConsultationStatus), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let current = consultation::Entity::find_by_id(consultation_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Consultation {} not found",
                                    consultation_id
                                ))
                            })?;
                        let from = parse_status(&current)?;

                        if !is_valid_transition(from, target) {
                            return Err(ServiceError::InvalidTransition {
                                from: from.as_str().to_string(),
                                to: target.as_str().to_string(),
                            });
                        }

                        let mut update = consultation::Entity::update_many()
                            .col_expr(
                                consultation::Column::ProfessionalId,
                                Expr::value(professional_id),
                            )
                            .col_expr(
                                consultation::Column::Urgency,
                                Expr::value(input.urgency.as_str()),
                            )
                            .col_expr(
                                consultation::Column::Status,
                                Expr::value(target.as_str()),
                            )
                            .col_expr(
                                consultation::Column::Version,
                                Expr::col(consultation::Column::Version).add(1),
                            )
                            .col_expr(consultation::Column::UpdatedAt, Expr::value(Utc::now()));
                        if let Some(scheduled_at) = input.scheduled_at {
                            update = update.col_expr(
                                consultation::Column::ScheduledAt,
                                Expr::value(scheduled_at),
                            );
                        }
                        if let Some(motive) = input.motive.clone() {
                            update =
                                update.col_expr(consultation::Column::Motive, Expr::value(motive));
                        }

                        let result = update
                            .filter(consultation::Column::Id.eq(consultation_id))
                            .filter(consultation::Column::Status.eq(from.as_str()))
                            .exec(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        if result.rows_affected == 0 {
                            return Err(ServiceError::ConcurrentModification(consultation_id));
                        }

                        Ok((from, target))
                    })
                },
            )
            .await?;

        self.publish_status_change(consultation_id, old_status, new_status)
            .await;

        Ok(new_status)
    }

    /// Generic guarded transition. Same-status calls are no-op successes;
    /// illegal moves fail with `InvalidTransition` and are never coerced.
    #[instrument(skip(self, fields), fields(consultation_id = %consultation_id, target = target.as_str()))]
    pub async fn transition_consultation(
        &self,
        consultation_id: Uuid,
        target: ConsultationStatus,
        fields: Option<ClinicalFields>,
    ) -> Result<ConsultationStatus, ServiceError> {
        let outcome = self
            .db
            .transaction::<_, Option<ConsultationStatus>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = consultation::Entity::find_by_id(consultation_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Consultation {} not found",
                                consultation_id
                            ))
                        })?;
                    let from = parse_status(&current)?;

                    if from == target {
                        // Retry of an already-applied transition.
                        return Ok(None);
                    }

                    if !is_valid_transition(from, target) {
                        return Err(ServiceError::InvalidTransition {
                            from: from.as_str().to_string(),
                            to: target.as_str().to_string(),
                        });
                    }

                    let mut update = consultation::Entity::update_many()
                        .col_expr(consultation::Column::Status, Expr::value(target.as_str()))
                        .col_expr(
                            consultation::Column::Version,
                            Expr::col(consultation::Column::Version).add(1),
                        )
                        .col_expr(consultation::Column::UpdatedAt, Expr::value(Utc::now()));

                    if let Some(fields) = fields.as_ref().filter(|f| !f.is_empty()) {
                        if let Some(v) = fields.anamnesis.clone() {
                            update = update
                                .col_expr(consultation::Column::Anamnesis, Expr::value(v));
                        }
                        if let Some(v) = fields.clinical_exam.clone() {
                            update = update
                                .col_expr(consultation::Column::ClinicalExam, Expr::value(v));
                        }
                        if let Some(v) = fields.diagnosis.clone() {
                            update = update
                                .col_expr(consultation::Column::Diagnosis, Expr::value(v));
                        }
                        if let Some(v) = fields.icd10_code.clone() {
                            update = update
                                .col_expr(consultation::Column::Icd10Code, Expr::value(v));
                        }
                        if let Some(v) = fields.treatment_plan.clone() {
                            update = update
                                .col_expr(consultation::Column::TreatmentPlan, Expr::value(v));
                        }
                        if let Some(v) = fields.evolution_notes.clone() {
                            update = update
                                .col_expr(consultation::Column::EvolutionNotes, Expr::value(v));
                        }
                    }

                    let result = update
                        .filter(consultation::Column::Id.eq(consultation_id))
                        .filter(consultation::Column::Status.eq(from.as_str()))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(consultation_id));
                    }

                    Ok(Some(from))
                })
            })
            .await?;

        if let Some(old_status) = outcome {
            self.publish_status_change(consultation_id, old_status, target)
                .await;
        }

        Ok(target)
    }

    /// Clinician starts the encounter. Only valid from
    /// AWAITING_CONSULTATION.
    pub async fn begin_consultation(
        &self,
        consultation_id: Uuid,
    ) -> Result<ConsultationStatus, ServiceError> {
        self.transition_consultation(consultation_id, ConsultationStatus::InProgress, None)
            .await
    }

    /// Clinician closes the encounter, recording the clinical fields.
    /// Only valid from IN_PROGRESS.
    pub async fn complete_consultation(
        &self,
        consultation_id: Uuid,
        fields: ClinicalFields,
    ) -> Result<ConsultationStatus, ServiceError> {
        self.transition_consultation(consultation_id, ConsultationStatus::Done, Some(fields))
            .await
    }

    /// Administrative cancellation from any non-terminal state.
    pub async fn cancel_consultation(
        &self,
        consultation_id: Uuid,
        reason: Option<String>,
    ) -> Result<ConsultationStatus, ServiceError> {
        let fields = reason.map(|r| ClinicalFields {
            evolution_notes: Some(r),
            ..Default::default()
        });
        self.transition_consultation(consultation_id, ConsultationStatus::Cancelled, fields)
            .await
    }

    /// Status query consumed by dependents (prescription gating).
    pub async fn get_status(
        &self,
        consultation_id: Uuid,
    ) -> Result<ConsultationStatus, ServiceError> {
        let consultation = self.get_consultation(consultation_id).await?;
        parse_status(&consultation)
    }

    pub async fn get_consultation(
        &self,
        consultation_id: Uuid,
    ) -> Result<consultation::Model, ServiceError> {
        consultation::Entity::find_by_id(consultation_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Consultation {} not found", consultation_id))
            })
    }

    /// Intake queue: patients waiting for vitals capture.
    #[instrument(skip(self))]
    pub async fn waiting_for_vitals(
        &self,
        center_id: Option<Uuid>,
    ) -> Result<Vec<consultation::Model>, ServiceError> {
        self.queue(ConsultationStatus::AwaitingVitals, center_id, None)
            .await
    }

    /// Waiting room queue: triaged patients awaiting their clinician.
    #[instrument(skip(self))]
    pub async fn waiting_for_consultation(
        &self,
        professional_id: Option<Uuid>,
    ) -> Result<Vec<consultation::Model>, ServiceError> {
        self.queue(
            ConsultationStatus::AwaitingConsultation,
            None,
            professional_id,
        )
        .await
    }

    async fn queue(
        &self,
        status: ConsultationStatus,
        center_id: Option<Uuid>,
        professional_id: Option<Uuid>,
    ) -> Result<Vec<consultation::Model>, ServiceError> {
        let mut query = consultation::Entity::find()
            .filter(consultation::Column::Status.eq(status.as_str()));
        if let Some(center) = center_id {
            query = query.filter(consultation::Column::CenterId.eq(center));
        }
        if let Some(professional) = professional_id {
            query = query.filter(consultation::Column::ProfessionalId.eq(professional));
        }

        let mut consultations = query
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        sort_queue(&mut consultations);
        Ok(consultations)
    }

    /// Links a consultation to the patient's previous encounter.
    #[instrument(skip(self), fields(consultation_id = %consultation_id, previous_id = %previous_id))]
    pub async fn link_previous_consultation(
        &self,
        consultation_id: Uuid,
        previous_id: Uuid,
    ) -> Result<(), ServiceError> {
        if consultation_id == previous_id {
            return Err(ServiceError::ValidationError(
                "A consultation cannot reference itself as its predecessor".to_string(),
            ));
        }

        let consultation = self.get_consultation(consultation_id).await?;
        let previous = self.get_consultation(previous_id).await?;
        if consultation.patient_id != previous.patient_id {
            return Err(ServiceError::ValidationError(
                "Linked consultations must belong to the same patient".to_string(),
            ));
        }

        let mut active: consultation::ActiveModel = consultation.into();
        active.previous_consultation_id = Set(Some(previous_id));
        active.consultation_type = Set(Some(ConsultationType::FollowUp.as_str().to_string()));
        active.updated_at = Set(Utc::now());
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(())
    }

    /// Reclassifies a consultation as a follow-up visit without linking a
    /// predecessor.
    pub async fn mark_follow_up(&self, consultation_id: Uuid) -> Result<(), ServiceError> {
        let consultation = self.get_consultation(consultation_id).await?;

        let mut active: consultation::ActiveModel = consultation.into();
        active.consultation_type = Set(Some(ConsultationType::FollowUp.as_str().to_string()));
        active.updated_at = Set(Utc::now());
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(())
    }

    async fn publish_status_change(
        &self,
        consultation_id: Uuid,
        old_status: ConsultationStatus,
        new_status: ConsultationStatus,
    ) {
        info!(
            consultation_id = %consultation_id,
            from = old_status.as_str(),
            to = new_status.as_str(),
            "consultation status changed"
        );
        if let Err(e) = self
            .event_sender
            .send(Event::ConsultationStatusChanged {
                consultation_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await
        {
            warn!("failed to publish status change event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConsultationStatus::*;

    #[test]
    fn forward_path_is_ordered() {
        assert!(is_valid_transition(AwaitingVitals, AwaitingConsultation));
        assert!(is_valid_transition(AwaitingConsultation, InProgress));
        assert!(is_valid_transition(InProgress, Done));

        assert!(!is_valid_transition(AwaitingVitals, InProgress));
        assert!(!is_valid_transition(AwaitingVitals, Done));
        assert!(!is_valid_transition(Done, InProgress));
    }

    #[test]
    fn cancellation_from_non_terminal_only() {
        assert!(is_valid_transition(AwaitingVitals, Cancelled));
        assert!(is_valid_transition(AwaitingConsultation, Cancelled));
        assert!(is_valid_transition(InProgress, Cancelled));
        assert!(!is_valid_transition(Done, Cancelled));
    }

    #[test]
    fn same_status_is_allowed_for_retries() {
        assert!(is_valid_transition(InProgress, InProgress));
        assert!(is_valid_transition(Done, Done));
    }
}
