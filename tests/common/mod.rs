#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

use clinicore_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        consultation::{ConsultationStatus, UrgencyDegree},
        medicament, medical_device,
    },
    events,
    services::{
        prescriptions::{CreatePrescriptionInput, PrescriptionLineInput},
        triage::{InitIntakeInput, TriageInput},
    },
    AppState,
};

/// Builds an application state over a private in-memory SQLite database.
///
/// A single pooled connection keeps the in-memory database alive and
/// serializes writers, which is what the production Postgres deployment
/// gets from row locks.
pub async fn setup_app() -> AppState {
    let config = AppConfig::new("sqlite::memory:", "test");
    let db_config = DbConfig {
        url: config.database_url.clone(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&db_config)
        .await
        .expect("failed to open test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let (sender, rx) = events::channel(100);
    tokio::spawn(events::process_events(rx));

    AppState::new(Arc::new(pool), config, sender)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub async fn seed_medicament(db: &DatabaseConnection, commercial_name: &str) -> medicament::Model {
    let now = Utc::now();
    medicament::ActiveModel {
        id: Set(Uuid::new_v4()),
        commercial_name: Set(commercial_name.to_string()),
        generic_name: Set(format!("{} generic", commercial_name)),
        dosage: Set("500mg".to_string()),
        pharmaceutical_form: Set("tablet".to_string()),
        category: Set(Some("analgesic".to_string())),
        unit_price: Set(dec!(1.25)),
        sale_unit: Set("box".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("failed to seed medicament")
}

pub async fn seed_device(db: &DatabaseConnection, name: &str) -> medical_device::Model {
    let now = Utc::now();
    medical_device::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        manufacturer_reference: Set(Some("REF-001".to_string())),
        category: Set(Some("consumable".to_string())),
        sale_unit: Set("unit".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("failed to seed medical device")
}

/// Walks a fresh consultation through intake and triage into IN_PROGRESS.
pub async fn consultation_in_progress(
    app: &AppState,
    patient_id: Uuid,
    center_id: Uuid,
    professional_id: Uuid,
) -> Uuid {
    let consultation = app
        .triage
        .init_intake(InitIntakeInput {
            patient_id: Some(patient_id),
            center_id: Some(center_id),
            consultation_type: None,
            appointment_id: None,
            scheduled_at: None,
            motive: Some("headache".to_string()),
        })
        .await
        .expect("intake failed");

    app.triage
        .assign_and_triage(
            consultation.id,
            TriageInput {
                professional_id: Some(professional_id),
                urgency: UrgencyDegree::Normal,
                scheduled_at: None,
                motive: None,
                target_status: None,
            },
        )
        .await
        .expect("triage failed");

    let status = app
        .triage
        .begin_consultation(consultation.id)
        .await
        .expect("begin failed");
    assert_eq!(status, ConsultationStatus::InProgress);

    consultation.id
}

/// Creates a prescription with a single medicament line and returns the
/// line id.
pub async fn prescribe_line(
    app: &AppState,
    consultation_id: Uuid,
    professional_id: Uuid,
    medicament_id: Uuid,
    quantity: i32,
) -> Uuid {
    let detail = app
        .prescriptions
        .create_prescription(CreatePrescriptionInput {
            consultation_id,
            professional_id,
            notes: None,
            lines: vec![PrescriptionLineInput {
                medicament_id,
                quantity,
                posology: "1 tablet three times a day".to_string(),
                duration_days: Some(5),
                notes: None,
            }],
            exams: vec![],
        })
        .await
        .expect("prescription failed");
    detail.lines[0].id
}
