//! Clinicore API Library
//!
//! Core of a clinic information system: the pharmacy stock ledger
//! (lot-tracked, movement-based) and the consultation triage workflow,
//! joined at the prescription/dispensation boundary. HTTP controllers,
//! authentication and reference-data CRUD live in consuming crates.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::{
    dispensing::DispensingService, prescriptions::PrescriptionService,
    stock_ledger::StockLedgerService, triage::TriageService,
};

/// Composition root handed to embedding controllers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub stock_ledger: StockLedgerService,
    pub dispensing: DispensingService,
    pub triage: TriageService,
    pub prescriptions: PrescriptionService,
}

impl AppState {
    /// Wires every service onto one pool and one event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        Self {
            stock_ledger: StockLedgerService::new(db.clone(), event_sender.clone()),
            dispensing: DispensingService::new(db.clone(), event_sender.clone()),
            triage: TriageService::new(db.clone(), event_sender.clone()),
            prescriptions: PrescriptionService::new(db.clone(), event_sender.clone()),
            db,
            config,
            event_sender,
        }
    }
}
