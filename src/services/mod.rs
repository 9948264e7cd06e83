// Core services
pub mod dispensing;
pub mod prescriptions;
pub mod stock_ledger;
pub mod triage;

// Shared lot-selection logic
pub mod allocation;
