//! Persistence entities and the closed status vocabularies they carry.
//!
//! Status-like columns are stored as strings but parsed into the enums
//! defined alongside each entity; unrecognized values are rejected at the
//! service boundary.

pub mod consultation;
pub mod dispensation;
pub mod medical_device;
pub mod medicament;
pub mod prescription;
pub mod prescription_exam;
pub mod prescription_line;
pub mod product;
pub mod stock_lot;
pub mod stock_movement;
