//! Prescriptions written during an encounter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::validation::{strip, ValidationErrors};

/// A prescription. The issue date is fixed when the row is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: i64,
    pub encounter_id: i64,
    /// Free-text prescription body
    pub body: String,
    pub issued_on: NaiveDate,
}

impl Prescription {
    pub fn label(&self, patient_name: &str) -> String {
        format!("Prescription #{} - {}", self.id, patient_name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionForm {
    pub body: String,
}

impl PrescriptionForm {
    /// Copy with surrounding whitespace stripped from text fields.
    pub fn cleaned(&self) -> Self {
        Self {
            body: strip(&self.body),
        }
    }

    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_text("body", &self.body);
        errors.into_result()
    }
}
