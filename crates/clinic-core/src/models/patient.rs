//! Patient models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::validation::{strip, ValidationErrors};

/// A patient record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: i64,
    /// Patient name
    pub name: String,
    /// National identity number, unique per patient
    pub national_id: String,
    pub email: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    pub phone: String,
    /// Insurance plan, cleared when the plan is deleted
    pub insurance_plan_id: Option<i64>,
}

impl Patient {
    /// e.g. "Maria Lima - 123.456.789-00"
    pub fn label(&self) -> String {
        format!("{} - {}", self.name, self.national_id)
    }
}

/// Editable fields of a patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientForm {
    pub name: String,
    pub national_id: String,
    pub email: String,
    pub birth_date: Option<NaiveDate>,
    pub phone: String,
    pub insurance_plan_id: Option<i64>,
}

impl PatientForm {
    /// Copy with surrounding whitespace stripped from text fields.
    pub fn cleaned(&self) -> Self {
        Self {
            name: strip(&self.name),
            national_id: strip(&self.national_id),
            email: strip(&self.email),
            phone: strip(&self.phone),
            ..self.clone()
        }
    }

    /// Create a form with the required fields.
    pub fn new(name: impl Into<String>, national_id: impl Into<String>, birth_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            national_id: national_id.into(),
            birth_date: Some(birth_date),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_text("name", &self.name);
        errors.max_length("name", &self.name, 120);
        errors.require_text("national_id", &self.national_id);
        errors.max_length("national_id", &self.national_id, 14);
        errors.max_length("email", &self.email, 254);
        errors.email("email", &self.email);
        errors.require("birth_date", &self.birth_date);
        errors.max_length("phone", &self.phone, 20);
        errors.into_result()
    }
}
