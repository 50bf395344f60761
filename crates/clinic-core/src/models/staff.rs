//! Doctors and the specialties they practise.

use serde::{Deserialize, Serialize};

use crate::validation::{strip, ValidationErrors};

/// A medical field of practice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Specialty {
    pub id: i64,
    /// Unique specialty name
    pub name: String,
    pub description: String,
}

impl Specialty {
    pub fn label(&self) -> String {
        self.name.clone()
    }
}

/// Editable fields of a specialty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpecialtyForm {
    pub name: String,
    pub description: String,
}

impl SpecialtyForm {
    /// Copy with surrounding whitespace stripped from text fields.
    pub fn cleaned(&self) -> Self {
        Self {
            name: strip(&self.name),
            description: strip(&self.description),
        }
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_text("name", &self.name);
        errors.max_length("name", &self.name, 100);
        errors.into_result()
    }
}

/// A doctor registered at the clinic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    /// Professional license number, unique per doctor
    pub license_number: String,
    pub email: String,
    /// Specialty IDs, sorted ascending
    pub specialty_ids: Vec<i64>,
}

impl Doctor {
    /// e.g. "Ana Souza (License 12345-SP)"
    pub fn label(&self) -> String {
        format!("{} (License {})", self.name, self.license_number)
    }
}

/// Editable fields of a doctor, including the specialty set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorForm {
    pub name: String,
    pub license_number: String,
    pub email: String,
    pub specialty_ids: Vec<i64>,
}

impl DoctorForm {
    pub fn cleaned(&self) -> Self {
        Self {
            name: strip(&self.name),
            license_number: strip(&self.license_number),
            email: strip(&self.email),
            ..self.clone()
        }
    }

    pub fn new(name: impl Into<String>, license_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            license_number: license_number.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_text("name", &self.name);
        errors.max_length("name", &self.name, 120);
        errors.require_text("license_number", &self.license_number);
        errors.max_length("license_number", &self.license_number, 20);
        errors.max_length("email", &self.email, 254);
        errors.email("email", &self.email);
        errors.into_result()
    }
}
