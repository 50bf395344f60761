//! Exams and exam requests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::validation::{strip, ValidationErrors};

/// A named exam that can be requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exam {
    pub id: i64,
    pub name: String,
    pub description: String,
}

impl Exam {
    pub fn label(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExamForm {
    pub name: String,
    pub description: String,
}

impl ExamForm {
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
            description: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_text("name", &self.name);
        errors.max_length("name", &self.name, 100);
        errors.into_result()
    }
}

/// A request for an exam, tied to the encounter that ordered it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamRequest {
    pub id: i64,
    pub encounter_id: i64,
    pub exam_id: i64,
    /// Whether the exam has been performed
    pub completed: bool,
    pub result: String,
    /// Set once on insert
    pub requested_at: NaiveDate,
}

impl ExamRequest {
    /// e.g. "Blood count for Maria Lima"
    pub fn label(exam_name: &str, patient_name: &str) -> String {
        format!("{} for {}", exam_name, patient_name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExamRequestForm {
    pub exam_id: Option<i64>,
    pub completed: bool,
    pub result: String,
}

impl ExamRequestForm {
    pub fn cleaned(&self) -> Self {
        Self {
            result: strip(&self.result),
            ..self.clone()
        }
    }

    pub fn new(exam_id: i64) -> Self {
        Self {
            exam_id: Some(exam_id),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("exam", &self.exam_id);
        errors.into_result()
    }
}
