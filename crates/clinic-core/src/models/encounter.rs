//! Encounter models: a visit linking one patient to one doctor.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::patient::Patient;
use crate::validation::{strip, ValidationErrors};

/// Stored value and display label of every status.
pub const STATUS_CHOICES: &[(&str, &str)] = &[
    ("scheduled", "Scheduled"),
    ("confirmed", "Confirmed"),
    ("seen", "Seen"),
    ("cancelled", "Cancelled"),
];

/// Encounter status.
///
/// A label only: any status may follow any other.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    /// Booked, not yet confirmed
    #[default]
    Scheduled,
    /// Patient confirmed attendance
    Confirmed,
    /// Patient was seen by the doctor
    Seen,
    Cancelled,
}

impl EncounterStatus {
    pub const ALL: [EncounterStatus; 4] = [
        EncounterStatus::Scheduled,
        EncounterStatus::Confirmed,
        EncounterStatus::Seen,
        EncounterStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterStatus::Scheduled => "scheduled",
            EncounterStatus::Confirmed => "confirmed",
            EncounterStatus::Seen => "seen",
            EncounterStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            EncounterStatus::Scheduled => "Scheduled",
            EncounterStatus::Confirmed => "Confirmed",
            EncounterStatus::Seen => "Seen",
            EncounterStatus::Cancelled => "Cancelled",
        }
    }
}

/// A clinical visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Encounter {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    /// When the visit takes place
    pub scheduled_at: DateTime<Utc>,
    /// Short reason for the visit
    pub reason: String,
    /// Free-text notes about the consultation
    pub description: Option<String>,
    pub status: EncounterStatus,
    /// Amount charged, two decimal places
    pub value: Decimal,
    /// Set once on insert
    pub created_at: DateTime<Utc>,
    /// Refreshed on every save
    pub updated_at: DateTime<Utc>,
}

impl Encounter {
    /// e.g. "Maria Lima - 123.456.789-00 - 02/03/2025 14:30"
    pub fn label(&self, patient: &Patient) -> String {
        format!(
            "{} - {}",
            patient.label(),
            self.scheduled_at.format("%d/%m/%Y %H:%M")
        )
    }
}

/// Editable fields of an encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncounterForm {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub description: Option<String>,
    pub status: EncounterStatus,
    pub value: Decimal,
}

impl Default for EncounterForm {
    fn default() -> Self {
        Self {
            patient_id: None,
            doctor_id: None,
            scheduled_at: None,
            reason: String::new(),
            description: None,
            status: EncounterStatus::Scheduled,
            value: Decimal::ZERO,
        }
    }
}

impl EncounterForm {
    /// Copy with surrounding whitespace stripped from text fields.
    pub fn cleaned(&self) -> Self {
        Self {
            reason: strip(&self.reason),
            description: self.description.as_deref().map(strip),
            ..self.clone()
        }
    }

    /// Create a form with the required fields; status and value take their defaults.
    pub fn new(patient_id: i64, doctor_id: i64, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            patient_id: Some(patient_id),
            doctor_id: Some(doctor_id),
            scheduled_at: Some(scheduled_at),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("patient", &self.patient_id);
        errors.require("doctor", &self.doctor_id);
        errors.require("scheduled_at", &self.scheduled_at);
        errors.max_length("reason", &self.reason, 200);
        errors.decimal("value", &self.value, 8, 2);
        errors.into_result()
    }
}

/// Money is stored as integer cents so the column sorts numerically.
pub fn decimal_to_cents(value: &Decimal) -> Option<i64> {
    (value.round_dp(2) * Decimal::ONE_HUNDRED).to_i64()
}

pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
