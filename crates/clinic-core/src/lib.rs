//! Clinic Records Core Library
//!
//! Local record keeping for a medical practice: specialties, insurance plans,
//! doctors, patients, encounters with their prescriptions and exam requests.
//!
//! # Architecture
//!
//! ```text
//!   Field metadata (models::meta)
//!          │
//!          ├──────────────► SQLite schema, ON DELETE rules
//!          │
//!          ▼
//!   Admin declarations (admin::CLINIC_SITE)
//!          │
//!          ▼
//!   RecordBrowser ──► changelists, list filters, encounter form + inlines
//!          │
//!          ▼
//!   ClinicCore (FFI) ──► host admin UI
//! ```
//!
//! # Core Principle
//!
//! **A delete never leaves a dangling reference.** Dependents are cascaded,
//! cleared, or block the delete, as each relation declares.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer and the generic delete
//! - [`models`]: Domain types, forms and field metadata
//! - [`admin`]: Admin registrations and the record browser
//! - [`config`]: Environment configuration and log setup
//! - [`validation`]: Per-field form errors

pub mod admin;
pub mod config;
pub mod db;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use admin::{AdminError, ChangeList, InlineChange, InlineChanges, ListQuery, RecordBrowser};
pub use config::{ClinicConfig, ConfigError, DatabaseLocation};
pub use db::{Database, DbError, DeletionPlan};
pub use models::{
    Doctor, DoctorForm, Encounter, EncounterForm, EncounterStatus, EntityKind, Exam, ExamForm,
    ExamRequest, ExamRequestForm, InsurancePlan, InsurancePlanForm, Patient, PatientForm,
    Prescription, PrescriptionForm, Specialty, SpecialtyForm,
};
pub use validation::ValidationErrors;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Field errors as JSON, e.g. `{"fields":{"name":["This field is required."]}}`
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Protected: {0}")]
    ProtectedError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ClinicError {
    fn invalid_field(field: &str, message: &str) -> Self {
        ValidationErrors::single(field, message).into()
    }
}

impl From<ValidationErrors> for ClinicError {
    fn from(errors: ValidationErrors) -> Self {
        match serde_json::to_string(&errors) {
            Ok(json) => ClinicError::ValidationError(json),
            Err(_) => ClinicError::ValidationError(errors.to_string()),
        }
    }
}

impl From<DbError> for ClinicError {
    fn from(e: DbError) -> Self {
        if let Some(errors) = e.field_errors() {
            return errors.into();
        }
        match e {
            DbError::NotFound(what) => ClinicError::NotFound(what),
            DbError::Protected { .. } => ClinicError::ProtectedError(e.to_string()),
            other => ClinicError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AdminError> for ClinicError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::Database(e) => e.into(),
            other => ClinicError::InvalidInput(other.to_string()),
        }
    }
}

impl From<ConfigError> for ClinicError {
    fn from(e: ConfigError) -> Self {
        ClinicError::ConfigError(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

fn core_for(db: Database, list_per_page: usize) -> Arc<ClinicCore> {
    Arc::new(ClinicCore {
        db: Arc::new(Mutex::new(db)),
        list_per_page,
    })
}

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicCore>, ClinicError> {
    let db = Database::open(&path)?;
    Ok(core_for(db, config::DEFAULT_LIST_PER_PAGE))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicCore>, ClinicError> {
    let db = Database::open_in_memory()?;
    Ok(core_for(db, config::DEFAULT_LIST_PER_PAGE))
}

/// Open the database named by `CLINIC_DATABASE_PATH` (or `.env`).
#[uniffi::export]
pub fn open_database_from_env() -> Result<Arc<ClinicCore>, ClinicError> {
    let config = ClinicConfig::from_env()?;
    let db = Database::open_with_config(&config)?;
    Ok(core_for(db, config.list_per_page))
}

/// Install log output. `filter` defaults to `CLINIC_LOG`, then `clinic_core=info`.
///
/// Returns `false` if logging was already set up.
#[uniffi::export]
pub fn init_tracing(filter: Option<String>) -> Result<bool, ClinicError> {
    let filter = match filter {
        Some(filter) => filter,
        None => ClinicConfig::from_env()?.log_filter,
    };
    Ok(config::init_tracing(&filter)?)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    db: Arc<Mutex<Database>>,
    list_per_page: usize,
}

impl ClinicCore {
    fn browser<'a>(&self, db: &'a Database) -> RecordBrowser<'a> {
        RecordBrowser::new(db).with_per_page(self.list_per_page)
    }
}

fn parse_entity(entity: &str) -> Result<EntityKind, ClinicError> {
    EntityKind::parse(entity).ok_or_else(|| ClinicError::InvalidInput(format!("unknown entity: {}", entity)))
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Specialty Operations
    // =========================================================================

    /// Create (`id` of `None`) or update a specialty.
    pub fn save_specialty(
        &self,
        id: Option<i64>,
        form: FfiSpecialtyForm,
    ) -> Result<FfiSpecialty, ClinicError> {
        let db = self.db.lock()?;
        let form: SpecialtyForm = form.into();
        let specialty = match id {
            Some(id) => db.update_specialty(id, &form)?,
            None => db.insert_specialty(&form)?,
        };
        Ok(specialty.into())
    }

    /// List specialties by name.
    pub fn list_specialties(&self) -> Result<Vec<FfiSpecialty>, ClinicError> {
        let db = self.db.lock()?;
        let specialties = db.list_specialties()?;
        Ok(specialties.into_iter().map(|s| s.into()).collect())
    }

    // =========================================================================
    // Insurance Plan Operations
    // =========================================================================

    /// Create (`id` of `None`) or update an insurance plan.
    pub fn save_insurance_plan(
        &self,
        id: Option<i64>,
        form: FfiInsurancePlanForm,
    ) -> Result<FfiInsurancePlan, ClinicError> {
        let db = self.db.lock()?;
        let form: InsurancePlanForm = form.into();
        let plan = match id {
            Some(id) => db.update_insurance_plan(id, &form)?,
            None => db.insert_insurance_plan(&form)?,
        };
        Ok(plan.into())
    }

    /// List insurance plans, optionally only active ones.
    pub fn list_insurance_plans(&self, active_only: bool) -> Result<Vec<FfiInsurancePlan>, ClinicError> {
        let db = self.db.lock()?;
        let plans = db.list_insurance_plans(active_only)?;
        Ok(plans.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // Doctor Operations
    // =========================================================================

    /// Create (`id` of `None`) or update a doctor with their specialties.
    pub fn save_doctor(&self, id: Option<i64>, form: FfiDoctorForm) -> Result<FfiDoctor, ClinicError> {
        let db = self.db.lock()?;
        let form: DoctorForm = form.into();
        let doctor = match id {
            Some(id) => db.update_doctor(id, &form)?,
            None => db.insert_doctor(&form)?,
        };
        Ok(doctor.into())
    }

    /// Get a doctor by ID.
    pub fn get_doctor(&self, id: i64) -> Result<Option<FfiDoctor>, ClinicError> {
        let db = self.db.lock()?;
        let doctor = db.get_doctor(id)?;
        Ok(doctor.map(|d| d.into()))
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Create (`id` of `None`) or update a patient.
    pub fn save_patient(&self, id: Option<i64>, form: FfiPatientForm) -> Result<FfiPatient, ClinicError> {
        let db = self.db.lock()?;
        let form = PatientForm::try_from(form)?;
        let patient = match id {
            Some(id) => db.update_patient(id, &form)?,
            None => db.insert_patient(&form)?,
        };
        Ok(patient.into())
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: i64) -> Result<Option<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        let patient = db.get_patient(id)?;
        Ok(patient.map(|p| p.into()))
    }

    /// Search patients by name.
    pub fn search_patients(&self, query: String, limit: u32) -> Result<Vec<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        let patients = db.search_patients(&query, limit as usize)?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // Exam Operations
    // =========================================================================

    /// Create (`id` of `None`) or update an exam.
    pub fn save_exam(&self, id: Option<i64>, form: FfiExamForm) -> Result<FfiExam, ClinicError> {
        let db = self.db.lock()?;
        let form: ExamForm = form.into();
        let exam = match id {
            Some(id) => db.update_exam(id, &form)?,
            None => db.insert_exam(&form)?,
        };
        Ok(exam.into())
    }

    /// List exams by name.
    pub fn list_exams(&self) -> Result<Vec<FfiExam>, ClinicError> {
        let db = self.db.lock()?;
        let exams = db.list_exams()?;
        Ok(exams.into_iter().map(|e| e.into()).collect())
    }

    // =========================================================================
    // Encounter Operations
    // =========================================================================

    /// Save an encounter with its inline prescriptions and exam requests.
    ///
    /// Nothing is saved unless everything is valid.
    pub fn save_encounter(
        &self,
        id: Option<i64>,
        form: FfiEncounterForm,
        inlines: Vec<FfiInlineChange>,
    ) -> Result<FfiEncounter, ClinicError> {
        let db = self.db.lock()?;
        let form = EncounterForm::try_from(form)?;
        let mut changes = InlineChanges::default();
        for change in inlines {
            change.add_to(&mut changes);
        }
        let encounter = self.browser(&db).save_encounter_form(id, &form, &changes)?;
        Ok(encounter.into())
    }

    /// Get an encounter by ID.
    pub fn get_encounter(&self, id: i64) -> Result<Option<FfiEncounter>, ClinicError> {
        let db = self.db.lock()?;
        let encounter = db.get_encounter(id)?;
        Ok(encounter.map(|e| e.into()))
    }

    /// Change an encounter's status. Any status may follow any other.
    pub fn set_encounter_status(&self, id: i64, status: String) -> Result<FfiEncounter, ClinicError> {
        let db = self.db.lock()?;
        let status = EncounterStatus::parse(&status)
            .ok_or_else(|| ClinicError::invalid_field("status", "Select a valid choice."))?;
        let encounter = db.set_encounter_status(id, status)?;
        Ok(encounter.into())
    }

    /// Inline rows of an encounter's form as JSON.
    pub fn inline_rows_json(&self, encounter_id: i64) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let formsets = self.browser(&db).inline_rows(encounter_id)?;
        Ok(serde_json::to_string_pretty(&formsets)?)
    }

    // =========================================================================
    // Admin Browser Operations
    // =========================================================================

    /// One changelist page as JSON. `query_json` is a serialized `ListQuery`;
    /// an empty string means the first unfiltered page.
    pub fn changelist_json(&self, entity: String, query_json: String) -> Result<String, ClinicError> {
        let kind = parse_entity(&entity)?;
        let query: ListQuery = if query_json.trim().is_empty() {
            ListQuery::default()
        } else {
            serde_json::from_str(&query_json)?
        };
        let db = self.db.lock()?;
        let changelist = self.browser(&db).changelist(kind, &query)?;
        Ok(changelist.to_json()?)
    }

    /// Options of one list filter as JSON.
    pub fn filter_choices_json(&self, entity: String, field: String) -> Result<String, ClinicError> {
        let kind = parse_entity(&entity)?;
        let db = self.db.lock()?;
        let choices = self.browser(&db).filter_choices(kind, &field)?;
        Ok(serde_json::to_string_pretty(&choices)?)
    }

    /// The admin registrations as JSON.
    pub fn admin_site_json(&self) -> Result<String, ClinicError> {
        Ok(admin::CLINIC_SITE.to_json()?)
    }

    /// Display label of any record.
    pub fn display_label(&self, entity: String, id: i64) -> Result<String, ClinicError> {
        let kind = parse_entity(&entity)?;
        let db = self.db.lock()?;
        Ok(db.display_label(kind, id)?)
    }

    // =========================================================================
    // Delete Operations
    // =========================================================================

    /// What a delete would cascade to, clear, or be blocked by, as JSON.
    pub fn delete_preview_json(&self, entity: String, id: i64) -> Result<String, ClinicError> {
        let kind = parse_entity(&entity)?;
        let db = self.db.lock()?;
        let plan = db.delete_preview(kind, id)?;
        Ok(serde_json::to_string_pretty(&plan)?)
    }

    /// Delete a record with its dependents.
    pub fn delete_record(&self, entity: String, id: i64) -> Result<FfiDeletionSummary, ClinicError> {
        let kind = parse_entity(&entity)?;
        let db = self.db.lock()?;
        let plan = db.delete_record(kind, id)?;
        Ok(plan.into())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ClinicError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ClinicError::invalid_field(field, "Enter a valid date."))
}

fn parse_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, ClinicError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ClinicError::invalid_field(field, "Enter a valid date/time."))
}

/// FFI-safe specialty.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSpecialty {
    pub id: i64,
    pub name: String,
    pub description: String,
}

impl From<Specialty> for FfiSpecialty {
    fn from(specialty: Specialty) -> Self {
        Self {
            id: specialty.id,
            name: specialty.name,
            description: specialty.description,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSpecialtyForm {
    pub name: String,
    pub description: String,
}

impl From<FfiSpecialtyForm> for SpecialtyForm {
    fn from(form: FfiSpecialtyForm) -> Self {
        SpecialtyForm {
            name: form.name,
            description: form.description,
        }
    }
}

/// FFI-safe insurance plan.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInsurancePlan {
    pub id: i64,
    pub name: String,
    pub tax_id: String,
    pub phone: String,
    pub email: String,
    pub active: bool,
}

impl From<InsurancePlan> for FfiInsurancePlan {
    fn from(plan: InsurancePlan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            tax_id: plan.tax_id,
            phone: plan.phone,
            email: plan.email,
            active: plan.active,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInsurancePlanForm {
    pub name: String,
    pub tax_id: String,
    pub phone: String,
    pub email: String,
    pub active: bool,
}

impl From<FfiInsurancePlanForm> for InsurancePlanForm {
    fn from(form: FfiInsurancePlanForm) -> Self {
        InsurancePlanForm {
            name: form.name,
            tax_id: form.tax_id,
            phone: form.phone,
            email: form.email,
            active: form.active,
        }
    }
}

/// FFI-safe doctor.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDoctor {
    pub id: i64,
    pub name: String,
    pub license_number: String,
    pub email: String,
    pub specialty_ids: Vec<i64>,
}

impl From<Doctor> for FfiDoctor {
    fn from(doctor: Doctor) -> Self {
        Self {
            id: doctor.id,
            name: doctor.name,
            license_number: doctor.license_number,
            email: doctor.email,
            specialty_ids: doctor.specialty_ids,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDoctorForm {
    pub name: String,
    pub license_number: String,
    pub email: String,
    pub specialty_ids: Vec<i64>,
}

impl From<FfiDoctorForm> for DoctorForm {
    fn from(form: FfiDoctorForm) -> Self {
        DoctorForm {
            name: form.name,
            license_number: form.license_number,
            email: form.email,
            specialty_ids: form.specialty_ids,
        }
    }
}

/// FFI-safe patient. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: i64,
    pub name: String,
    pub national_id: String,
    pub email: String,
    pub birth_date: String,
    pub phone: String,
    pub insurance_plan_id: Option<i64>,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            name: patient.name,
            national_id: patient.national_id,
            email: patient.email,
            birth_date: patient.birth_date.to_string(),
            phone: patient.phone,
            insurance_plan_id: patient.insurance_plan_id,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientForm {
    pub name: String,
    pub national_id: String,
    pub email: String,
    pub birth_date: Option<String>,
    pub phone: String,
    pub insurance_plan_id: Option<i64>,
}

impl TryFrom<FfiPatientForm> for PatientForm {
    type Error = ClinicError;

    fn try_from(form: FfiPatientForm) -> Result<Self, Self::Error> {
        let birth_date = match form.birth_date.as_deref() {
            Some(value) if !value.trim().is_empty() => Some(parse_date("birth_date", value)?),
            _ => None,
        };
        Ok(PatientForm {
            name: form.name,
            national_id: form.national_id,
            email: form.email,
            birth_date,
            phone: form.phone,
            insurance_plan_id: form.insurance_plan_id,
        })
    }
}

/// FFI-safe exam.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiExam {
    pub id: i64,
    pub name: String,
    pub description: String,
}

impl From<Exam> for FfiExam {
    fn from(exam: Exam) -> Self {
        Self {
            id: exam.id,
            name: exam.name,
            description: exam.description,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiExamForm {
    pub name: String,
    pub description: String,
}

impl From<FfiExamForm> for ExamForm {
    fn from(form: FfiExamForm) -> Self {
        ExamForm {
            name: form.name,
            description: form.description,
        }
    }
}

/// FFI-safe encounter. Timestamps are RFC 3339, `value` a decimal string.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEncounter {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub scheduled_at: String,
    pub reason: String,
    pub description: Option<String>,
    pub status: String,
    pub value: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Encounter> for FfiEncounter {
    fn from(encounter: Encounter) -> Self {
        Self {
            id: encounter.id,
            patient_id: encounter.patient_id,
            doctor_id: encounter.doctor_id,
            scheduled_at: encounter.scheduled_at.to_rfc3339(),
            reason: encounter.reason,
            description: encounter.description,
            status: encounter.status.as_str().to_string(),
            value: encounter.value.to_string(),
            created_at: encounter.created_at.to_rfc3339(),
            updated_at: encounter.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEncounterForm {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub scheduled_at: Option<String>,
    pub reason: String,
    pub description: Option<String>,
    /// Empty for the default status
    pub status: String,
    /// Empty for the default value
    pub value: String,
}

impl TryFrom<FfiEncounterForm> for EncounterForm {
    type Error = ClinicError;

    fn try_from(form: FfiEncounterForm) -> Result<Self, Self::Error> {
        let mut errors = ValidationErrors::new();

        let scheduled_at = match form.scheduled_at.as_deref() {
            Some(value) if !value.trim().is_empty() => match parse_datetime("scheduled_at", value) {
                Ok(dt) => Some(dt),
                Err(_) => {
                    errors.add("scheduled_at", "Enter a valid date/time.");
                    None
                }
            },
            _ => None,
        };

        let status = match form.status.trim() {
            "" => EncounterStatus::default(),
            value => EncounterStatus::parse(value).unwrap_or_else(|| {
                errors.add("status", "Select a valid choice.");
                EncounterStatus::default()
            }),
        };

        let value = match form.value.trim() {
            "" => Decimal::ZERO,
            value => Decimal::from_str(value).unwrap_or_else(|_| {
                errors.add("value", "Enter a number.");
                Decimal::ZERO
            }),
        };

        errors.into_result()?;
        Ok(EncounterForm {
            patient_id: form.patient_id,
            doctor_id: form.doctor_id,
            scheduled_at,
            reason: form.reason,
            description: form.description,
            status,
            value,
        })
    }
}

/// One inline edit submitted with an encounter.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiInlineChange {
    AddPrescription { body: String },
    ChangePrescription { id: i64, body: String },
    DeletePrescription { id: i64 },
    AddExamRequest { exam_id: Option<i64>, completed: bool, result: String },
    ChangeExamRequest { id: i64, exam_id: Option<i64>, completed: bool, result: String },
    DeleteExamRequest { id: i64 },
}

impl FfiInlineChange {
    fn add_to(self, changes: &mut InlineChanges) {
        let exam_request = |exam_id, completed, result| ExamRequestForm {
            exam_id,
            completed,
            result,
        };
        match self {
            FfiInlineChange::AddPrescription { body } => changes.prescriptions.push(InlineChange::Add {
                form: PrescriptionForm::new(body),
            }),
            FfiInlineChange::ChangePrescription { id, body } => {
                changes.prescriptions.push(InlineChange::Change {
                    id,
                    form: PrescriptionForm::new(body),
                })
            }
            FfiInlineChange::DeletePrescription { id } => {
                changes.prescriptions.push(InlineChange::Delete { id })
            }
            FfiInlineChange::AddExamRequest {
                exam_id,
                completed,
                result,
            } => changes.exam_requests.push(InlineChange::Add {
                form: exam_request(exam_id, completed, result),
            }),
            FfiInlineChange::ChangeExamRequest {
                id,
                exam_id,
                completed,
                result,
            } => changes.exam_requests.push(InlineChange::Change {
                id,
                form: exam_request(exam_id, completed, result),
            }),
            FfiInlineChange::DeleteExamRequest { id } => {
                changes.exam_requests.push(InlineChange::Delete { id })
            }
        }
    }
}

/// FFI-safe summary of a completed delete.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDeletionSummary {
    pub entity: String,
    pub id: i64,
    pub cascaded: u64,
    pub nullified: u64,
    pub unlinked: u64,
}

fn ffi_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl From<DeletionPlan> for FfiDeletionSummary {
    fn from(plan: DeletionPlan) -> Self {
        Self {
            entity: plan.entity.as_str().to_string(),
            id: plan.id,
            cascaded: ffi_count(plan.cascaded.values().map(Vec::len).sum()),
            nullified: ffi_count(plan.nullified.values().map(Vec::len).sum()),
            unlinked: ffi_count(plan.unlinked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient_form(national_id: &str) -> FfiPatientForm {
        FfiPatientForm {
            name: "Maria Lima".into(),
            national_id: national_id.into(),
            email: String::new(),
            birth_date: Some("1990-05-17".into()),
            phone: String::new(),
            insurance_plan_id: None,
        }
    }

    fn encounter_form(patient_id: i64, doctor_id: i64) -> FfiEncounterForm {
        FfiEncounterForm {
            patient_id: Some(patient_id),
            doctor_id: Some(doctor_id),
            scheduled_at: Some("2025-03-02T14:00:00Z".into()),
            reason: "Checkup".into(),
            description: None,
            status: String::new(),
            value: String::new(),
        }
    }

    fn doctor_form() -> FfiDoctorForm {
        FfiDoctorForm {
            name: "Ana Souza".into(),
            license_number: "CRM-1".into(),
            email: String::new(),
            specialty_ids: Vec::new(),
        }
    }

    #[test]
    fn test_encounter_through_ffi() {
        let core = open_database_in_memory().unwrap();
        let patient = core.save_patient(None, patient_form("1")).unwrap();
        let doctor = core.save_doctor(None, doctor_form()).unwrap();

        let encounter = core
            .save_encounter(
                None,
                encounter_form(patient.id, doctor.id),
                vec![FfiInlineChange::AddPrescription { body: "Rest".into() }],
            )
            .unwrap();
        assert_eq!(encounter.status, "scheduled");
        assert_eq!(encounter.value, "0.00");

        let seen = core.set_encounter_status(encounter.id, "seen".into()).unwrap();
        assert_eq!(seen.status, "seen");

        let json = core.changelist_json("encounter".into(), String::new()).unwrap();
        assert!(json.contains("Maria Lima"));
    }

    #[test]
    fn test_errors_mapped() {
        let core = open_database_in_memory().unwrap();
        core.save_patient(None, patient_form("1")).unwrap();

        let duplicate = core.save_patient(None, patient_form("1")).unwrap_err();
        match duplicate {
            ClinicError::ValidationError(json) => assert!(json.contains("national_id")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let mut bad_date = patient_form("2");
        bad_date.birth_date = Some("17/05/1990".into());
        assert!(matches!(
            core.save_patient(None, bad_date),
            Err(ClinicError::ValidationError(_))
        ));

        assert!(matches!(
            core.changelist_json("invoice".into(), String::new()),
            Err(ClinicError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_protected_delete_mapped() {
        let core = open_database_in_memory().unwrap();
        let patient = core.save_patient(None, patient_form("1")).unwrap();
        let doctor = core.save_doctor(None, doctor_form()).unwrap();
        core.save_encounter(None, encounter_form(patient.id, doctor.id), Vec::new())
            .unwrap();

        assert!(matches!(
            core.delete_record("doctor".into(), doctor.id),
            Err(ClinicError::ProtectedError(_))
        ));
        let summary = core.delete_record("patient".into(), patient.id).unwrap();
        assert_eq!(summary.cascaded, 1);
        assert!(core.delete_record("doctor".into(), doctor.id).is_ok());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_summary_counts_not_truncated() {
        let plan = DeletionPlan {
            entity: EntityKind::Specialty,
            id: 1,
            cascaded: Default::default(),
            nullified: Default::default(),
            unlinked: u32::MAX as usize + 5,
            protected: Vec::new(),
        };
        let summary = FfiDeletionSummary::from(plan);
        assert_eq!(summary.unlinked, u64::from(u32::MAX) + 5);
        assert_eq!(summary.cascaded, 0);
    }
}
