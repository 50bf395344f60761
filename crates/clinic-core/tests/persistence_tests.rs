//! Records survive closing and reopening a database file.

use chrono::{NaiveDate, TimeZone, Utc};
use clinic_core::config::{ClinicConfig, DatabaseLocation};
use clinic_core::db::Database;
use clinic_core::models::{
    DoctorForm, EncounterForm, EncounterStatus, EntityKind, PatientForm, PrescriptionForm,
    SpecialtyForm,
};
use tempfile::TempDir;

#[test]
fn test_reopen_keeps_records() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("clinic.db");

    let (encounter_id, prescription) = {
        let db = Database::open(&path)?;
        let cardiology = db.insert_specialty(&SpecialtyForm::new("Cardiology"))?;
        let mut doctor = DoctorForm::new("Ana Souza", "CRM-1");
        doctor.specialty_ids = vec![cardiology.id];
        let doctor = db.insert_doctor(&doctor)?;
        let patient = db.insert_patient(&PatientForm::new(
            "Maria Lima",
            "123.456.789-00",
            NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
        ))?;
        let mut form = EncounterForm::new(
            patient.id,
            doctor.id,
            Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap(),
        );
        form.status = EncounterStatus::Confirmed;
        let encounter = db.insert_encounter(&form)?;
        let prescription =
            db.insert_prescription(encounter.id, &PrescriptionForm::new("Aspirin 100mg"))?;
        (encounter.id, prescription)
    };

    let config = ClinicConfig {
        database: DatabaseLocation::File(path.clone()),
        ..ClinicConfig::default()
    };
    let db = Database::open_with_config(&config)?;

    let encounter = db.get_encounter(encounter_id)?.unwrap();
    assert_eq!(encounter.status, EncounterStatus::Confirmed);
    assert_eq!(
        encounter.scheduled_at,
        Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap()
    );
    assert_eq!(db.get_prescription(prescription.id)?, Some(prescription));
    assert_eq!(db.get_doctor(encounter.doctor_id)?.unwrap().specialty_ids.len(), 1);
    assert_eq!(db.count(EntityKind::Patient)?, 1);

    // Foreign keys are a per-connection setting
    let enabled: i64 = db.conn().query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    assert_eq!(enabled, 1);
    Ok(())
}

#[test]
fn test_reopen_is_idempotent_on_schema() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("clinic.db");
    Database::open(&path)?;
    let db = Database::open(&path)?;
    assert_eq!(db.count(EntityKind::Encounter)?, 0);
    Ok(())
}
