//! Delete rules across entities: cascade, set-null and protect.

use chrono::{NaiveDate, TimeZone, Utc};
use clinic_core::db::{Database, DbError};
use clinic_core::models::{
    DoctorForm, EncounterForm, EntityKind, ExamForm, ExamRequestForm, InsurancePlanForm,
    PatientForm, PrescriptionForm, SpecialtyForm,
};
use proptest::prelude::*;

struct Clinic {
    db: Database,
    patient_id: i64,
    doctor_id: i64,
    exam_id: i64,
}

fn setup_clinic() -> anyhow::Result<Clinic> {
    let db = Database::open_in_memory()?;
    let patient = db.insert_patient(&PatientForm::new(
        "Maria Lima",
        "123.456.789-00",
        NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
    ))?;
    let doctor = db.insert_doctor(&DoctorForm::new("Ana Souza", "CRM-1"))?;
    let exam = db.insert_exam(&ExamForm::new("Blood count"))?;
    Ok(Clinic {
        db,
        patient_id: patient.id,
        doctor_id: doctor.id,
        exam_id: exam.id,
    })
}

/// Add an encounter with `children` prescriptions and as many exam requests.
fn add_encounter(clinic: &Clinic, day: u32, children: usize) -> anyhow::Result<i64> {
    let scheduled_at = Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap();
    let encounter = clinic.db.insert_encounter(&EncounterForm::new(
        clinic.patient_id,
        clinic.doctor_id,
        scheduled_at,
    ))?;
    for i in 0..children {
        clinic
            .db
            .insert_prescription(encounter.id, &PrescriptionForm::new(format!("Item {}", i)))?;
        clinic
            .db
            .insert_exam_request(encounter.id, &ExamRequestForm::new(clinic.exam_id))?;
    }
    Ok(encounter.id)
}

#[test]
fn test_delete_patient_cascades() -> anyhow::Result<()> {
    let clinic = setup_clinic()?;
    add_encounter(&clinic, 1, 2)?;
    add_encounter(&clinic, 2, 1)?;

    let preview = clinic.db.delete_preview(EntityKind::Patient, clinic.patient_id)?;
    assert!(!preview.is_blocked());
    assert_eq!(preview.cascaded_count(EntityKind::Encounter), 2);
    assert_eq!(preview.cascaded_count(EntityKind::Prescription), 3);
    assert_eq!(preview.cascaded_count(EntityKind::ExamRequest), 3);

    clinic.db.delete_patient(clinic.patient_id)?;

    assert_eq!(clinic.db.count(EntityKind::Patient)?, 0);
    assert_eq!(clinic.db.count(EntityKind::Encounter)?, 0);
    assert_eq!(clinic.db.count(EntityKind::Prescription)?, 0);
    assert_eq!(clinic.db.count(EntityKind::ExamRequest)?, 0);
    // Neither side of a protected relation is touched
    assert_eq!(clinic.db.count(EntityKind::Doctor)?, 1);
    assert_eq!(clinic.db.count(EntityKind::Exam)?, 1);
    Ok(())
}

#[test]
fn test_delete_referenced_doctor_rejected() -> anyhow::Result<()> {
    let clinic = setup_clinic()?;
    let first = add_encounter(&clinic, 1, 1)?;
    let second = add_encounter(&clinic, 2, 0)?;

    let err = clinic.db.delete_doctor(clinic.doctor_id).unwrap_err();
    match &err {
        DbError::Protected {
            entity, references, ..
        } => {
            assert_eq!(*entity, EntityKind::Doctor);
            assert_eq!(references.len(), 1);
            assert_eq!(references[0].entity, EntityKind::Encounter);
            assert_eq!(references[0].field, "doctor");
            assert_eq!(references[0].ids, vec![first, second]);
        }
        other => panic!("expected protected error, got {:?}", other),
    }
    assert!(err.to_string().contains("2 encounters (via doctor)"));

    // Nothing changed
    assert!(clinic.db.get_doctor(clinic.doctor_id)?.is_some());
    assert_eq!(clinic.db.count(EntityKind::Encounter)?, 2);
    assert_eq!(clinic.db.count(EntityKind::Prescription)?, 1);
    Ok(())
}

#[test]
fn test_schema_restricts_doctor_delete_too() -> anyhow::Result<()> {
    let clinic = setup_clinic()?;
    add_encounter(&clinic, 1, 0)?;

    let err: DbError = clinic
        .db
        .conn()
        .execute("DELETE FROM doctors WHERE id = ?", [clinic.doctor_id])
        .unwrap_err()
        .into();
    assert!(matches!(err, DbError::Constraint(_)));
    assert_eq!(clinic.db.count(EntityKind::Doctor)?, 1);
    Ok(())
}

#[test]
fn test_delete_insurance_plan_clears_patients() -> anyhow::Result<()> {
    let clinic = setup_clinic()?;
    let plan = clinic
        .db
        .insert_insurance_plan(&InsurancePlanForm::new("Unimed", "12.345.678/0001-90"))?;
    let mut form = PatientForm::new(
        "João Pereira",
        "987.654.321-00",
        NaiveDate::from_ymd_opt(1984, 1, 2).unwrap(),
    );
    form.insurance_plan_id = Some(plan.id);
    let insured = clinic.db.insert_patient(&form)?;
    assert_eq!(insured.insurance_plan_id, Some(plan.id));

    let plan_deleted = clinic.db.delete_record(EntityKind::InsurancePlan, plan.id)?;
    assert_eq!(plan_deleted.nullified_count(EntityKind::Patient), 1);

    let patient = clinic.db.get_patient(insured.id)?.unwrap();
    assert_eq!(patient.insurance_plan_id, None);
    assert_eq!(clinic.db.count(EntityKind::Patient)?, 2);
    assert_eq!(clinic.db.count(EntityKind::InsurancePlan)?, 0);
    Ok(())
}

#[test]
fn test_exam_protected_until_requests_go() -> anyhow::Result<()> {
    let clinic = setup_clinic()?;
    let encounter_id = add_encounter(&clinic, 1, 2)?;

    let err = clinic.db.delete_exam(clinic.exam_id).unwrap_err();
    assert!(matches!(err, DbError::Protected { entity: EntityKind::Exam, .. }));
    assert_eq!(clinic.db.count(EntityKind::ExamRequest)?, 2);

    let plan = clinic.db.delete_record(EntityKind::Encounter, encounter_id)?;
    assert_eq!(plan.cascaded_count(EntityKind::Prescription), 2);
    assert_eq!(plan.cascaded_count(EntityKind::ExamRequest), 2);
    assert_eq!(clinic.db.count(EntityKind::ExamRequest)?, 0);

    clinic.db.delete_exam(clinic.exam_id)?;
    assert_eq!(clinic.db.count(EntityKind::Exam)?, 0);
    Ok(())
}

#[test]
fn test_specialty_links_removed_from_either_side() -> anyhow::Result<()> {
    let clinic = setup_clinic()?;
    let cardiology = clinic.db.insert_specialty(&SpecialtyForm::new("Cardiology"))?;
    let pediatrics = clinic.db.insert_specialty(&SpecialtyForm::new("Pediatrics"))?;
    let mut form = DoctorForm::new("Bruno Costa", "CRM-2");
    form.specialty_ids = vec![cardiology.id, pediatrics.id];
    let doctor = clinic.db.insert_doctor(&form)?;

    let plan = clinic.db.delete_record(EntityKind::Specialty, cardiology.id)?;
    assert_eq!(plan.unlinked, 1);
    let doctor_after = clinic.db.get_doctor(doctor.id)?.unwrap();
    assert_eq!(doctor_after.specialty_ids, vec![pediatrics.id]);

    let plan = clinic.db.delete_record(EntityKind::Doctor, doctor.id)?;
    assert_eq!(plan.unlinked, 1);
    assert!(clinic.db.get_specialty(pediatrics.id)?.is_some());
    assert!(clinic.db.list_doctors_for_specialty(pediatrics.id)?.is_empty());
    Ok(())
}

#[test]
fn test_delete_missing_record() -> anyhow::Result<()> {
    let clinic = setup_clinic()?;
    assert!(matches!(
        clinic.db.delete_record(EntityKind::Prescription, 404),
        Err(DbError::NotFound(_))
    ));
    Ok(())
}

proptest! {
    #[test]
    fn prop_patient_delete_removes_every_encounter(
        children in proptest::collection::vec(0usize..3, 0..8)
    ) {
        let clinic = setup_clinic().unwrap();
        for (i, n) in children.iter().enumerate() {
            add_encounter(&clinic, i as u32 + 1, *n).unwrap();
        }
        let total_children: usize = children.iter().sum();
        prop_assert_eq!(clinic.db.count(EntityKind::Encounter).unwrap(), children.len());
        prop_assert_eq!(clinic.db.count(EntityKind::Prescription).unwrap(), total_children);

        let plan = clinic.db.delete_record(EntityKind::Patient, clinic.patient_id).unwrap();
        prop_assert_eq!(plan.cascaded_count(EntityKind::Encounter), children.len());

        prop_assert_eq!(clinic.db.count(EntityKind::Encounter).unwrap(), 0);
        prop_assert_eq!(clinic.db.count(EntityKind::Prescription).unwrap(), 0);
        prop_assert_eq!(clinic.db.count(EntityKind::ExamRequest).unwrap(), 0);
        prop_assert_eq!(clinic.db.count(EntityKind::Doctor).unwrap(), 1);
    }
}
