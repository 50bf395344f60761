//! Unique fields reject a second record with the same value.

use chrono::NaiveDate;
use clinic_core::db::{Database, DbError};
use clinic_core::models::{
    DoctorForm, EntityKind, InsurancePlanForm, PatientForm, SpecialtyForm,
};

fn assert_unique_violation(err: DbError, entity: EntityKind, field: &str) {
    match &err {
        DbError::Unique { entity: e, field: f } => {
            assert_eq!(*e, entity);
            assert_eq!(f.name, field);
        }
        other => panic!("expected unique violation on {}, got {:?}", field, other),
    }
    assert!(err.field_errors().unwrap().get(field).is_some());
}

#[test]
fn test_duplicate_specialty_name() -> anyhow::Result<()> {
    let db = Database::open_in_memory()?;
    db.insert_specialty(&SpecialtyForm::new("Cardiology"))?;
    let err = db.insert_specialty(&SpecialtyForm::new("Cardiology")).unwrap_err();
    assert_unique_violation(err, EntityKind::Specialty, "name");
    assert_eq!(db.count(EntityKind::Specialty)?, 1);
    Ok(())
}

#[test]
fn test_padded_duplicate_is_still_a_duplicate() -> anyhow::Result<()> {
    let db = Database::open_in_memory()?;
    let stored = db.insert_specialty(&SpecialtyForm::new("  Cardiology "))?;
    assert_eq!(stored.name, "Cardiology");

    let err = db.insert_specialty(&SpecialtyForm::new("Cardiology")).unwrap_err();
    assert_unique_violation(err, EntityKind::Specialty, "name");

    let err = db
        .insert_doctor(&DoctorForm::new("Ana Souza", "CRM-1"))
        .and_then(|_| db.insert_doctor(&DoctorForm::new("Ana S.", " CRM-1\t")))
        .unwrap_err();
    assert_unique_violation(err, EntityKind::Doctor, "license_number");
    Ok(())
}

#[test]
fn test_duplicate_license_number() -> anyhow::Result<()> {
    let db = Database::open_in_memory()?;
    db.insert_doctor(&DoctorForm::new("Ana Souza", "CRM-1"))?;
    let err = db.insert_doctor(&DoctorForm::new("Ana S.", "CRM-1")).unwrap_err();
    assert_unique_violation(err, EntityKind::Doctor, "license_number");
    Ok(())
}

#[test]
fn test_duplicate_national_id() -> anyhow::Result<()> {
    let db = Database::open_in_memory()?;
    let birth = NaiveDate::from_ymd_opt(1990, 5, 17).unwrap();
    db.insert_patient(&PatientForm::new("Maria Lima", "123", birth))?;
    let err = db
        .insert_patient(&PatientForm::new("Maria L.", "123", birth))
        .unwrap_err();
    assert_unique_violation(err, EntityKind::Patient, "national_id");
    Ok(())
}

#[test]
fn test_duplicate_plan_name_and_tax_id() -> anyhow::Result<()> {
    let db = Database::open_in_memory()?;
    db.insert_insurance_plan(&InsurancePlanForm::new("Unimed", "11"))?;

    let err = db
        .insert_insurance_plan(&InsurancePlanForm::new("Unimed", "22"))
        .unwrap_err();
    assert_unique_violation(err, EntityKind::InsurancePlan, "name");

    let err = db
        .insert_insurance_plan(&InsurancePlanForm::new("Amil", "11"))
        .unwrap_err();
    assert_unique_violation(err, EntityKind::InsurancePlan, "tax_id");
    assert_eq!(db.count(EntityKind::InsurancePlan)?, 1);
    Ok(())
}

#[test]
fn test_update_into_existing_value_rejected() -> anyhow::Result<()> {
    let db = Database::open_in_memory()?;
    db.insert_doctor(&DoctorForm::new("Ana Souza", "CRM-1"))?;
    let bruno = db.insert_doctor(&DoctorForm::new("Bruno Costa", "CRM-2"))?;

    let err = db
        .update_doctor(bruno.id, &DoctorForm::new("Bruno Costa", "CRM-1"))
        .unwrap_err();
    assert_unique_violation(err, EntityKind::Doctor, "license_number");
    assert_eq!(db.get_doctor(bruno.id)?.unwrap().license_number, "CRM-2");
    Ok(())
}
