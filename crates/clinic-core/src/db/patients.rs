//! Patient database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{check_reference, validated, Database, DbError, DbResult};
use crate::models::{EntityKind, Patient, PatientForm};
use crate::validation::{ValidationErrors, REQUIRED};

const PATIENT_COLUMNS: &str = "id, name, national_id, email, birth_date, phone, insurance_plan_id";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        national_id: row.get(2)?,
        email: row.get(3)?,
        birth_date: row.get(4)?,
        phone: row.get(5)?,
        insurance_plan_id: row.get(6)?,
    })
}

impl Database {
    fn check_patient_form(&self, form: &PatientForm) -> DbResult<()> {
        let mut refs = ValidationErrors::new();
        check_reference(
            &self.conn,
            &mut refs,
            "insurance_plan",
            EntityKind::InsurancePlan,
            form.insurance_plan_id,
        )?;
        validated(form.validate(), refs)
    }

    /// Insert a new patient.
    pub fn insert_patient(&self, form: &PatientForm) -> DbResult<Patient> {
        let form = &form.cleaned();
        self.check_patient_form(form)?;
        let birth_date = form
            .birth_date
            .ok_or_else(|| ValidationErrors::single("birth_date", REQUIRED))?;

        self.conn.execute(
            r#"
            INSERT INTO patients (
                name, national_id, email, birth_date, phone, insurance_plan_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                form.name,
                form.national_id,
                form.email,
                birth_date,
                form.phone,
                form.insurance_plan_id,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(patient_id = id, "patient inserted");
        self.get_patient(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Patient, id))
    }

    /// Update an existing patient.
    pub fn update_patient(&self, id: i64, form: &PatientForm) -> DbResult<Patient> {
        let form = &form.cleaned();
        self.check_patient_form(form)?;
        let birth_date = form
            .birth_date
            .ok_or_else(|| ValidationErrors::single("birth_date", REQUIRED))?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = ?2,
                national_id = ?3,
                email = ?4,
                birth_date = ?5,
                phone = ?6,
                insurance_plan_id = ?7
            WHERE id = ?1
            "#,
            params![
                id,
                form.name,
                form.national_id,
                form.email,
                birth_date,
                form.phone,
                form.insurance_plan_id,
            ],
        )?;
        if rows_affected == 0 {
            return Err(DbError::not_found(EntityKind::Patient, id));
        }
        self.get_patient(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Patient, id))
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: i64) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS);
        self.conn
            .query_row(&sql, [id], patient_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Get a patient by national ID.
    pub fn get_patient_by_national_id(&self, national_id: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {} FROM patients WHERE national_id = ?", PATIENT_COLUMNS);
        self.conn
            .query_row(&sql, [national_id], patient_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Search patients by name (prefix match).
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("{}%", query);
        let sql = format!(
            "SELECT {} FROM patients WHERE name LIKE ? ORDER BY name LIMIT ?",
            PATIENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, limit as i64], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List all patients.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let sql = format!("SELECT {} FROM patients ORDER BY name", PATIENT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a patient and, with them, all their encounters.
    pub fn delete_patient(&self, id: i64) -> DbResult<()> {
        self.delete_record(EntityKind::Patient, id).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InsurancePlanForm;
    use chrono::NaiveDate;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn birth() -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 5, 17).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();
        let plan = db
            .insert_insurance_plan(&InsurancePlanForm::new("Vida Plena", "1"))
            .unwrap();

        let mut form = PatientForm::new("Maria Lima", "123.456.789-00", birth());
        form.phone = "(11) 98888-0000".into();
        form.insurance_plan_id = Some(plan.id);
        let patient = db.insert_patient(&form).unwrap();

        let retrieved = db.get_patient(patient.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "Maria Lima");
        assert_eq!(retrieved.birth_date, birth());
        assert_eq!(retrieved.insurance_plan_id, Some(plan.id));
        assert_eq!(
            db.get_patient_by_national_id("123.456.789-00").unwrap().unwrap().id,
            patient.id
        );
    }

    #[test]
    fn test_update_patient() {
        let db = setup_db();
        let mut form = PatientForm::new("Maria Lima", "1", birth());
        let patient = db.insert_patient(&form).unwrap();

        form.email = "maria@example.com".into();
        let updated = db.update_patient(patient.id, &form).unwrap();
        assert_eq!(updated.email, "maria@example.com");
    }

    #[test]
    fn test_search_patients() {
        let db = setup_db();
        db.insert_patient(&PatientForm::new("Maria", "1", birth())).unwrap();
        db.insert_patient(&PatientForm::new("Mariana", "2", birth())).unwrap();
        db.insert_patient(&PatientForm::new("Luna", "3", birth())).unwrap();

        let results = db.search_patients("Mari", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|p| p.name == "Maria"));
        assert!(results.iter().any(|p| p.name == "Mariana"));
    }

    #[test]
    fn test_unknown_plan_rejected() {
        let db = setup_db();
        let mut form = PatientForm::new("Maria", "1", birth());
        form.insurance_plan_id = Some(77);
        form.birth_date = None;

        let errors = db.insert_patient(&form).unwrap_err().field_errors().unwrap();
        assert!(errors.get("insurance_plan").is_some());
        assert!(errors.get("birth_date").is_some());
    }

    #[test]
    fn test_duplicate_national_id() {
        let db = setup_db();
        db.insert_patient(&PatientForm::new("Maria", "1", birth())).unwrap();
        let err = db
            .insert_patient(&PatientForm::new("Other", "1", birth()))
            .unwrap_err();
        assert!(matches!(err, DbError::Unique { entity: EntityKind::Patient, .. }));
    }
}
