//! Specialty and doctor database operations.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{check_reference, validated, Database, DbError, DbResult};
use crate::models::{Doctor, DoctorForm, EntityKind, Specialty, SpecialtyForm};
use crate::validation::ValidationErrors;

fn specialty_from_row(row: &Row<'_>) -> rusqlite::Result<Specialty> {
    Ok(Specialty {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

/// Doctor row without its specialty set.
fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: row.get(0)?,
        name: row.get(1)?,
        license_number: row.get(2)?,
        email: row.get(3)?,
        specialty_ids: Vec::new(),
    })
}

fn specialty_ids_for(conn: &Connection, doctor_id: i64) -> DbResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT specialty_id FROM doctor_specialties WHERE doctor_id = ? ORDER BY specialty_id",
    )?;
    let rows = stmt.query_map([doctor_id], |row| row.get(0))?;
    rows.collect::<Result<Vec<i64>, _>>().map_err(Into::into)
}

fn check_specialties(conn: &Connection, form: &DoctorForm) -> DbResult<ValidationErrors> {
    let mut errors = ValidationErrors::new();
    for id in &form.specialty_ids {
        check_reference(conn, &mut errors, "specialties", EntityKind::Specialty, Some(*id))?;
    }
    Ok(errors)
}

/// Replace the doctor's specialty set.
fn replace_specialties(conn: &Connection, doctor_id: i64, specialty_ids: &[i64]) -> DbResult<()> {
    conn.execute("DELETE FROM doctor_specialties WHERE doctor_id = ?", [doctor_id])?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO doctor_specialties (doctor_id, specialty_id) VALUES (?, ?)",
    )?;
    for specialty_id in specialty_ids {
        stmt.execute(params![doctor_id, specialty_id])?;
    }
    Ok(())
}

impl Database {
    // =========================================================================
    // Specialties
    // =========================================================================

    /// Insert a new specialty.
    pub fn insert_specialty(&self, form: &SpecialtyForm) -> DbResult<Specialty> {
        let form = &form.cleaned();
        form.validate()?;
        self.conn.execute(
            "INSERT INTO specialties (name, description) VALUES (?1, ?2)",
            params![form.name, form.description],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(specialty_id = id, "specialty inserted");
        self.get_specialty(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Specialty, id))
    }

    /// Update an existing specialty.
    pub fn update_specialty(&self, id: i64, form: &SpecialtyForm) -> DbResult<Specialty> {
        let form = &form.cleaned();
        form.validate()?;
        let rows_affected = self.conn.execute(
            "UPDATE specialties SET name = ?2, description = ?3 WHERE id = ?1",
            params![id, form.name, form.description],
        )?;
        if rows_affected == 0 {
            return Err(DbError::not_found(EntityKind::Specialty, id));
        }
        self.get_specialty(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Specialty, id))
    }

    /// Get a specialty by ID.
    pub fn get_specialty(&self, id: i64) -> DbResult<Option<Specialty>> {
        self.conn
            .query_row(
                "SELECT id, name, description FROM specialties WHERE id = ?",
                [id],
                specialty_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List all specialties by name.
    pub fn list_specialties(&self) -> DbResult<Vec<Specialty>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM specialties ORDER BY name")?;
        let rows = stmt.query_map([], specialty_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Doctors practising a specialty (the reverse side of the association).
    pub fn list_doctors_for_specialty(&self, specialty_id: i64) -> DbResult<Vec<Doctor>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT d.id, d.name, d.license_number, d.email
            FROM doctors d
            JOIN doctor_specialties ds ON ds.doctor_id = d.id
            WHERE ds.specialty_id = ?
            ORDER BY d.name
            "#,
        )?;
        let rows = stmt.query_map([specialty_id], doctor_from_row)?;
        let mut doctors = Vec::new();
        for row in rows {
            let mut doctor = row?;
            doctor.specialty_ids = specialty_ids_for(&self.conn, doctor.id)?;
            doctors.push(doctor);
        }
        Ok(doctors)
    }

    /// Delete a specialty; its doctor links go with it.
    pub fn delete_specialty(&self, id: i64) -> DbResult<()> {
        self.delete_record(EntityKind::Specialty, id).map(|_| ())
    }

    // =========================================================================
    // Doctors
    // =========================================================================

    /// Insert a new doctor together with their specialties.
    pub fn insert_doctor(&self, form: &DoctorForm) -> DbResult<Doctor> {
        let form = &form.cleaned();
        validated(form.validate(), check_specialties(&self.conn, form)?)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO doctors (name, license_number, email) VALUES (?1, ?2, ?3)",
            params![form.name, form.license_number, form.email],
        )?;
        let id = tx.last_insert_rowid();
        replace_specialties(&tx, id, &form.specialty_ids)?;
        tx.commit()?;

        tracing::debug!(doctor_id = id, specialties = form.specialty_ids.len(), "doctor inserted");
        self.get_doctor(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Doctor, id))
    }

    /// Update a doctor, replacing the specialty set.
    pub fn update_doctor(&self, id: i64, form: &DoctorForm) -> DbResult<Doctor> {
        let form = &form.cleaned();
        validated(form.validate(), check_specialties(&self.conn, form)?)?;

        let tx = self.conn.unchecked_transaction()?;
        let rows_affected = tx.execute(
            "UPDATE doctors SET name = ?2, license_number = ?3, email = ?4 WHERE id = ?1",
            params![id, form.name, form.license_number, form.email],
        )?;
        if rows_affected == 0 {
            return Err(DbError::not_found(EntityKind::Doctor, id));
        }
        replace_specialties(&tx, id, &form.specialty_ids)?;
        tx.commit()?;

        self.get_doctor(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Doctor, id))
    }

    /// Get a doctor by ID, including specialty IDs.
    pub fn get_doctor(&self, id: i64) -> DbResult<Option<Doctor>> {
        let doctor = self
            .conn
            .query_row(
                "SELECT id, name, license_number, email FROM doctors WHERE id = ?",
                [id],
                doctor_from_row,
            )
            .optional()?;

        match doctor {
            Some(mut doctor) => {
                doctor.specialty_ids = specialty_ids_for(&self.conn, id)?;
                Ok(Some(doctor))
            }
            None => Ok(None),
        }
    }

    /// Specialties of a doctor.
    pub fn list_specialties_for_doctor(&self, doctor_id: i64) -> DbResult<Vec<Specialty>> {
        let ids = specialty_ids_for(&self.conn, doctor_id)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, name, description FROM specialties WHERE id IN ({}) ORDER BY name",
            vec!["?"; ids.len()].join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), specialty_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List all doctors by name.
    pub fn list_doctors(&self) -> DbResult<Vec<Doctor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, license_number, email FROM doctors ORDER BY name")?;
        let rows = stmt.query_map([], doctor_from_row)?;
        let mut doctors = Vec::new();
        for row in rows {
            let mut doctor = row?;
            doctor.specialty_ids = specialty_ids_for(&self.conn, doctor.id)?;
            doctors.push(doctor);
        }
        Ok(doctors)
    }

    /// Delete a doctor. Blocked while any encounter references them.
    pub fn delete_doctor(&self, id: i64) -> DbResult<()> {
        self.delete_record(EntityKind::Doctor, id).map(|_| ())
    }
}
