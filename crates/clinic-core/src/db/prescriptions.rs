//! Prescription database operations.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{check_reference, validated, Database, DbError, DbResult};
use crate::models::{EntityKind, Prescription, PrescriptionForm};
use crate::validation::ValidationErrors;

fn prescription_from_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row.get(0)?,
        encounter_id: row.get(1)?,
        body: row.get(2)?,
        issued_on: row.get(3)?,
    })
}

/// Insert under an encounter; the issue date is today's date.
pub(crate) fn insert_prescription_in(
    conn: &Connection,
    encounter_id: i64,
    form: &PrescriptionForm,
) -> DbResult<i64> {
    let form = &form.cleaned();
    let mut refs = ValidationErrors::new();
    check_reference(conn, &mut refs, "encounter", EntityKind::Encounter, Some(encounter_id))?;
    validated(form.validate(), refs)?;

    conn.execute(
        "INSERT INTO prescriptions (encounter_id, body, issued_on) VALUES (?1, ?2, ?3)",
        params![encounter_id, form.body, Utc::now().date_naive()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(prescription_id = id, encounter_id, "prescription inserted");
    Ok(id)
}

/// Only the body is editable.
pub(crate) fn update_prescription_in(conn: &Connection, id: i64, form: &PrescriptionForm) -> DbResult<()> {
    let form = &form.cleaned();
    form.validate()?;
    let rows_affected = conn.execute(
        "UPDATE prescriptions SET body = ?2 WHERE id = ?1",
        params![id, form.body],
    )?;
    if rows_affected == 0 {
        return Err(DbError::not_found(EntityKind::Prescription, id));
    }
    Ok(())
}

fn list_prescriptions_in(conn: &Connection, encounter_id: i64) -> DbResult<Vec<Prescription>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, encounter_id, body, issued_on
        FROM prescriptions
        WHERE encounter_id = ?
        ORDER BY id
        "#,
    )?;
    let rows = stmt.query_map([encounter_id], prescription_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

impl Database {
    /// Insert a prescription under an encounter.
    pub fn insert_prescription(&self, encounter_id: i64, form: &PrescriptionForm) -> DbResult<Prescription> {
        let id = insert_prescription_in(&self.conn, encounter_id, form)?;
        self.get_prescription(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Prescription, id))
    }

    /// Update a prescription's body. The issue date never changes.
    pub fn update_prescription(&self, id: i64, form: &PrescriptionForm) -> DbResult<Prescription> {
        update_prescription_in(&self.conn, id, form)?;
        self.get_prescription(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Prescription, id))
    }

    /// Get a prescription by ID.
    pub fn get_prescription(&self, id: i64) -> DbResult<Option<Prescription>> {
        self.conn
            .query_row(
                "SELECT id, encounter_id, body, issued_on FROM prescriptions WHERE id = ?",
                [id],
                prescription_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Prescriptions of an encounter, in creation order.
    pub fn list_prescriptions_for_encounter(&self, encounter_id: i64) -> DbResult<Vec<Prescription>> {
        list_prescriptions_in(&self.conn, encounter_id)
    }

    /// Delete a prescription.
    pub fn delete_prescription(&self, id: i64) -> DbResult<()> {
        self.delete_record(EntityKind::Prescription, id).map(|_| ())
    }
}
