//! Encounter database operations.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{check_reference, validated, Database, DbError, DbResult};
use crate::models::{
    cents_to_decimal, decimal_to_cents, Encounter, EncounterForm, EncounterStatus, EntityKind,
};
use crate::validation::{ValidationErrors, REQUIRED};

const ENCOUNTER_COLUMNS: &str = "id, patient_id, doctor_id, scheduled_at, reason, description, \
                                 status, value_cents, created_at, updated_at";

impl ToSql for EncounterStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EncounterStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        EncounterStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown encounter status: {}", s).into()))
    }
}

fn encounter_from_row(row: &Row<'_>) -> rusqlite::Result<Encounter> {
    Ok(Encounter {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        scheduled_at: row.get(3)?,
        reason: row.get(4)?,
        description: row.get(5)?,
        status: row.get(6)?,
        value: cents_to_decimal(row.get(7)?),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Checked column values of an encounter form.
struct EncounterValues {
    patient_id: i64,
    doctor_id: i64,
    scheduled_at: DateTime<Utc>,
    value_cents: i64,
}

fn check_form(conn: &Connection, form: &EncounterForm) -> DbResult<EncounterValues> {
    let mut refs = ValidationErrors::new();
    check_reference(conn, &mut refs, "patient", EntityKind::Patient, form.patient_id)?;
    check_reference(conn, &mut refs, "doctor", EntityKind::Doctor, form.doctor_id)?;
    validated(form.validate(), refs)?;

    let (Some(patient_id), Some(doctor_id), Some(scheduled_at)) =
        (form.patient_id, form.doctor_id, form.scheduled_at)
    else {
        return Err(ValidationErrors::single("__all__", REQUIRED).into());
    };
    let value_cents = decimal_to_cents(&form.value)
        .ok_or_else(|| ValidationErrors::single("value", "Enter a number."))?;

    Ok(EncounterValues {
        patient_id,
        doctor_id,
        scheduled_at,
        value_cents,
    })
}

fn get_encounter_in(conn: &Connection, id: i64) -> DbResult<Option<Encounter>> {
    let sql = format!("SELECT {} FROM encounters WHERE id = ?", ENCOUNTER_COLUMNS);
    conn.query_row(&sql, [id], encounter_from_row)
        .optional()
        .map_err(Into::into)
}

pub(crate) fn insert_encounter_in(conn: &Connection, form: &EncounterForm) -> DbResult<i64> {
    let form = &form.cleaned();
    let values = check_form(conn, form)?;
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO encounters (
            patient_id, doctor_id, scheduled_at, reason, description,
            status, value_cents, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            values.patient_id,
            values.doctor_id,
            values.scheduled_at,
            form.reason,
            form.description,
            form.status,
            values.value_cents,
            now,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(encounter_id = id, status = form.status.as_str(), "encounter inserted");
    Ok(id)
}

pub(crate) fn update_encounter_in(conn: &Connection, id: i64, form: &EncounterForm) -> DbResult<()> {
    let form = &form.cleaned();
    let values = check_form(conn, form)?;
    let rows_affected = conn.execute(
        r#"
        UPDATE encounters SET
            patient_id = ?2,
            doctor_id = ?3,
            scheduled_at = ?4,
            reason = ?5,
            description = ?6,
            status = ?7,
            value_cents = ?8,
            updated_at = ?9
        WHERE id = ?1
        "#,
        params![
            id,
            values.patient_id,
            values.doctor_id,
            values.scheduled_at,
            form.reason,
            form.description,
            form.status,
            values.value_cents,
            Utc::now(),
        ],
    )?;
    if rows_affected == 0 {
        return Err(DbError::not_found(EntityKind::Encounter, id));
    }
    Ok(())
}

impl Database {
    /// Insert a new encounter.
    pub fn insert_encounter(&self, form: &EncounterForm) -> DbResult<Encounter> {
        let id = insert_encounter_in(&self.conn, form)?;
        self.get_encounter(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Encounter, id))
    }

    /// Update an existing encounter. `created_at` is kept, `updated_at` refreshed.
    pub fn update_encounter(&self, id: i64, form: &EncounterForm) -> DbResult<Encounter> {
        update_encounter_in(&self.conn, id, form)?;
        self.get_encounter(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Encounter, id))
    }

    /// Change only the status. Any status may follow any other.
    pub fn set_encounter_status(&self, id: i64, status: EncounterStatus) -> DbResult<Encounter> {
        let rows_affected = self.conn.execute(
            "UPDATE encounters SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, Utc::now()],
        )?;
        if rows_affected == 0 {
            return Err(DbError::not_found(EntityKind::Encounter, id));
        }
        self.get_encounter(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Encounter, id))
    }

    /// Get an encounter by ID.
    pub fn get_encounter(&self, id: i64) -> DbResult<Option<Encounter>> {
        get_encounter_in(&self.conn, id)
    }

    /// All encounters of a patient, latest first.
    pub fn list_encounters_for_patient(&self, patient_id: i64) -> DbResult<Vec<Encounter>> {
        self.list_encounters_where("patient_id", patient_id)
    }

    /// All encounters of a doctor, latest first.
    pub fn list_encounters_for_doctor(&self, doctor_id: i64) -> DbResult<Vec<Encounter>> {
        self.list_encounters_where("doctor_id", doctor_id)
    }

    fn list_encounters_where(&self, column: &str, id: i64) -> DbResult<Vec<Encounter>> {
        let sql = format!(
            "SELECT {} FROM encounters WHERE {} = ? ORDER BY scheduled_at DESC, id DESC",
            ENCOUNTER_COLUMNS, column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([id], encounter_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete an encounter with its prescriptions and exam requests.
    pub fn delete_encounter(&self, id: i64) -> DbResult<()> {
        self.delete_record(EntityKind::Encounter, id).map(|_| ())
    }
}
