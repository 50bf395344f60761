//! Exam and exam request database operations.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{check_reference, validated, Database, DbError, DbResult};
use crate::models::{EntityKind, Exam, ExamForm, ExamRequest, ExamRequestForm};
use crate::validation::{ValidationErrors, REQUIRED};

const REQUEST_COLUMNS: &str = "id, encounter_id, exam_id, completed, result, requested_at";

fn exam_from_row(row: &Row<'_>) -> rusqlite::Result<Exam> {
    Ok(Exam {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<ExamRequest> {
    Ok(ExamRequest {
        id: row.get(0)?,
        encounter_id: row.get(1)?,
        exam_id: row.get(2)?,
        completed: row.get(3)?,
        result: row.get(4)?,
        requested_at: row.get(5)?,
    })
}

fn check_request(conn: &Connection, mut refs: ValidationErrors, form: &ExamRequestForm) -> DbResult<i64> {
    check_reference(conn, &mut refs, "exam", EntityKind::Exam, form.exam_id)?;
    validated(form.validate(), refs)?;
    form.exam_id
        .ok_or_else(|| ValidationErrors::single("exam", REQUIRED).into())
}

/// Insert under an encounter; `requested_at` is today's date.
pub(crate) fn insert_exam_request_in(
    conn: &Connection,
    encounter_id: i64,
    form: &ExamRequestForm,
) -> DbResult<i64> {
    let form = &form.cleaned();
    let mut refs = ValidationErrors::new();
    check_reference(conn, &mut refs, "encounter", EntityKind::Encounter, Some(encounter_id))?;
    let exam_id = check_request(conn, refs, form)?;

    conn.execute(
        r#"
        INSERT INTO exam_requests (encounter_id, exam_id, completed, result, requested_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![encounter_id, exam_id, form.completed, form.result, Utc::now().date_naive()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(exam_request_id = id, encounter_id, exam_id, "exam request inserted");
    Ok(id)
}

pub(crate) fn update_exam_request_in(conn: &Connection, id: i64, form: &ExamRequestForm) -> DbResult<()> {
    let form = &form.cleaned();
    let exam_id = check_request(conn, ValidationErrors::new(), form)?;
    let rows_affected = conn.execute(
        "UPDATE exam_requests SET exam_id = ?2, completed = ?3, result = ?4 WHERE id = ?1",
        params![id, exam_id, form.completed, form.result],
    )?;
    if rows_affected == 0 {
        return Err(DbError::not_found(EntityKind::ExamRequest, id));
    }
    Ok(())
}

fn list_exam_requests_in(conn: &Connection, encounter_id: i64) -> DbResult<Vec<ExamRequest>> {
    let sql = format!(
        "SELECT {} FROM exam_requests WHERE encounter_id = ? ORDER BY id",
        REQUEST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([encounter_id], request_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

impl Database {
    // =========================================================================
    // Exams
    // =========================================================================

    /// Insert a new exam.
    pub fn insert_exam(&self, form: &ExamForm) -> DbResult<Exam> {
        let form = &form.cleaned();
        form.validate()?;
        self.conn.execute(
            "INSERT INTO exams (name, description) VALUES (?1, ?2)",
            params![form.name, form.description],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(exam_id = id, "exam inserted");
        self.get_exam(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Exam, id))
    }

    /// Update an existing exam.
    pub fn update_exam(&self, id: i64, form: &ExamForm) -> DbResult<Exam> {
        let form = &form.cleaned();
        form.validate()?;
        let rows_affected = self.conn.execute(
            "UPDATE exams SET name = ?2, description = ?3 WHERE id = ?1",
            params![id, form.name, form.description],
        )?;
        if rows_affected == 0 {
            return Err(DbError::not_found(EntityKind::Exam, id));
        }
        self.get_exam(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Exam, id))
    }

    /// Get an exam by ID.
    pub fn get_exam(&self, id: i64) -> DbResult<Option<Exam>> {
        self.conn
            .query_row(
                "SELECT id, name, description FROM exams WHERE id = ?",
                [id],
                exam_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List exams by name.
    pub fn list_exams(&self) -> DbResult<Vec<Exam>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM exams ORDER BY name")?;
        let rows = stmt.query_map([], exam_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete an exam. Blocked while any exam request references it.
    pub fn delete_exam(&self, id: i64) -> DbResult<()> {
        self.delete_record(EntityKind::Exam, id).map(|_| ())
    }

    // =========================================================================
    // Exam Requests
    // =========================================================================

    /// Request an exam during an encounter.
    pub fn insert_exam_request(&self, encounter_id: i64, form: &ExamRequestForm) -> DbResult<ExamRequest> {
        let id = insert_exam_request_in(&self.conn, encounter_id, form)?;
        self.get_exam_request(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::ExamRequest, id))
    }

    /// Update an exam request. `requested_at` never changes.
    pub fn update_exam_request(&self, id: i64, form: &ExamRequestForm) -> DbResult<ExamRequest> {
        update_exam_request_in(&self.conn, id, form)?;
        self.get_exam_request(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::ExamRequest, id))
    }

    /// Get an exam request by ID.
    pub fn get_exam_request(&self, id: i64) -> DbResult<Option<ExamRequest>> {
        let sql = format!("SELECT {} FROM exam_requests WHERE id = ?", REQUEST_COLUMNS);
        self.conn
            .query_row(&sql, [id], request_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Exam requests of an encounter, in creation order.
    pub fn list_exam_requests_for_encounter(&self, encounter_id: i64) -> DbResult<Vec<ExamRequest>> {
        list_exam_requests_in(&self.conn, encounter_id)
    }

    /// Requests still waiting for a result.
    pub fn list_pending_exam_requests(&self) -> DbResult<Vec<ExamRequest>> {
        let sql = format!(
            "SELECT {} FROM exam_requests WHERE completed = 0 ORDER BY requested_at, id",
            REQUEST_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], request_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete an exam request.
    pub fn delete_exam_request(&self, id: i64) -> DbResult<()> {
        self.delete_record(EntityKind::ExamRequest, id).map(|_| ())
    }
}
