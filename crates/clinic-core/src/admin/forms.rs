//! The encounter change form and its inline child rows.

use rusqlite::{Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};

use super::cells::{fetch_rows, fields_of, select_expr, RecordRow};
use super::{AdminError, AdminResult, RecordBrowser};
use crate::db::{
    delete_in, insert_encounter_in, insert_exam_request_in, insert_prescription_in, record_exists,
    update_encounter_in, update_exam_request_in, update_prescription_in, DbError, DbResult,
};
use crate::models::{Encounter, EncounterForm, EntityKind, ExamRequestForm, PrescriptionForm};
use crate::validation::{ValidationErrors, INVALID_CHOICE};

/// Rows of one inline child entity on the encounter form.
#[derive(Debug, Clone, Serialize)]
pub struct InlineFormSet {
    pub entity: EntityKind,
    /// Prefix of the field errors of these rows, e.g. `prescriptions-0-body`
    pub prefix: String,
    pub fields: Vec<String>,
    pub readonly_fields: Vec<String>,
    pub rows: Vec<RecordRow>,
    /// Blank rows to offer for new children
    pub extra: usize,
}

/// An edit to one inline row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InlineChange<F> {
    Add { form: F },
    Change { id: i64, form: F },
    Delete { id: i64 },
}

/// Inline edits submitted with an encounter form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InlineChanges {
    pub prescriptions: Vec<InlineChange<PrescriptionForm>>,
    pub exam_requests: Vec<InlineChange<ExamRequestForm>>,
}

fn inline_prefix(kind: EntityKind) -> &'static str {
    kind.meta().table
}

/// Reject the row's `id` unless child `id` of `kind` belongs to `encounter_id`.
///
/// An encounter that was not saved owns nothing, so every changed or deleted
/// row of it is rejected the same way.
fn check_owner(conn: &Connection, kind: EntityKind, id: i64, encounter_id: Option<i64>) -> DbResult<()> {
    let sql = format!("SELECT encounter_id FROM {} WHERE id = ?", kind.meta().table);
    let owner: Option<i64> = conn.query_row(&sql, [id], |row| row.get(0)).optional()?;
    match (owner, encounter_id) {
        (Some(owner), Some(encounter_id)) if owner == encounter_id => Ok(()),
        _ => Err(ValidationErrors::single("id", INVALID_CHOICE).into()),
    }
}

/// Keep validation failures for the final report, stop on anything else.
fn gather(errors: &mut ValidationErrors, prefix: Option<&str>, result: DbResult<()>) -> AdminResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(DbError::Validation(e)) => {
            match prefix {
                Some(prefix) => errors.merge_prefixed(prefix, e),
                None => errors.merge(e),
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn apply_prescription(
    conn: &Connection,
    encounter_id: Option<i64>,
    change: &InlineChange<PrescriptionForm>,
) -> DbResult<()> {
    match change {
        InlineChange::Add { form } => match encounter_id {
            Some(encounter_id) => insert_prescription_in(conn, encounter_id, form).map(|_| ()),
            None => form.validate().map_err(DbError::from),
        },
        InlineChange::Change { id, form } => {
            check_owner(conn, EntityKind::Prescription, *id, encounter_id)?;
            update_prescription_in(conn, *id, form)
        }
        InlineChange::Delete { id } => {
            check_owner(conn, EntityKind::Prescription, *id, encounter_id)?;
            delete_in(conn, EntityKind::Prescription, *id).map(|_| ())
        }
    }
}

fn apply_exam_request(
    conn: &Connection,
    encounter_id: Option<i64>,
    change: &InlineChange<ExamRequestForm>,
) -> DbResult<()> {
    match change {
        InlineChange::Add { form } => match encounter_id {
            Some(encounter_id) => insert_exam_request_in(conn, encounter_id, form).map(|_| ()),
            None => form.validate().map_err(DbError::from),
        },
        InlineChange::Change { id, form } => {
            check_owner(conn, EntityKind::ExamRequest, *id, encounter_id)?;
            update_exam_request_in(conn, *id, form)
        }
        InlineChange::Delete { id } => {
            check_owner(conn, EntityKind::ExamRequest, *id, encounter_id)?;
            delete_in(conn, EntityKind::ExamRequest, *id).map(|_| ())
        }
    }
}

impl RecordBrowser<'_> {
    /// The inline child rows shown on an encounter's form.
    pub fn inline_rows(&self, encounter_id: i64) -> AdminResult<Vec<InlineFormSet>> {
        if !record_exists(self.db.conn(), EntityKind::Encounter, encounter_id)? {
            return Err(DbError::not_found(EntityKind::Encounter, encounter_id).into());
        }
        let admin = self.admin(EntityKind::Encounter)?;

        let mut formsets = Vec::with_capacity(admin.inlines.len());
        for inline in admin.inlines {
            let meta = inline.entity.meta();
            let parent = meta
                .field(inline.parent_field)
                .ok_or_else(|| AdminError::UnknownField {
                    entity: inline.entity,
                    field: inline.parent_field.to_string(),
                })?;
            let fields = fields_of(inline.entity, inline.fields)?;
            let select: Vec<String> = fields.iter().map(|f| select_expr("t0", f)).collect();
            let sql = format!(
                "SELECT t0.id, {} FROM {} AS t0 WHERE t0.{} = ? ORDER BY t0.id",
                select.join(", "),
                meta.table,
                parent.column
            );
            let params: [Box<dyn ToSql>; 1] = [Box::new(encounter_id)];

            formsets.push(InlineFormSet {
                entity: inline.entity,
                prefix: inline_prefix(inline.entity).to_string(),
                fields: inline.fields.iter().map(ToString::to_string).collect(),
                readonly_fields: inline.readonly_fields.iter().map(ToString::to_string).collect(),
                rows: fetch_rows(self.db, &sql, &params, &fields)?,
                extra: inline.extra,
            });
        }
        Ok(formsets)
    }

    /// Save an encounter and its inline edits together.
    ///
    /// `id` of `None` creates the encounter. Either everything is saved or,
    /// on any failure, nothing is; validation failures of the parent and of
    /// every inline row are reported together, inline fields prefixed like
    /// `exam_requests-1-exam`.
    pub fn save_encounter_form(
        &self,
        id: Option<i64>,
        form: &EncounterForm,
        inlines: &InlineChanges,
    ) -> AdminResult<Encounter> {
        let tx = self.db.conn().unchecked_transaction()?;
        let mut errors = ValidationErrors::new();

        let saved = match id {
            Some(id) => update_encounter_in(&tx, id, form).map(|_| id),
            None => insert_encounter_in(&tx, form),
        };
        let encounter_id = match saved {
            Ok(saved) => Some(saved),
            Err(e) => {
                gather(&mut errors, None, Err(e))?;
                id
            }
        };

        let prescriptions = inline_prefix(EntityKind::Prescription);
        for (i, change) in inlines.prescriptions.iter().enumerate() {
            let result = apply_prescription(&tx, encounter_id, change);
            gather(&mut errors, Some(format!("{}-{}", prescriptions, i).as_str()), result)?;
        }
        let exam_requests = inline_prefix(EntityKind::ExamRequest);
        for (i, change) in inlines.exam_requests.iter().enumerate() {
            let result = apply_exam_request(&tx, encounter_id, change);
            gather(&mut errors, Some(format!("{}-{}", exam_requests, i).as_str()), result)?;
        }

        if !errors.is_empty() {
            tracing::debug!(fields = errors.fields().count(), "encounter form rejected");
            return Err(DbError::Validation(errors).into());
        }
        let encounter_id = encounter_id.ok_or_else(|| DbError::NotFound("encounter".into()))?;
        tx.commit()?;

        tracing::info!(
            encounter_id,
            created = id.is_none(),
            prescriptions = inlines.prescriptions.len(),
            exam_requests = inlines.exam_requests.len(),
            "encounter form saved"
        );
        self.db
            .get_encounter(encounter_id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Encounter, encounter_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::Cell;
    use crate::db::Database;
    use crate::models::{DoctorForm, ExamForm, PatientForm};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn setup_db() -> (Database, EncounterForm, i64) {
        let db = Database::open_in_memory().unwrap();
        let patient = db
            .insert_patient(&PatientForm::new(
                "Maria Lima",
                "1",
                NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
            ))
            .unwrap();
        let doctor = db.insert_doctor(&DoctorForm::new("Ana Souza", "CRM-1")).unwrap();
        let exam = db.insert_exam(&ExamForm::new("Blood count")).unwrap();
        let scheduled_at = Utc.with_ymd_and_hms(2025, 3, 2, 14, 0, 0).unwrap();
        (db, EncounterForm::new(patient.id, doctor.id, scheduled_at), exam.id)
    }

    #[test]
    fn test_create_with_inlines() {
        let (db, form, exam_id) = setup_db();
        let browser = RecordBrowser::new(&db);
        let inlines = InlineChanges {
            prescriptions: vec![InlineChange::Add {
                form: PrescriptionForm::new("Amoxicillin 500mg"),
            }],
            exam_requests: vec![InlineChange::Add {
                form: ExamRequestForm::new(exam_id),
            }],
        };

        let encounter = browser.save_encounter_form(None, &form, &inlines).unwrap();
        let formsets = browser.inline_rows(encounter.id).unwrap();

        assert_eq!(formsets.len(), 2);
        assert_eq!(formsets[0].prefix, "prescriptions");
        assert_eq!(formsets[0].rows.len(), 1);
        assert_eq!(formsets[0].rows[0].cells[0], Cell::Text("Amoxicillin 500mg".into()));
        assert_eq!(formsets[1].rows[0].texts()[0], "Blood count");
        assert_eq!(formsets[1].extra, 1);
    }

    #[test]
    fn test_invalid_inline_rolls_back_parent() {
        let (db, form, _) = setup_db();
        let browser = RecordBrowser::new(&db);
        let inlines = InlineChanges {
            prescriptions: vec![
                InlineChange::Add {
                    form: PrescriptionForm::new("Rest"),
                },
                InlineChange::Add {
                    form: PrescriptionForm::new(""),
                },
            ],
            exam_requests: vec![InlineChange::Add {
                form: ExamRequestForm::default(),
            }],
        };

        let err = browser.save_encounter_form(None, &form, &inlines).unwrap_err();
        let errors = err.field_errors().unwrap();
        assert!(errors.get("prescriptions-1-body").is_some());
        assert!(errors.get("exam_requests-0-exam").is_some());
        assert!(errors.get("prescriptions-0-body").is_none());

        assert_eq!(db.count(EntityKind::Encounter).unwrap(), 0);
        assert_eq!(db.count(EntityKind::Prescription).unwrap(), 0);
    }

    #[test]
    fn test_parent_and_inline_errors_reported_together() {
        let (db, mut form, _) = setup_db();
        form.doctor_id = None;
        let inlines = InlineChanges {
            prescriptions: vec![InlineChange::Add {
                form: PrescriptionForm::new(" "),
            }],
            ..InlineChanges::default()
        };

        let err = RecordBrowser::new(&db)
            .save_encounter_form(None, &form, &inlines)
            .unwrap_err();
        let errors = err.field_errors().unwrap();
        assert!(errors.get("doctor").is_some());
        assert!(errors.get("prescriptions-0-body").is_some());
    }

    #[test]
    fn test_child_of_other_encounter_rejected() {
        let (db, form, _) = setup_db();
        let browser = RecordBrowser::new(&db);
        let first = db.insert_encounter(&form).unwrap();
        let second = db.insert_encounter(&form).unwrap();
        let prescription = db
            .insert_prescription(first.id, &PrescriptionForm::new("Rest"))
            .unwrap();

        let inlines = InlineChanges {
            prescriptions: vec![InlineChange::Delete { id: prescription.id }],
            ..InlineChanges::default()
        };
        let err = browser
            .save_encounter_form(Some(second.id), &form, &inlines)
            .unwrap_err();
        assert!(err.field_errors().unwrap().get("prescriptions-0-id").is_some());
        assert_eq!(db.count(EntityKind::Prescription).unwrap(), 1);
    }

    #[test]
    fn test_existing_rows_on_unsaved_encounter_reported_per_row() {
        let (db, mut form, exam_id) = setup_db();
        let browser = RecordBrowser::new(&db);
        let existing = db.insert_encounter(&form).unwrap();
        let prescription = db
            .insert_prescription(existing.id, &PrescriptionForm::new("Rest"))
            .unwrap();
        let request = db
            .insert_exam_request(existing.id, &ExamRequestForm::new(exam_id))
            .unwrap();

        form.patient_id = None;
        let inlines = InlineChanges {
            prescriptions: vec![InlineChange::Change {
                id: prescription.id,
                form: PrescriptionForm::new("Rest and fluids"),
            }],
            exam_requests: vec![InlineChange::Delete { id: request.id }],
        };
        let err = browser.save_encounter_form(None, &form, &inlines).unwrap_err();

        let errors = err.field_errors().unwrap();
        assert!(errors.get("patient").is_some());
        assert!(errors.get("prescriptions-0-id").is_some());
        assert!(errors.get("exam_requests-0-id").is_some());
        assert_eq!(db.count(EntityKind::Encounter).unwrap(), 1);
        assert_eq!(db.count(EntityKind::ExamRequest).unwrap(), 1);
        assert_eq!(db.get_prescription(prescription.id).unwrap().unwrap().body, "Rest");
    }

    #[test]
    fn test_inline_rows_of_missing_encounter() {
        let (db, _, _) = setup_db();
        assert!(RecordBrowser::new(&db).inline_rows(77).is_err());
    }
}
