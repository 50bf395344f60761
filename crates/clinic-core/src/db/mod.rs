//! Database layer for the clinic.

mod deletion;
mod encounters;
mod exams;
mod insurance;
mod labels;
mod patients;
mod prescriptions;
mod schema;
mod staff;

pub use deletion::*;
use deletion::describe_references;
pub use schema::*;

pub(crate) use deletion::delete_in;
pub(crate) use encounters::{insert_encounter_in, update_encounter_in};
pub(crate) use exams::{insert_exam_request_in, update_exam_request_in};
pub(crate) use prescriptions::{insert_prescription_in, update_prescription_in};

use rusqlite::{ffi, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

use crate::config::{ClinicConfig, DatabaseLocation};
use crate::models::{entity_for_table, EntityKind, FieldMeta};
use crate::validation::{ValidationErrors, INVALID_CHOICE};

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("{entity} with this {} already exists", .field.verbose_name)]
    Unique {
        entity: EntityKind,
        field: &'static FieldMeta,
    },

    #[error("{entity} {} is required", .field.verbose_name)]
    Required {
        entity: EntityKind,
        field: &'static FieldMeta,
    },

    #[error("Cannot delete {entity} #{id}: still referenced by {}", describe_references(.references))]
    Protected {
        entity: EntityKind,
        id: i64,
        references: Vec<ProtectedReference>,
    },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

impl DbError {
    pub(crate) fn not_found(kind: EntityKind, id: i64) -> Self {
        DbError::NotFound(format!("{} #{}", kind, id))
    }

    /// Per-field form errors for constraint failures that belong to a field.
    pub fn field_errors(&self) -> Option<ValidationErrors> {
        match self {
            DbError::Validation(errors) => Some(errors.clone()),
            DbError::Unique { field, .. } | DbError::Required { field, .. } => {
                Some(ValidationErrors::single(field.name, self.to_string()))
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, Some(message)) = &e {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return classify_constraint(err.extended_code, message)
                    .unwrap_or_else(|| DbError::Constraint(message.clone()));
            }
        }
        DbError::Sqlite(e)
    }
}

/// Map "UNIQUE constraint failed: doctors.license_number" to the field it names.
fn classify_constraint(extended_code: i32, message: &str) -> Option<DbError> {
    let (_, target) = message.split_once(": ")?;
    let first = target.split(',').next()?.trim();
    let (table, column) = first.split_once('.')?;
    let meta = entity_for_table(table)?;
    let field = meta.field_by_column(column)?;

    match extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE if field.unique => Some(DbError::Unique {
            entity: meta.kind,
            field,
        }),
        ffi::SQLITE_CONSTRAINT_NOTNULL => Some(DbError::Required {
            entity: meta.kind,
            field,
        }),
        _ => None,
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "opened clinic database");
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open whatever the configuration points at.
    pub fn open_with_config(config: &ClinicConfig) -> DbResult<Self> {
        match &config.database {
            DatabaseLocation::File(path) => Self::open(path),
            DatabaseLocation::InMemory => Self::open_in_memory(),
        }
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        tracing::debug!("schema initialized");
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Check whether a record of `kind` exists.
    pub fn exists(&self, kind: EntityKind, id: i64) -> DbResult<bool> {
        record_exists(&self.conn, kind, id)
    }

    /// Number of stored records of `kind`.
    pub fn count(&self, kind: EntityKind) -> DbResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.meta().table);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

pub(crate) fn record_exists(conn: &Connection, kind: EntityKind, id: i64) -> DbResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", kind.meta().table);
    Ok(conn
        .query_row(&sql, [id], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Reject a form whose foreign key points at nothing.
pub(crate) fn check_reference(
    conn: &Connection,
    errors: &mut ValidationErrors,
    field: &str,
    kind: EntityKind,
    id: Option<i64>,
) -> DbResult<()> {
    if let Some(id) = id {
        if !record_exists(conn, kind, id)? {
            errors.add(field, INVALID_CHOICE);
        }
    }
    Ok(())
}

/// Run form validation and reference checks, failing with every field error at once.
pub(crate) fn validated(
    form_result: Result<(), ValidationErrors>,
    extra: ValidationErrors,
) -> DbResult<()> {
    let mut errors = form_result.err().unwrap_or_default();
    errors.merge(extra);
    errors.into_result().map_err(DbError::Validation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        // Check that tables exist
        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for kind in EntityKind::ALL {
            assert!(tables.contains(&kind.meta().table.to_string()), "{}", kind.as_str());
        }
        assert!(tables.contains(&"doctor_specialties".to_string()));
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::open_in_memory().unwrap();
        let enabled: i64 = db
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_classify_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute("INSERT INTO specialties (name) VALUES ('Cardiology')", [])
            .unwrap();
        let err: DbError = db
            .conn()
            .execute("INSERT INTO specialties (name) VALUES ('Cardiology')", [])
            .unwrap_err()
            .into();

        match &err {
            DbError::Unique { entity, field } => {
                assert_eq!(*entity, EntityKind::Specialty);
                assert_eq!(field.name, "name");
            }
            other => panic!("expected unique violation, got {:?}", other),
        }
        assert_eq!(err.to_string(), "specialty with this name already exists");
        assert!(err.field_errors().unwrap().get("name").is_some());
    }

    #[test]
    fn test_classify_not_null_violation() {
        let db = Database::open_in_memory().unwrap();
        let err: DbError = db
            .conn()
            .execute(
                "INSERT INTO patients (name, national_id, birth_date) VALUES ('Maria', '1', NULL)",
                [],
            )
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::Required { entity: EntityKind::Patient, .. }));
    }

    #[test]
    fn test_exists_and_count() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.count(EntityKind::Exam).unwrap(), 0);
        db.conn()
            .execute("INSERT INTO exams (name) VALUES ('Blood count')", [])
            .unwrap();
        assert!(db.exists(EntityKind::Exam, 1).unwrap());
        assert!(!db.exists(EntityKind::Exam, 2).unwrap());
        assert_eq!(db.count(EntityKind::Exam).unwrap(), 1);
    }
}
