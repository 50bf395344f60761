//! Administrative record browser.
//!
//! Declarations: [`ModelAdmin`] per entity, collected in [`AdminSite`]
//! Browser: changelists, list filters, the encounter form with inline rows

mod cells;
mod changelist;
mod filters;
mod forms;
mod site;

pub use cells::*;
pub use changelist::*;
pub use filters::*;
pub use forms::*;
pub use site::*;

use serde::Serialize;
use thiserror::Error;

use crate::config::{ClinicConfig, DEFAULT_LIST_PER_PAGE};
use crate::db::{Database, DbError, DbResult, DeletionPlan};
use crate::models::EntityKind;
use crate::validation::ValidationErrors;

/// Admin errors.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("{0} is not registered with the admin")]
    NotRegistered(EntityKind),

    #[error("Unknown field {field:?} on {entity}")]
    UnknownField { entity: EntityKind, field: String },

    #[error("Invalid filter on {field}: {reason}")]
    InvalidFilter { field: String, reason: String },

    #[error("Cannot order by {0:?}")]
    InvalidOrdering(String),

    #[error("Invalid page {page} (of {num_pages})")]
    InvalidPage { page: usize, num_pages: usize },
}

impl From<rusqlite::Error> for AdminError {
    fn from(e: rusqlite::Error) -> Self {
        AdminError::Database(e.into())
    }
}

impl From<ValidationErrors> for AdminError {
    fn from(e: ValidationErrors) -> Self {
        AdminError::Database(e.into())
    }
}

impl AdminError {
    /// Per-field form errors, if the failure belongs to form fields.
    pub fn field_errors(&self) -> Option<ValidationErrors> {
        match self {
            AdminError::Database(e) => e.field_errors(),
            _ => None,
        }
    }
}

pub type AdminResult<T> = Result<T, AdminError>;

/// An inline child entity edited on its parent's form.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InlineAdmin {
    pub entity: EntityKind,
    /// Foreign key field on `entity` pointing at the parent
    pub parent_field: &'static str,
    pub fields: &'static [&'static str],
    pub readonly_fields: &'static [&'static str],
    /// Blank rows offered for new children
    pub extra: usize,
}

/// How one entity is presented by the admin.
///
/// Field names refer to [`crate::models::FieldMeta::name`]. Search fields may
/// follow foreign keys with `__`; ordering entries take a `-` prefix for
/// descending order.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelAdmin {
    pub entity: EntityKind,
    pub list_display: &'static [&'static str],
    pub list_filter: &'static [&'static str],
    pub search_fields: &'static [&'static str],
    pub ordering: &'static [&'static str],
    pub date_hierarchy: Option<&'static str>,
    /// Form fields in display order. Empty means every editable field.
    pub fields: &'static [&'static str],
    pub readonly_fields: &'static [&'static str],
    pub inlines: &'static [InlineAdmin],
    /// Many-to-many fields shown with the two-pane selector
    pub filter_horizontal: &'static [&'static str],
}

impl ModelAdmin {
    pub const fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            list_display: &[],
            list_filter: &[],
            search_fields: &[],
            ordering: &[],
            date_hierarchy: None,
            fields: &[],
            readonly_fields: &[],
            inlines: &[],
            filter_horizontal: &[],
        }
    }

    /// Columns of the changelist. Falls back to the record label.
    pub fn columns(&self) -> &'static [&'static str] {
        if self.list_display.is_empty() {
            &["id"]
        } else {
            self.list_display
        }
    }

    /// Names of the fields on the change form.
    pub fn form_fields(&self) -> Vec<&'static str> {
        if !self.fields.is_empty() {
            return self.fields.to_vec();
        }
        self.entity
            .meta()
            .fields
            .iter()
            .filter(|f| f.editable)
            .map(|f| f.name)
            .collect()
    }

    pub fn is_readonly(&self, field: &str) -> bool {
        self.readonly_fields.contains(&field)
            || self
                .entity
                .meta()
                .field(field)
                .map_or(false, |f| !f.editable)
    }
}

/// Reads and edits records the way the admin declarations describe.
pub struct RecordBrowser<'a> {
    db: &'a Database,
    site: &'a AdminSite,
    list_per_page: usize,
}

impl<'a> RecordBrowser<'a> {
    /// Browse `db` with the clinic's registrations.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            site: &CLINIC_SITE,
            list_per_page: DEFAULT_LIST_PER_PAGE,
        }
    }

    pub fn with_config(db: &'a Database, config: &ClinicConfig) -> Self {
        Self::new(db).with_per_page(config.list_per_page)
    }

    pub fn with_site(mut self, site: &'a AdminSite) -> Self {
        self.site = site;
        self
    }

    pub fn with_per_page(mut self, list_per_page: usize) -> Self {
        self.list_per_page = list_per_page.max(1);
        self
    }

    pub fn list_per_page(&self) -> usize {
        self.list_per_page
    }

    fn admin(&self, kind: EntityKind) -> AdminResult<&'a ModelAdmin> {
        self.site.get(kind).ok_or(AdminError::NotRegistered(kind))
    }

    /// What deleting a record would cascade to, clear, or be blocked by.
    pub fn delete_preview(&self, kind: EntityKind, id: i64) -> DbResult<DeletionPlan> {
        self.db.delete_preview(kind, id)
    }

    /// Delete a record with its dependents, unless something protects it.
    pub fn delete_record(&self, kind: EntityKind, id: i64) -> DbResult<DeletionPlan> {
        self.db.delete_record(kind, id)
    }
}
