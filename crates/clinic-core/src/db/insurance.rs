//! Insurance plan database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{EntityKind, InsurancePlan, InsurancePlanForm};

const PLAN_COLUMNS: &str = "id, name, tax_id, phone, email, active";

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<InsurancePlan> {
    Ok(InsurancePlan {
        id: row.get(0)?,
        name: row.get(1)?,
        tax_id: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        active: row.get(5)?,
    })
}

impl Database {
    /// Insert a new insurance plan.
    pub fn insert_insurance_plan(&self, form: &InsurancePlanForm) -> DbResult<InsurancePlan> {
        let form = &form.cleaned();
        form.validate()?;
        self.conn.execute(
            r#"
            INSERT INTO insurance_plans (name, tax_id, phone, email, active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![form.name, form.tax_id, form.phone, form.email, form.active],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(insurance_plan_id = id, "insurance plan inserted");
        self.get_insurance_plan(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::InsurancePlan, id))
    }

    /// Update an existing insurance plan.
    pub fn update_insurance_plan(&self, id: i64, form: &InsurancePlanForm) -> DbResult<InsurancePlan> {
        let form = &form.cleaned();
        form.validate()?;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE insurance_plans SET
                name = ?2,
                tax_id = ?3,
                phone = ?4,
                email = ?5,
                active = ?6
            WHERE id = ?1
            "#,
            params![id, form.name, form.tax_id, form.phone, form.email, form.active],
        )?;
        if rows_affected == 0 {
            return Err(DbError::not_found(EntityKind::InsurancePlan, id));
        }
        self.get_insurance_plan(id)?
            .ok_or_else(|| DbError::not_found(EntityKind::InsurancePlan, id))
    }

    /// Get an insurance plan by ID.
    pub fn get_insurance_plan(&self, id: i64) -> DbResult<Option<InsurancePlan>> {
        let sql = format!("SELECT {} FROM insurance_plans WHERE id = ?", PLAN_COLUMNS);
        self.conn
            .query_row(&sql, [id], plan_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Get an insurance plan by tax ID.
    pub fn get_insurance_plan_by_tax_id(&self, tax_id: &str) -> DbResult<Option<InsurancePlan>> {
        let sql = format!("SELECT {} FROM insurance_plans WHERE tax_id = ?", PLAN_COLUMNS);
        self.conn
            .query_row(&sql, [tax_id], plan_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// List insurance plans by name.
    pub fn list_insurance_plans(&self, active_only: bool) -> DbResult<Vec<InsurancePlan>> {
        let sql = if active_only {
            format!("SELECT {} FROM insurance_plans WHERE active = 1 ORDER BY name", PLAN_COLUMNS)
        } else {
            format!("SELECT {} FROM insurance_plans ORDER BY name", PLAN_COLUMNS)
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], plan_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete an insurance plan. Enrolled patients keep their records with no plan.
    pub fn delete_insurance_plan(&self, id: i64) -> DbResult<()> {
        self.delete_record(EntityKind::InsurancePlan, id).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();
        let mut form = InsurancePlanForm::new("Vida Plena", "12.345.678/0001-90");
        form.phone = "(11) 4000-1000".into();

        let plan = db.insert_insurance_plan(&form).unwrap();
        assert!(plan.active);

        let by_tax_id = db
            .get_insurance_plan_by_tax_id("12.345.678/0001-90")
            .unwrap()
            .unwrap();
        assert_eq!(by_tax_id.id, plan.id);
        assert_eq!(by_tax_id.phone, "(11) 4000-1000");
    }

    #[test]
    fn test_list_active_only() {
        let db = setup_db();
        db.insert_insurance_plan(&InsurancePlanForm::new("Vida Plena", "1"))
            .unwrap();
        let mut inactive = InsurancePlanForm::new("Saude Total", "2");
        inactive.active = false;
        db.insert_insurance_plan(&inactive).unwrap();

        assert_eq!(db.list_insurance_plans(true).unwrap().len(), 1);
        assert_eq!(db.list_insurance_plans(false).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_name_and_tax_id() {
        let db = setup_db();
        db.insert_insurance_plan(&InsurancePlanForm::new("Vida Plena", "1"))
            .unwrap();

        let err = db
            .insert_insurance_plan(&InsurancePlanForm::new("Vida Plena", "2"))
            .unwrap_err();
        assert!(matches!(err, DbError::Unique { field, .. } if field.name == "name"));

        let err = db
            .insert_insurance_plan(&InsurancePlanForm::new("Saude Total", "1"))
            .unwrap_err();
        assert!(matches!(err, DbError::Unique { field, .. } if field.name == "tax_id"));
    }
}
