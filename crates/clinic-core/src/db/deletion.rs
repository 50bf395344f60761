//! Generic delete with cascade, set-null and protect rules.
//!
//! The consequences of a delete are collected from field metadata before
//! anything is removed. A protected reference aborts the whole delete; the
//! row removal itself relies on the `ON DELETE` actions in the schema.

use std::collections::BTreeMap;

use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use super::{record_exists, Database, DbError, DbResult};
use crate::models::{incoming_relations, EntityKind, FieldKind, OnDelete};

/// Records that block a delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtectedReference {
    pub entity: EntityKind,
    /// Field on `entity` that holds the reference
    pub field: String,
    pub ids: Vec<i64>,
}

impl std::fmt::Display for ProtectedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = self.entity.meta();
        let noun = if self.ids.len() == 1 {
            meta.verbose_name
        } else {
            meta.verbose_name_plural
        };
        write!(f, "{} {} (via {})", self.ids.len(), noun, self.field)
    }
}

pub(crate) fn describe_references(references: &[ProtectedReference]) -> String {
    references
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything a delete would touch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionPlan {
    pub entity: EntityKind,
    pub id: i64,
    /// Records removed along with the target, by entity
    pub cascaded: BTreeMap<EntityKind, Vec<i64>>,
    /// Records whose reference to the target is cleared
    pub nullified: BTreeMap<EntityKind, Vec<i64>>,
    /// Many-to-many link rows removed
    pub unlinked: usize,
    pub protected: Vec<ProtectedReference>,
}

impl DeletionPlan {
    pub fn is_blocked(&self) -> bool {
        !self.protected.is_empty()
    }

    pub fn cascaded_count(&self, kind: EntityKind) -> usize {
        self.cascaded.get(&kind).map_or(0, Vec::len)
    }

    pub fn nullified_count(&self, kind: EntityKind) -> usize {
        self.nullified.get(&kind).map_or(0, Vec::len)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn ids_where(conn: &Connection, table: &str, column: &str, ids: &[i64]) -> DbResult<Vec<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE {} IN ({}) ORDER BY id",
        table,
        column,
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| row.get(0))?;
    rows.collect::<Result<Vec<i64>, _>>().map_err(Into::into)
}

fn count_where(conn: &Connection, table: &str, column: &str, ids: &[i64]) -> DbResult<usize> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} IN ({})",
        table,
        column,
        placeholders(ids.len())
    );
    let count: i64 = conn.query_row(&sql, params_from_iter(ids.iter()), |row| row.get(0))?;
    Ok(count as usize)
}

fn collect(conn: &Connection, kind: EntityKind, ids: &[i64], plan: &mut DeletionPlan) -> DbResult<()> {
    if ids.is_empty() {
        return Ok(());
    }

    for relation in incoming_relations(kind) {
        let table = relation.from.meta().table;
        let referencing = ids_where(conn, table, relation.field.column, ids)?;
        if referencing.is_empty() {
            continue;
        }

        match relation.on_delete {
            OnDelete::Protect => plan.protected.push(ProtectedReference {
                entity: relation.from,
                field: relation.field.name.to_string(),
                ids: referencing,
            }),
            OnDelete::SetNull => plan
                .nullified
                .entry(relation.from)
                .or_default()
                .extend(referencing),
            OnDelete::Cascade => {
                plan.cascaded
                    .entry(relation.from)
                    .or_default()
                    .extend(referencing.iter().copied());
                collect(conn, relation.from, &referencing, plan)?;
            }
        }
    }

    // Link rows on either side of a many-to-many relation go with the record
    for owner in EntityKind::ALL {
        for field in owner.meta().fields {
            if let FieldKind::ManyToMany {
                to,
                through,
                source_column,
                target_column,
            } = field.kind
            {
                if owner == kind {
                    plan.unlinked += count_where(conn, through, source_column, ids)?;
                }
                if to == kind {
                    plan.unlinked += count_where(conn, through, target_column, ids)?;
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn plan_deletion(conn: &Connection, kind: EntityKind, id: i64) -> DbResult<DeletionPlan> {
    if !record_exists(conn, kind, id)? {
        return Err(DbError::not_found(kind, id));
    }
    let mut plan = DeletionPlan {
        entity: kind,
        id,
        cascaded: BTreeMap::new(),
        nullified: BTreeMap::new(),
        unlinked: 0,
        protected: Vec::new(),
    };
    collect(conn, kind, &[id], &mut plan)?;
    Ok(plan)
}

pub(crate) fn delete_in(conn: &Connection, kind: EntityKind, id: i64) -> DbResult<DeletionPlan> {
    let plan = plan_deletion(conn, kind, id)?;
    if plan.is_blocked() {
        tracing::warn!(
            entity = kind.as_str(),
            id,
            references = %describe_references(&plan.protected),
            "delete rejected by protected references"
        );
        return Err(DbError::Protected {
            entity: kind,
            id,
            references: plan.protected,
        });
    }

    let sql = format!("DELETE FROM {} WHERE id = ?", kind.meta().table);
    conn.execute(&sql, [id])?;
    Ok(plan)
}

impl Database {
    /// What deleting a record would cascade to, clear, or be blocked by.
    pub fn delete_preview(&self, kind: EntityKind, id: i64) -> DbResult<DeletionPlan> {
        plan_deletion(&self.conn, kind, id)
    }

    /// Delete a record, applying the delete rules of every relation pointing at it.
    ///
    /// Fails with [`DbError::Protected`] and changes nothing while any
    /// protecting reference exists.
    pub fn delete_record(&self, kind: EntityKind, id: i64) -> DbResult<DeletionPlan> {
        let tx = self.conn.unchecked_transaction()?;
        let plan = delete_in(&tx, kind, id)?;
        tx.commit()?;

        tracing::info!(
            entity = kind.as_str(),
            id,
            cascaded = plan.cascaded.values().map(Vec::len).sum::<usize>(),
            nullified = plan.nullified.values().map(Vec::len).sum::<usize>(),
            "record deleted"
        );
        Ok(plan)
    }
}
