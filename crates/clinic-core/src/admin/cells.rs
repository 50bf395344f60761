//! Typed cell values shown in changelists and inline rows.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params_from_iter, Row, ToSql};
use rust_decimal::Decimal;
use serde::Serialize;

use super::AdminResult;
use crate::db::Database;
use crate::models::{cents_to_decimal, EntityKind, FieldKind, FieldMeta};

/// A related record, by id and display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedItem {
    pub id: i64,
    pub label: String,
}

/// One rendered field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Empty,
    Integer(i64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Money(Decimal),
    Choice { value: String, label: String },
    Related(RelatedItem),
    Many(Vec<RelatedItem>),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => f.write_str("-"),
            Cell::Integer(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
            Cell::Bool(true) => f.write_str("Yes"),
            Cell::Bool(false) => f.write_str("No"),
            Cell::Date(d) => write!(f, "{}", d.format("%d/%m/%Y")),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%d/%m/%Y %H:%M")),
            Cell::Money(value) => write!(f, "{:.2}", value),
            Cell::Choice { label, .. } => f.write_str(label),
            Cell::Related(item) => f.write_str(&item.label),
            Cell::Many(items) => {
                let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
                f.write_str(&labels.join(", "))
            }
        }
    }
}

/// A record's id with its rendered fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRow {
    pub id: i64,
    pub cells: Vec<Cell>,
}

impl RecordRow {
    pub fn texts(&self) -> Vec<String> {
        self.cells.iter().map(ToString::to_string).collect()
    }
}

/// SQL expression selecting the raw value of `field` from `alias`.
pub(crate) fn select_expr(alias: &str, field: &FieldMeta) -> String {
    match field.kind {
        // Filled in by `resolve_relations`
        FieldKind::ManyToMany { .. } => "NULL".to_string(),
        _ => format!("{}.{}", alias, field.column),
    }
}

/// Read a raw cell. Related labels are left blank.
pub(crate) fn read_cell(row: &Row<'_>, idx: usize, field: &FieldMeta) -> rusqlite::Result<Cell> {
    Ok(match field.kind {
        FieldKind::Id => Cell::Integer(row.get(idx)?),
        FieldKind::Text | FieldKind::LongText | FieldKind::Email => {
            row.get::<_, Option<String>>(idx)?.map_or(Cell::Empty, Cell::Text)
        }
        FieldKind::Bool => Cell::Bool(row.get(idx)?),
        FieldKind::Date => row.get::<_, Option<NaiveDate>>(idx)?.map_or(Cell::Empty, Cell::Date),
        FieldKind::DateTime => row
            .get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(Cell::Empty, Cell::DateTime),
        FieldKind::Money => Cell::Money(cents_to_decimal(row.get(idx)?)),
        FieldKind::Choice(choices) => {
            let value: String = row.get(idx)?;
            let label = choices
                .iter()
                .find(|(v, _)| *v == value)
                .map_or_else(|| value.clone(), |(_, label)| label.to_string());
            Cell::Choice { value, label }
        }
        FieldKind::ForeignKey { .. } => row
            .get::<_, Option<i64>>(idx)?
            .map_or(Cell::Empty, |id| {
                Cell::Related(RelatedItem {
                    id,
                    label: String::new(),
                })
            }),
        FieldKind::ManyToMany { .. } => Cell::Many(Vec::new()),
    })
}

fn related_ids(db: &Database, field: &FieldMeta, id: i64) -> AdminResult<Vec<i64>> {
    let FieldKind::ManyToMany {
        through,
        source_column,
        target_column,
        ..
    } = field.kind
    else {
        return Ok(Vec::new());
    };
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ? ORDER BY {}",
        target_column, through, source_column, target_column
    );
    let mut stmt = db.conn().prepare(&sql)?;
    let rows = stmt.query_map([id], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<i64>, _>>()?)
}

/// Fill in the labels of foreign key cells and the members of many-to-many cells.
pub(crate) fn resolve_relations(
    db: &Database,
    fields: &[&'static FieldMeta],
    rows: &mut [RecordRow],
) -> AdminResult<()> {
    for row in rows.iter_mut() {
        for (field, cell) in fields.iter().zip(row.cells.iter_mut()) {
            match (field.kind, cell) {
                (FieldKind::ForeignKey { to, .. }, Cell::Related(item)) => {
                    item.label = db.display_label(to, item.id)?;
                }
                (FieldKind::ManyToMany { to, .. }, Cell::Many(items)) => {
                    for id in related_ids(db, field, row.id)? {
                        items.push(RelatedItem {
                            id,
                            label: db.display_label(to, id)?,
                        });
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Run a query whose first column is the record id and whose remaining
/// columns are `fields`, then resolve related labels.
pub(crate) fn fetch_rows(
    db: &Database,
    sql: &str,
    params: &[Box<dyn ToSql>],
    fields: &[&'static FieldMeta],
) -> AdminResult<Vec<RecordRow>> {
    let mut stmt = db.conn().prepare(sql)?;
    let mapped = stmt.query_map(params_from_iter(params.iter()), |row| {
        let id = row.get(0)?;
        let cells = fields
            .iter()
            .enumerate()
            .map(|(i, field)| read_cell(row, i + 1, field))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(RecordRow { id, cells })
    })?;
    let mut rows = mapped.collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    resolve_relations(db, fields, &mut rows)?;
    Ok(rows)
}

/// Field metadata for `names` on `kind`.
pub(crate) fn fields_of(kind: EntityKind, names: &[&str]) -> AdminResult<Vec<&'static FieldMeta>> {
    names
        .iter()
        .map(|name| {
            kind.meta()
                .field(name)
                .ok_or_else(|| super::AdminError::UnknownField {
                    entity: kind,
                    field: name.to_string(),
                })
        })
        .collect()
}
