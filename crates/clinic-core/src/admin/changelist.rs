//! Changelist pages: the searched, filtered, ordered and paginated records
//! of one entity.

use chrono::{NaiveDate, Utc};
use rusqlite::{params_from_iter, ToSql};
use serde::{Deserialize, Serialize};

use super::cells::{fetch_rows, fields_of, select_expr, RecordRow};
use super::filters::{date_bounds, filter_condition, FilterValue};
use super::{AdminError, AdminResult, ModelAdmin, RecordBrowser};
use crate::models::{EntityKind, FieldKind, FieldMeta};

/// A drill-down position in the date hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateDrilldown {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl DateDrilldown {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            month: None,
            day: None,
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self {
            month: Some(month),
            ..Self::year(year)
        }
    }

    pub fn day(year: i32, month: u32, day: u32) -> Self {
        Self {
            day: Some(day),
            ..Self::month(year, month)
        }
    }

    /// Half-open range of dates covered, or `None` for an impossible date.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.month, self.day) {
            (None, None) => Some((
                NaiveDate::from_ymd_opt(self.year, 1, 1)?,
                NaiveDate::from_ymd_opt(self.year + 1, 1, 1)?,
            )),
            (Some(month), None) => {
                let start = NaiveDate::from_ymd_opt(self.year, month, 1)?;
                let end = if month == 12 {
                    NaiveDate::from_ymd_opt(self.year + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(self.year, month + 1, 1)?
                };
                Some((start, end))
            }
            (Some(month), Some(day)) => {
                let start = NaiveDate::from_ymd_opt(self.year, month, day)?;
                Some((start, start.succ_opt()?))
            }
            (None, Some(_)) => None,
        }
    }

    fn next_level(&self) -> Option<DateLevel> {
        match (self.month, self.day) {
            (None, _) => Some(DateLevel::Month),
            (Some(_), None) => Some(DateLevel::Day),
            (Some(_), Some(_)) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateLevel {
    Year,
    Month,
    Day,
}

impl DateLevel {
    /// 1-based `substr` position and length of this part in a stored date.
    fn substr(&self) -> (usize, usize) {
        match self {
            DateLevel::Year => (1, 4),
            DateLevel::Month => (6, 2),
            DateLevel::Day => (9, 2),
        }
    }
}

/// The values available one level below the current drill-down.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DateHierarchy {
    pub field: String,
    pub drilldown: Option<DateDrilldown>,
    /// `None` once a single day is selected
    pub level: Option<DateLevel>,
    pub values: Vec<i32>,
}

/// What the user asked a changelist for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListQuery {
    pub search: Option<String>,
    /// Selected list filters, by field name
    pub filters: Vec<(String, FilterValue)>,
    pub drilldown: Option<DateDrilldown>,
    /// A list column, `-` prefixed for descending order
    pub order_by: Option<String>,
    /// 1-based page number
    pub page: usize,
    /// Date relative filters count from, the current UTC date when unset
    pub today: Option<NaiveDate>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: None,
            filters: Vec::new(),
            drilldown: None,
            order_by: None,
            page: 1,
            today: None,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    pub fn drilldown(mut self, drilldown: DateDrilldown) -> Self {
        self.drilldown = Some(drilldown);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn as_of(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }
}

/// A changelist column header.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Column {
    pub field: String,
    pub label: String,
    pub sortable: bool,
}

/// One page of a changelist.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeList {
    pub entity: EntityKind,
    pub columns: Vec<Column>,
    pub rows: Vec<RecordRow>,
    /// Records matching the search and filters
    pub result_count: usize,
    /// Records of the entity overall
    pub full_count: usize,
    pub page: usize,
    pub num_pages: usize,
    /// Effective ordering, tie-breaker included
    pub ordering: Vec<String>,
    pub date_hierarchy: Option<DateHierarchy>,
}

impl ChangeList {
    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().map(|row| row.id).collect()
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Escape `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// SELECT being assembled over the root table `t0` and its joins.
struct SqlQuery {
    root: EntityKind,
    /// (lookup prefix, JOIN clause), aliased `j1`, `j2`, ... in order
    joins: Vec<(String, String)>,
    conditions: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl SqlQuery {
    fn new(root: EntityKind) -> Self {
        Self {
            root,
            joins: Vec::new(),
            conditions: Vec::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, condition: String, params: Vec<Box<dyn ToSql>>) {
        self.conditions.push(condition);
        self.params.extend(params);
    }

    /// Column expression for a `__` lookup path, joining tables as needed.
    fn lookup(&mut self, path: &str) -> AdminResult<String> {
        let root = self.root;
        let unknown = || AdminError::UnknownField {
            entity: root,
            field: path.to_string(),
        };
        let segments: Vec<&str> = path.split("__").collect();
        let (last, hops) = segments.split_last().ok_or_else(unknown)?;

        let mut meta = root.meta();
        let mut alias = "t0".to_string();
        let mut prefix = String::new();
        for hop in hops {
            let field = meta.field(hop).ok_or_else(unknown)?;
            let FieldKind::ForeignKey { to, .. } = field.kind else {
                return Err(unknown());
            };
            prefix.push_str(hop);
            prefix.push_str("__");

            let next = match self.joins.iter().position(|(p, _)| *p == prefix) {
                Some(i) => format!("j{}", i + 1),
                None => {
                    let next = format!("j{}", self.joins.len() + 1);
                    let join = format!(
                        "LEFT JOIN {} AS {} ON {}.id = {}.{}",
                        to.meta().table,
                        next,
                        next,
                        alias,
                        field.column
                    );
                    self.joins.push((prefix.clone(), join));
                    next
                }
            };
            alias = next;
            meta = to.meta();
        }

        let field = meta.field(last).ok_or_else(unknown)?;
        if field.kind.is_relation() {
            return Err(unknown());
        }
        Ok(format!("{}.{}", alias, field.column))
    }

    /// Every term must match at least one of `paths`.
    fn search(&mut self, paths: &[&str], search: &str) -> AdminResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let columns = paths
            .iter()
            .map(|path| self.lookup(path))
            .collect::<AdminResult<Vec<_>>>()?;

        for term in search.split_whitespace() {
            let pattern = format!("%{}%", escape_like(term));
            let any_column: Vec<String> = columns
                .iter()
                .map(|column| format!("{} LIKE ? ESCAPE '\\'", column))
                .collect();
            let params = columns
                .iter()
                .map(|_| Box::new(pattern.clone()) as Box<dyn ToSql>)
                .collect();
            self.push(format!("({})", any_column.join(" OR ")), params);
        }
        Ok(())
    }

    fn from_where(&self) -> String {
        let mut sql = format!("FROM {} AS t0", self.root.meta().table);
        for (_, join) in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }
}

fn field_or_unknown(kind: EntityKind, name: &str) -> AdminResult<&'static FieldMeta> {
    kind.meta().field(name).ok_or_else(|| AdminError::UnknownField {
        entity: kind,
        field: name.to_string(),
    })
}

/// The requested or declared ordering, always ending on the id.
fn effective_ordering(admin: &ModelAdmin, requested: Option<&str>) -> AdminResult<Vec<String>> {
    let mut ordering: Vec<String> = match requested {
        Some(order) => {
            let name = order.trim_start_matches('-');
            let sortable = admin.columns().contains(&name)
                && admin
                    .entity
                    .meta()
                    .field(name)
                    .map_or(false, |f| !matches!(f.kind, FieldKind::ManyToMany { .. }));
            if !sortable {
                return Err(AdminError::InvalidOrdering(order.to_string()));
            }
            vec![order.to_string()]
        }
        None => admin.ordering.iter().map(ToString::to_string).collect(),
    };
    if !ordering.iter().any(|o| o.trim_start_matches('-') == "id") {
        ordering.push("-id".to_string());
    }
    Ok(ordering)
}

fn order_clause(kind: EntityKind, ordering: &[String]) -> AdminResult<String> {
    let terms = ordering
        .iter()
        .map(|order| {
            let (name, direction) = match order.strip_prefix('-') {
                Some(name) => (name, "DESC"),
                None => (order.as_str(), "ASC"),
            };
            let field = field_or_unknown(kind, name)?;
            Ok(format!("t0.{} {}", field.column, direction))
        })
        .collect::<AdminResult<Vec<_>>>()?;
    Ok(terms.join(", "))
}

impl RecordBrowser<'_> {
    /// One page of `kind` records, as its admin declares them.
    pub fn changelist(&self, kind: EntityKind, query: &ListQuery) -> AdminResult<ChangeList> {
        let admin = self.admin(kind)?;
        let meta = kind.meta();
        let fields = fields_of(kind, admin.columns())?;
        let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
        let mut sql = SqlQuery::new(kind);

        if let Some(search) = query.search.as_deref() {
            sql.search(admin.search_fields, search)?;
        }

        for (name, value) in &query.filters {
            if !admin.list_filter.contains(&name.as_str()) {
                return Err(AdminError::InvalidFilter {
                    field: name.clone(),
                    reason: format!("not a list filter of {}", kind),
                });
            }
            let field = field_or_unknown(kind, name)?;
            let (condition, params) = filter_condition("t0", field, value, today)?;
            sql.push(condition, params);
        }

        let date_hierarchy = match (admin.date_hierarchy, query.drilldown) {
            (Some(name), drilldown) => {
                let field = field_or_unknown(kind, name)?;
                if let Some(drilldown) = drilldown {
                    let (start, end) = drilldown.bounds().ok_or_else(|| AdminError::InvalidFilter {
                        field: name.to_string(),
                        reason: format!("no such date: {:?}", drilldown),
                    })?;
                    let column = format!("t0.{}", field.column);
                    sql.push(
                        format!("{} >= ? AND {} < ?", column, column),
                        Vec::from(date_bounds(field, start, end)),
                    );
                }
                Some(self.date_hierarchy(&sql, field, drilldown)?)
            }
            (None, Some(_)) => {
                return Err(AdminError::InvalidFilter {
                    field: "date_hierarchy".into(),
                    reason: format!("{} has no date hierarchy", kind),
                })
            }
            (None, None) => None,
        };

        let full_count: i64 = self.db.conn().query_row(
            &format!("SELECT COUNT(*) FROM {}", meta.table),
            [],
            |row| row.get(0),
        )?;
        let result_count: i64 = self.db.conn().query_row(
            &format!("SELECT COUNT(*) {}", sql.from_where()),
            params_from_iter(sql.params.iter()),
            |row| row.get(0),
        )?;
        let result_count = result_count as usize;

        let num_pages = result_count.div_ceil(self.list_per_page).max(1);
        if query.page == 0 || query.page > num_pages {
            return Err(AdminError::InvalidPage {
                page: query.page,
                num_pages,
            });
        }

        let ordering = effective_ordering(admin, query.order_by.as_deref())?;
        let select: Vec<String> = fields.iter().map(|f| select_expr("t0", f)).collect();
        let page_sql = format!(
            "SELECT t0.id, {} {} ORDER BY {} LIMIT ? OFFSET ?",
            select.join(", "),
            sql.from_where(),
            order_clause(kind, &ordering)?
        );
        let mut params = sql.params;
        params.push(Box::new(self.list_per_page as i64));
        params.push(Box::new(((query.page - 1) * self.list_per_page) as i64));
        let rows = fetch_rows(self.db, &page_sql, &params, &fields)?;

        let columns = fields
            .iter()
            .map(|field| Column {
                field: field.name.to_string(),
                label: capitalize(field.verbose_name),
                sortable: !matches!(field.kind, FieldKind::ManyToMany { .. }),
            })
            .collect();

        tracing::debug!(
            entity = kind.as_str(),
            result_count,
            page = query.page,
            "changelist built"
        );

        Ok(ChangeList {
            entity: kind,
            columns,
            rows,
            result_count,
            full_count: full_count as usize,
            page: query.page,
            num_pages,
            ordering,
            date_hierarchy,
        })
    }

    fn date_hierarchy(
        &self,
        sql: &SqlQuery,
        field: &FieldMeta,
        drilldown: Option<DateDrilldown>,
    ) -> AdminResult<DateHierarchy> {
        let level = match drilldown {
            Some(drilldown) => drilldown.next_level(),
            None => Some(DateLevel::Year),
        };

        let mut values = Vec::new();
        if let Some(level) = level {
            let (start, len) = level.substr();
            let query = format!(
                "SELECT DISTINCT CAST(substr(t0.{}, {}, {}) AS INTEGER) {} ORDER BY 1",
                field.column,
                start,
                len,
                sql.from_where()
            );
            let mut stmt = self.db.conn().prepare(&query)?;
            let rows = stmt.query_map(params_from_iter(sql.params.iter()), |row| {
                row.get::<_, Option<i32>>(0)
            })?;
            for value in rows {
                if let Some(value) = value? {
                    values.push(value);
                }
            }
        }

        Ok(DateHierarchy {
            field: field.name.to_string(),
            drilldown,
            level,
            values,
        })
    }
}
