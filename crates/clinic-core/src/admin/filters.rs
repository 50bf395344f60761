//! List filters and the choices each one offers.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use super::{AdminError, AdminResult, RecordBrowser};
use crate::models::{EntityKind, FieldKind, FieldMeta};

/// Date ranges offered by date filters, relative to today.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    Today,
    PastSevenDays,
    ThisMonth,
    ThisYear,
}

impl DateRange {
    pub const ALL: [DateRange; 4] = [
        DateRange::Today,
        DateRange::PastSevenDays,
        DateRange::ThisMonth,
        DateRange::ThisYear,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DateRange::Today => "Today",
            DateRange::PastSevenDays => "Past 7 days",
            DateRange::ThisMonth => "This month",
            DateRange::ThisYear => "This year",
        }
    }

    /// Half-open `[start, end)` range of dates.
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let tomorrow = today + Duration::days(1);
        match self {
            DateRange::Today => (today, tomorrow),
            DateRange::PastSevenDays => (today - Duration::days(7), tomorrow),
            DateRange::ThisMonth => {
                let start = today.with_day(1).unwrap_or(today);
                let end = if today.month() == 12 {
                    NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
                };
                (start, end.unwrap_or(tomorrow))
            }
            DateRange::ThisYear => {
                let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                let end = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).unwrap_or(tomorrow);
                (start, end)
            }
        }
    }
}

/// A selected filter value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Bool(bool),
    Choice(String),
    /// Foreign key equal to, or many-to-many containing, this id
    Related(i64),
    /// No related record
    IsNull,
    DateRange(DateRange),
}

/// One option of a list filter.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterChoice {
    pub label: String,
    pub value: FilterValue,
}

impl FilterChoice {
    fn new(label: impl Into<String>, value: FilterValue) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

fn mismatch(field: &FieldMeta, value: &FilterValue) -> AdminError {
    AdminError::InvalidFilter {
        field: field.name.to_string(),
        reason: format!("{:?} does not apply to this field", value),
    }
}

/// Bounds of a date range as bindable values for a date or date-time column.
pub(crate) fn date_bounds(field: &FieldMeta, start: NaiveDate, end: NaiveDate) -> [Box<dyn ToSql>; 2] {
    if let FieldKind::DateTime = field.kind {
        let at_midnight = |date: NaiveDate| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let start: Box<dyn ToSql> = Box::new(at_midnight(start));
        let end: Box<dyn ToSql> = Box::new(at_midnight(end));
        [start, end]
    } else {
        let start: Box<dyn ToSql> = Box::new(start);
        let end: Box<dyn ToSql> = Box::new(end);
        [start, end]
    }
}

/// SQL condition and parameters selecting rows of `alias` where `field` matches `value`.
pub(crate) fn filter_condition(
    alias: &str,
    field: &FieldMeta,
    value: &FilterValue,
    today: NaiveDate,
) -> AdminResult<(String, Vec<Box<dyn ToSql>>)> {
    let column = format!("{}.{}", alias, field.column);
    let condition = match (field.kind, value) {
        (FieldKind::Bool, FilterValue::Bool(b)) => {
            (format!("{} = ?", column), vec![Box::new(*b) as Box<dyn ToSql>])
        }
        (FieldKind::Choice(choices), FilterValue::Choice(choice)) => {
            if !choices.iter().any(|(v, _)| *v == choice.as_str()) {
                return Err(AdminError::InvalidFilter {
                    field: field.name.to_string(),
                    reason: format!("{:?} is not one of the available choices", choice),
                });
            }
            (format!("{} = ?", column), vec![Box::new(choice.clone()) as Box<dyn ToSql>])
        }
        (FieldKind::ForeignKey { .. }, FilterValue::Related(id)) => {
            (format!("{} = ?", column), vec![Box::new(*id) as Box<dyn ToSql>])
        }
        (FieldKind::ForeignKey { .. }, FilterValue::IsNull) if !field.required => {
            (format!("{} IS NULL", column), Vec::new())
        }
        (
            FieldKind::ManyToMany {
                through,
                source_column,
                target_column,
                ..
            },
            FilterValue::Related(id),
        ) => (
            format!(
                "{}.id IN (SELECT {} FROM {} WHERE {} = ?)",
                alias, source_column, through, target_column
            ),
            vec![Box::new(*id) as Box<dyn ToSql>],
        ),
        (
            FieldKind::ManyToMany {
                through,
                source_column,
                ..
            },
            FilterValue::IsNull,
        ) => (
            format!("{}.id NOT IN (SELECT {} FROM {})", alias, source_column, through),
            Vec::new(),
        ),
        (FieldKind::Date | FieldKind::DateTime, FilterValue::DateRange(range)) => {
            let (start, end) = range.bounds(today);
            (
                format!("{} >= ? AND {} < ?", column, column),
                Vec::from(date_bounds(field, start, end)),
            )
        }
        _ => return Err(mismatch(field, value)),
    };
    Ok(condition)
}

impl RecordBrowser<'_> {
    /// The options offered by the list filter on `field`.
    pub fn filter_choices(&self, kind: EntityKind, field: &str) -> AdminResult<Vec<FilterChoice>> {
        let admin = self.admin(kind)?;
        if !admin.list_filter.contains(&field) {
            return Err(AdminError::InvalidFilter {
                field: field.to_string(),
                reason: format!("not a list filter of {}", kind),
            });
        }
        let meta = kind.meta().field(field).ok_or_else(|| AdminError::UnknownField {
            entity: kind,
            field: field.to_string(),
        })?;

        let choices = match meta.kind {
            FieldKind::Bool => vec![
                FilterChoice::new("Yes", FilterValue::Bool(true)),
                FilterChoice::new("No", FilterValue::Bool(false)),
            ],
            FieldKind::Choice(choices) => choices
                .iter()
                .map(|(value, label)| FilterChoice::new(*label, FilterValue::Choice(value.to_string())))
                .collect(),
            FieldKind::ForeignKey { to, .. } => {
                let mut choices = self.related_choices(to)?;
                if !meta.required {
                    choices.push(FilterChoice::new("-", FilterValue::IsNull));
                }
                choices
            }
            FieldKind::ManyToMany { to, .. } => {
                let mut choices = self.related_choices(to)?;
                choices.push(FilterChoice::new("-", FilterValue::IsNull));
                choices
            }
            FieldKind::Date | FieldKind::DateTime => DateRange::ALL
                .iter()
                .map(|range| FilterChoice::new(range.label(), FilterValue::DateRange(*range)))
                .collect(),
            _ => {
                return Err(AdminError::InvalidFilter {
                    field: field.to_string(),
                    reason: "field cannot be filtered".into(),
                })
            }
        };
        Ok(choices)
    }

    /// Every record of `kind`, by label.
    fn related_choices(&self, kind: EntityKind) -> AdminResult<Vec<FilterChoice>> {
        let sql = format!("SELECT id FROM {} ORDER BY id", kind.meta().table);
        let mut stmt = self.db.conn().prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut choices = Vec::with_capacity(ids.len());
        for id in ids {
            let label = self.db.display_label(kind, id)?;
            choices.push(FilterChoice::new(label, FilterValue::Related(id)));
        }
        choices.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(choices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_bounds() {
        let today = date(2025, 12, 31);
        assert_eq!(DateRange::Today.bounds(today), (today, date(2026, 1, 1)));
        assert_eq!(
            DateRange::PastSevenDays.bounds(today),
            (date(2025, 12, 24), date(2026, 1, 1))
        );
        assert_eq!(
            DateRange::ThisMonth.bounds(today),
            (date(2025, 12, 1), date(2026, 1, 1))
        );
        assert_eq!(
            DateRange::ThisYear.bounds(date(2024, 2, 29)),
            (date(2024, 1, 1), date(2025, 1, 1))
        );
        assert_eq!(
            DateRange::ThisMonth.bounds(date(2024, 2, 29)),
            (date(2024, 2, 1), date(2024, 3, 1))
        );
    }

    #[test]
    fn test_condition_rejects_mismatch() {
        let status = EntityKind::Encounter.meta().field("status").unwrap();
        let today = date(2025, 3, 2);
        assert!(filter_condition("t0", status, &FilterValue::Bool(true), today).is_err());
        assert!(filter_condition("t0", status, &FilterValue::Choice("lost".into()), today).is_err());

        let (sql, params) =
            filter_condition("t0", status, &FilterValue::Choice("seen".into()), today).unwrap();
        assert_eq!(sql, "t0.status = ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_is_null_only_on_optional_keys() {
        let today = date(2025, 3, 2);
        let doctor = EntityKind::Encounter.meta().field("doctor").unwrap();
        assert!(filter_condition("t0", doctor, &FilterValue::IsNull, today).is_err());

        let plan = EntityKind::Patient.meta().field("insurance_plan").unwrap();
        let (sql, _) = filter_condition("t0", plan, &FilterValue::IsNull, today).unwrap();
        assert_eq!(sql, "t0.insurance_plan_id IS NULL");
    }

    #[test]
    fn test_filter_value_json() {
        let value: FilterValue =
            serde_json::from_str(r#"{"kind":"date_range","value":"past_seven_days"}"#).unwrap();
        assert_eq!(value, FilterValue::DateRange(DateRange::PastSevenDays));
    }
}
