//! The derived view: the filtered, sorted and summed projection of the canonical records.
//!
//! Everything here is a pure function of `(records, filters, options)`. Nothing is cached.

use crate::model::{
    value_text, Amount, Direction, Filters, Record, SortBy, AMOUNT, CATEGORY, DATE, NAME,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Which records the total is summed over.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalOver {
    /// Sum over the filtered records.
    #[default]
    Visible,
    /// Sum over every record, regardless of the active filters.
    Canonical,
}

serde_plain::derive_display_from_serialize!(TotalOver);
serde_plain::derive_fromstr_from_deserialize!(TotalOver);

/// Per-instance settings for the derived view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ViewOptions {
    /// The text fields `search_term` is matched against.
    pub search_fields: Vec<String>,
    /// Fields compared as instants when sorting. `date` is always one of them.
    pub date_fields: Vec<String>,
    pub total_over: TotalOver,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            search_fields: vec![NAME.to_string(), CATEGORY.to_string()],
            date_fields: vec![DATE.to_string()],
            total_over: TotalOver::default(),
        }
    }
}

/// The records to display and their total.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct View {
    visible: Vec<Record>,
    total: Amount,
}

impl View {
    pub fn visible(&self) -> &[Record] {
        &self.visible
    }

    pub fn into_visible(self) -> Vec<Record> {
        self.visible
    }

    pub fn total(&self) -> Amount {
        self.total
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }
}

/// Filters, sorts and sums `records`. The input order is the canonical order; it is only changed
/// by a recognized `sort_by`, and the sort is stable.
pub fn derive<'a, I>(records: I, filters: &Filters, options: &ViewOptions) -> View
where
    I: IntoIterator<Item = &'a Record>,
    I::IntoIter: Clone,
{
    let records = records.into_iter();
    let needle = filters.search_term.to_lowercase();

    let mut visible: Vec<&Record> = records
        .clone()
        .filter(|r| needle.is_empty() || matches_search(r, &needle, &options.search_fields))
        .filter(|r| filters.category.is_empty() || r.category() == filters.category)
        .filter(|r| {
            filters
                .equals
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .all(|(field, value)| r.text(field).as_deref() == Some(value.as_str()))
        })
        .collect();

    if let SortBy::Field { field, direction } = &filters.sort_by {
        sort(&mut visible, field, *direction, options);
    }

    let total = match options.total_over {
        TotalOver::Visible => visible.iter().map(|r| r.amount()).sum(),
        TotalOver::Canonical => records.map(|r| r.amount()).sum(),
    };

    View {
        visible: visible.into_iter().cloned().collect(),
        total,
    }
}

fn matches_search(record: &Record, needle: &str, fields: &[String]) -> bool {
    fields.iter().any(|field| {
        record
            .text(field)
            .is_some_and(|text| text.to_lowercase().contains(needle))
    })
}

/// The value a record is ordered by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Instant(i64),
    Number(Decimal),
    /// Text orders by its Unicode lowercase fold and then by the raw text. There is no
    /// locale-specific collation.
    Text { folded: String, raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Date,
    Number,
    Text,
}

fn sort(records: &mut Vec<&Record>, field: &str, direction: Direction, options: &ViewOptions) {
    let kind = field_kind(records, field, options);
    let mut keyed: Vec<(SortKey, &Record)> = records
        .iter()
        .map(|r| (sort_key(r, field, kind), *r))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = a.cmp(b);
        match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    });
    *records = keyed.into_iter().map(|(_, r)| r).collect();
}

/// Dates are named by configuration, `amount` is always numeric, and any other field is numeric
/// when every record that has it holds a JSON number there.
fn field_kind(records: &[&Record], field: &str, options: &ViewOptions) -> FieldKind {
    if field == DATE || options.date_fields.iter().any(|f| f == field) {
        return FieldKind::Date;
    }
    if field == AMOUNT {
        return FieldKind::Number;
    }
    let mut present = records.iter().filter_map(|r| r.value(field)).peekable();
    if present.peek().is_none() {
        return FieldKind::Text;
    }
    if present.all(|v| v.is_number()) {
        FieldKind::Number
    } else {
        FieldKind::Text
    }
}

fn sort_key(record: &Record, field: &str, kind: FieldKind) -> SortKey {
    match kind {
        FieldKind::Date => SortKey::Instant(
            record
                .text(field)
                .map(|s| instant_millis(&s))
                .unwrap_or_default(),
        ),
        FieldKind::Number => SortKey::Number(number(record, field)),
        FieldKind::Text => {
            let raw = record.text(field).map(|s| s.into_owned()).unwrap_or_default();
            SortKey::Text {
                folded: raw.to_lowercase(),
                raw,
            }
        }
    }
}

fn number(record: &Record, field: &str) -> Decimal {
    if field == AMOUNT {
        return record.amount().value();
    }
    match record.value(field) {
        Some(Value::Number(n)) => Amount::from_json(&Value::Number(n)).value(),
        Some(other) => value_text(&other)
            .and_then(|s| Decimal::from_str(s.trim()).ok())
            .unwrap_or_default(),
        None => Decimal::ZERO,
    }
}

/// Milliseconds since the epoch for the date formats the record stores use. Anything that does not
/// parse is the epoch itself.
pub(crate) fn instant_millis(s: &str) -> i64 {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis();
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return dt.and_utc().timestamp_millis();
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return dt.and_utc().timestamp_millis();
            }
        }
    }
    0
}
