use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The direction of a sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

serde_plain::derive_display_from_serialize!(Direction);
serde_plain::derive_fromstr_from_deserialize!(Direction);

/// Selects the comparator used to order the visible records. It is written as `<field>_<dir>`,
/// e.g. `date_desc` or `amount_asc`. Anything else is kept as `Unrecognized` and leaves the order
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortBy {
    Field { field: String, direction: Direction },
    Unrecognized(String),
}

impl SortBy {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        SortBy::Field {
            field: field.into(),
            direction,
        }
    }
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::new("date", Direction::Desc)
    }
}

impl FromStr for SortBy {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s.rsplit_once('_').and_then(|(field, dir)| {
            let direction = dir.parse::<Direction>().ok()?;
            if field.is_empty() {
                None
            } else {
                Some(SortBy::new(field, direction))
            }
        });
        Ok(parsed.unwrap_or_else(|| SortBy::Unrecognized(s.to_string())))
    }
}

impl Display for SortBy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SortBy::Field { field, direction } => write!(f, "{field}_{direction}"),
            SortBy::Unrecognized(s) => f.write_str(s),
        }
    }
}

impl Serialize for SortBy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SortBy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_else(|e: Infallible| match e {}))
    }
}

/// The active filter and sort criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    /// Case-insensitive substring matched against the designated text fields.
    pub search_term: String,
    /// Exact match against the `category` field. Empty means no filter.
    pub category: String,
    /// Further exact-match filters keyed by field name. Empty values mean no filter.
    pub equals: BTreeMap<String, String>,
    pub sort_by: SortBy,
}

impl Filters {
    /// Shallow merge: every key present in `update` replaces the current value, everything else is
    /// kept.
    pub fn merge(&mut self, update: FilterUpdate) {
        let FilterUpdate {
            search_term,
            category,
            equals,
            sort_by,
        } = update;
        if let Some(search_term) = search_term {
            self.search_term = search_term;
        }
        if let Some(category) = category {
            self.category = category;
        }
        for (field, value) in equals {
            self.equals.insert(field, value);
        }
        if let Some(sort_by) = sort_by {
            self.sort_by = sort_by;
        }
    }
}

/// A partial set of filter criteria to be merged into the current `Filters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterUpdate {
    pub search_term: Option<String>,
    pub category: Option<String>,
    pub equals: BTreeMap<String, String>,
    pub sort_by: Option<SortBy>,
}

impl FilterUpdate {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search_term: Some(term.into()),
            ..Default::default()
        }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Default::default()
        }
    }

    pub fn sort(sort_by: SortBy) -> Self {
        Self {
            sort_by: Some(sort_by),
            ..Default::default()
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        let mut equals = BTreeMap::new();
        equals.insert(field.into(), value.into());
        Self {
            equals,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_parse() {
        assert_eq!(
            "amount_desc".parse::<SortBy>().unwrap(),
            SortBy::new("amount", Direction::Desc)
        );
        assert_eq!(
            "created_at_asc".parse::<SortBy>().unwrap(),
            SortBy::new("created_at", Direction::Asc)
        );
        assert_eq!(
            "newest".parse::<SortBy>().unwrap(),
            SortBy::Unrecognized("newest".into())
        );
        assert_eq!(
            "_asc".parse::<SortBy>().unwrap(),
            SortBy::Unrecognized("_asc".into())
        );
        assert_eq!(
            "date_sideways".parse::<SortBy>().unwrap(),
            SortBy::Unrecognized("date_sideways".into())
        );
    }

    #[test]
    fn test_sort_by_display() {
        assert_eq!(SortBy::default().to_string(), "date_desc");
        assert_eq!(SortBy::Unrecognized("x".into()).to_string(), "x");
    }

    #[test]
    fn test_filters_default() {
        let filters = Filters::default();
        assert_eq!(filters.search_term, "");
        assert_eq!(filters.category, "");
        assert_eq!(filters.sort_by, SortBy::new("date", Direction::Desc));
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut filters = Filters::default();
        filters.merge(FilterUpdate::search("coffee"));
        filters.merge(FilterUpdate::category("Food"));
        filters.merge(FilterUpdate::equals("status", "paid"));
        filters.merge(FilterUpdate::sort("amount_asc".parse().unwrap()));
        assert_eq!(filters.search_term, "coffee");
        assert_eq!(filters.category, "Food");
        assert_eq!(filters.equals.get("status").map(String::as_str), Some("paid"));
        assert_eq!(filters.sort_by.to_string(), "amount_asc");

        filters.merge(FilterUpdate::category(""));
        assert_eq!(filters.search_term, "coffee");
        assert_eq!(filters.category, "");
    }

    #[test]
    fn test_filters_json() {
        let filters: Filters =
            serde_json::from_str(r#"{"searchTerm":"rent","sortBy":"amount_desc"}"#).unwrap();
        assert_eq!(filters.search_term, "rent");
        assert_eq!(filters.sort_by, SortBy::new("amount", Direction::Desc));
        assert_eq!(filters.category, "");
    }
}
