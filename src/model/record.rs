use crate::model::Amount;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

pub(crate) const ID: &str = "id";
pub(crate) const NAME: &str = "name";
pub(crate) const CATEGORY: &str = "category";
pub(crate) const DATE: &str = "date";
pub(crate) const STATUS: &str = "status";
pub(crate) const AMOUNT: &str = "amount";

/// The identifier of a record. Stores assign either integers (`9`) or strings (`"a1b2"`); both are
/// kept as received so that they are written back in the same JSON type.
///
/// Equality and hashing use the textual form, so `9` and `"9"` identify the same record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// The textual form of the id, used for comparisons and URLs.
    pub fn key(&self) -> Cow<'_, str> {
        match self {
            RecordId::Int(i) => Cow::Owned(i.to_string()),
            RecordId::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RecordId::Int(a), RecordId::Int(b)) => a == b,
            _ => self.key() == other.key(),
        }
    }
}

impl Eq for RecordId {}

impl Hash for RecordId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for RecordId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<i64>() {
            Ok(i) => RecordId::Int(i),
            Err(_) => RecordId::Text(s.to_string()),
        })
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

/// The fields of a record, without its id. This is what callers pass to `create` and `update`.
///
/// `name`, `category`, `date` and `status` are the text fields the classroom apps share; `amount` is
/// coerced to a number on ingestion. Everything else is carried untouched in `other`. An `id` key is
/// never retained, so a client-supplied id can not reach the record store.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFields")]
pub struct Fields {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct RawFields {
    #[serde(default, deserialize_with = "lenient_text")]
    name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    category: String,
    #[serde(default, deserialize_with = "lenient_text")]
    date: String,
    #[serde(default, deserialize_with = "lenient_text")]
    status: String,
    #[serde(default)]
    amount: Option<Amount>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

impl From<RawFields> for Fields {
    fn from(raw: RawFields) -> Self {
        let mut other = raw.other;
        other.remove(ID);
        Self {
            name: raw.name,
            category: raw.category,
            date: raw.date,
            status: raw.status,
            amount: raw.amount,
            other,
        }
    }
}

/// Accepts strings, numbers and booleans as text; null becomes empty.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value).map(Cow::into_owned).unwrap_or_default())
}

/// The text form of a scalar JSON value. Arrays, objects and null have no text form.
pub(crate) fn value_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl Fields {
    /// Builds `Fields` from an arbitrary JSON object, coercing as the store boundary does.
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// The amount, with a missing amount treated as zero.
    pub fn amount(&self) -> Amount {
        self.amount.unwrap_or_default()
    }

    /// Sets the field named `key`. Known fields are coerced; `id` is ignored.
    pub fn set(&mut self, key: &str, value: Value) {
        match key {
            ID => {}
            NAME => self.name = text_or_empty(&value),
            CATEGORY => self.category = text_or_empty(&value),
            DATE => self.date = text_or_empty(&value),
            STATUS => self.status = text_or_empty(&value),
            AMOUNT => self.amount = Some(Amount::from_json(&value)),
            _ => {
                self.other.insert(key.to_string(), value);
            }
        }
    }

    /// Copies every field that is set in `other` over the fields in `self`.
    pub fn overlay(&mut self, other: &Fields) {
        for (key, value) in [
            (NAME, &other.name),
            (CATEGORY, &other.category),
            (DATE, &other.date),
            (STATUS, &other.status),
        ] {
            if !value.is_empty() {
                self.set(key, Value::String(value.clone()));
            }
        }
        if other.amount.is_some() {
            self.amount = other.amount;
        }
        for (key, value) in &other.other {
            self.other.insert(key.clone(), value.clone());
        }
    }

    /// The text value of the field named `field`, if the record has one.
    pub fn text(&self, field: &str) -> Option<Cow<'_, str>> {
        let known = match field {
            NAME => &self.name,
            CATEGORY => &self.category,
            DATE => &self.date,
            STATUS => &self.status,
            AMOUNT => return self.amount.map(|a| Cow::Owned(a.value().to_string())),
            _ => return self.other.get(field).and_then(value_text),
        };
        if known.is_empty() {
            None
        } else {
            Some(Cow::Borrowed(known.as_str()))
        }
    }

    /// The value of the field named `field` as JSON.
    pub fn value(&self, field: &str) -> Option<Value> {
        match field {
            AMOUNT => self.amount.and_then(|a| serde_json::to_value(a).ok()),
            NAME | CATEGORY | DATE | STATUS => {
                self.text(field).map(|s| Value::String(s.into_owned()))
            }
            _ => self.other.get(field).cloned(),
        }
    }
}

fn text_or_empty(value: &Value) -> String {
    value_text(value).map(Cow::into_owned).unwrap_or_default()
}

/// A record as returned by the record store: a store-assigned `id` plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    #[serde(flatten)]
    fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    pub fn name(&self) -> &str {
        &self.fields.name
    }

    pub fn category(&self) -> &str {
        &self.fields.category
    }

    pub fn date(&self) -> &str {
        &self.fields.date
    }

    pub fn amount(&self) -> Amount {
        self.fields.amount()
    }

    /// The text value of `field`. `id` is readable here too.
    pub fn text(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            ID => Some(self.id.key()),
            _ => self.fields.text(field),
        }
    }

    /// The JSON value of `field`.
    pub fn value(&self, field: &str) -> Option<Value> {
        match field {
            ID => serde_json::to_value(&self.id).ok(),
            _ => self.fields.value(field),
        }
    }
}

/// The partition a container is restricted to, e.g. the records owned by one user. `field` names
/// the record field holding the owner and `value` is the current owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    field: String,
    value: String,
}

impl Scope {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether `record` belongs to this scope.
    pub fn contains(&self, record: &Record) -> bool {
        record.text(&self.field).as_deref() == Some(self.value.as_str())
    }
}
