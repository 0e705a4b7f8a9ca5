use crate::model::{FilterUpdate, Fields, Record, RecordId};
use serde::Serialize;

/// Every way the view layer can change an `EntityList`.
#[derive(Debug, Clone)]
pub enum Action {
    Load,
    Create(Fields),
    Update(RecordId, Fields),
    Delete(RecordId),
    SetFilter(FilterUpdate),
    Select(Selector),
    ClearSelection,
}

/// What a successfully dispatched `Action` did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    Loaded { count: usize },
    Created { record: Record },
    Updated { record: Record },
    Deleted { id: RecordId },
    FilterChanged,
    Selected { record: Record },
    SelectionCleared,
}

/// Identifies the record to select, either by id or by a record the caller already holds.
#[derive(Debug, Clone)]
pub enum Selector {
    Id(RecordId),
    Record(Record),
}

impl Selector {
    pub fn id(&self) -> &RecordId {
        match self {
            Selector::Id(id) => id,
            Selector::Record(record) => record.id(),
        }
    }
}

impl From<RecordId> for Selector {
    fn from(value: RecordId) -> Self {
        Selector::Id(value)
    }
}

impl From<&RecordId> for Selector {
    fn from(value: &RecordId) -> Self {
        Selector::Id(value.clone())
    }
}

impl From<Record> for Selector {
    fn from(value: Record) -> Self {
        Selector::Record(value)
    }
}

impl From<&Record> for Selector {
    fn from(value: &Record) -> Self {
        Selector::Record(value.clone())
    }
}
