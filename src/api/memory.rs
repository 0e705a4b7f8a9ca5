//! Implements the `RecordStore` trait using in-memory data.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without a REST server. It also lets tests inject failures and hold responses
//! back to exercise the container's reconciliation rules.

use crate::api::{Operation, RecordStore};
use crate::error::Res;
use crate::model::{Fields, Record, RecordId, Scope};
use anyhow::{bail, Context};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use tokio::sync::{oneshot, RwLock};
use tracing::trace;

/// An implementation of the `RecordStore` trait that holds its records in memory. The `Default`
/// instance is seeded with demo expenses belonging to two users, `u1` and `u2`.
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    records: Vec<Record>,
    next_id: i64,
    text_ids: bool,
    calls: Vec<Operation>,
    failures: HashSet<Operation>,
    gates: HashMap<Operation, VecDeque<oneshot::Receiver<()>>>,
}

impl MemoryStore {
    /// Creates a store holding `records`. Newly created records get integer ids following the
    /// largest integer id present.
    pub fn new(records: Vec<Record>) -> Self {
        let next_id = records
            .iter()
            .filter_map(|r| match r.id() {
                RecordId::Int(i) => Some(*i),
                RecordId::Text(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            state: RwLock::new(MemoryState {
                records,
                next_id,
                ..Default::default()
            }),
        }
    }

    /// Creates a store with no records.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Newly created records get random text ids, the way json-server assigns them.
    pub fn with_text_ids(self) -> Self {
        let mut state = self.state.into_inner();
        state.text_ids = true;
        Self {
            state: RwLock::new(state),
        }
    }

    /// A copy of every record currently held.
    pub async fn records(&self) -> Vec<Record> {
        self.state.read().await.records.clone()
    }

    /// The calls received so far, in order.
    pub async fn calls(&self) -> Vec<Operation> {
        self.state.read().await.calls.clone()
    }

    /// Makes the next call of kind `operation` fail.
    pub async fn fail_next(&self, operation: Operation) {
        self.state.write().await.failures.insert(operation);
    }

    /// Holds back the response of the next call of kind `operation` until the returned sender is
    /// used or dropped. The response itself is computed when the call arrives.
    pub async fn pause_next(&self, operation: Operation) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state
            .write()
            .await
            .gates
            .entry(operation)
            .or_default()
            .push_back(rx);
        tx
    }

    /// Adds a record as if another client had created it.
    pub async fn insert(&self, fields: Fields) -> Record {
        let mut state = self.state.write().await;
        let record = Record::new(state.assign_id(), fields);
        state.records.push(record.clone());
        record
    }

    /// Runs `f` against the state for a call of kind `operation`, then waits on any gate set by
    /// `pause_next` before handing back the result.
    async fn call<T, F>(&self, operation: Operation, f: F) -> Res<T>
    where
        F: FnOnce(&mut MemoryState) -> Res<T>,
    {
        let (result, gate) = {
            let mut state = self.state.write().await;
            state.calls.push(operation);
            let gate = state
                .gates
                .get_mut(&operation)
                .and_then(VecDeque::pop_front);
            let result = if state.failures.remove(&operation) {
                Err(anyhow::anyhow!("Injected failure for {operation}"))
            } else {
                f(&mut state)
            };
            (result, gate)
        };
        if let Some(gate) = gate {
            trace!("Holding back the response to {operation}");
            let _ = gate.await;
        }
        result
    }
}

impl MemoryState {
    fn assign_id(&mut self) -> RecordId {
        if self.text_ids {
            let uuid = uuid::Uuid::new_v4().simple().to_string();
            RecordId::Text(uuid[..8].to_string())
        } else {
            let id = self.next_id;
            self.next_id += 1;
            RecordId::Int(id)
        }
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, scope: Option<&Scope>) -> Res<Vec<Record>> {
        self.call(Operation::List, |state| {
            Ok(state
                .records
                .iter()
                .filter(|r| scope.map_or(true, |s| s.contains(r)))
                .cloned()
                .collect())
        })
        .await
    }

    async fn create(&self, fields: &Fields) -> Res<Record> {
        self.call(Operation::Create, |state| {
            let record = Record::new(state.assign_id(), fields.clone());
            state.records.push(record.clone());
            Ok(record)
        })
        .await
    }

    async fn update(&self, id: &RecordId, fields: &Fields) -> Res<Record> {
        self.call(Operation::Update, |state| {
            let ix = state
                .position(id)
                .with_context(|| format!("Record {id} not found"))?;
            let record = Record::new(state.records[ix].id().clone(), fields.clone());
            state.records[ix] = record.clone();
            Ok(record)
        })
        .await
    }

    async fn delete(&self, id: &RecordId) -> Res<()> {
        self.call(Operation::Delete, |state| {
            let Some(ix) = state.position(id) else {
                bail!("Record {id} not found");
            };
            state.records.remove(ix);
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, id: &RecordId) -> Res<Option<Record>> {
        self.call(Operation::GetById, |state| {
            Ok(state.position(id).map(|ix| state.records[ix].clone()))
        })
        .await
    }
}

impl Default for MemoryStore {
    /// Loads seed data from this module.
    fn default() -> Self {
        // the seed data is a compile-time constant and is covered by tests
        let records = load_csv(EXPENSE_DATA).unwrap_or_default();
        Self::new(records)
    }
}

/// Loads records from a CSV-formatted string with a header row. The `id` column is the record id,
/// every other column becomes a field.
fn load_csv(csv_data: &str) -> Res<Vec<Record>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));
    let headers = rdr.headers()?.clone();

    let mut records = Vec::new();
    for (row_ix, result) in rdr.records().enumerate() {
        let row = result?;
        let mut id = None;
        let mut fields = Fields::default();
        for (header, value) in headers.iter().zip(row.iter()) {
            if header == "id" {
                id = Some(value.parse::<RecordId>().unwrap_or_else(|e| match e {}));
            } else {
                fields.set(header, Value::String(value.to_string()));
            }
        }
        let id = id.with_context(|| format!("Row {} has no id", row_ix + 2))?;
        records.push(Record::new(id, fields));
    }
    Ok(records)
}

/// Seed expense data.
const EXPENSE_DATA: &str = r##"id,name,category,amount,date,status,userId
1,Whole Foods Market,Food,87.43,2025-10-20,paid,u1
2,Starbucks #2847,Food,6.75,2025-10-19,paid,u1
3,Shell Gas Station,Transport,52.30,2025-10-18,paid,u1
4,Chipotle Mexican Grill,Food,14.85,2025-10-17,pending,u1
5,PG&E Electric,Utilities,142.67,2025-10-16,paid,u1
6,Rent,Housing,"1,200.00",2025-10-01,paid,u1
7,Comcast Internet,Utilities,89.99,2025-10-11,pending,u2
8,Olive Garden,Food,42.30,2025-10-07,paid,u2
9,Costco Wholesale,Food,118.56,2025-10-05,paid,u2
10,Bus Pass,Transport,$45.00,2025-10-02,pending,u2
"##;
