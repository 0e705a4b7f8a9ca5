//! The entity-list state container.
//!
//! An `EntityList` owns the canonical collection of records, the active filters, the selected
//! record and the loading/error flags. It talks to a `RecordStore` for every change and reconciles
//! the store's answers into the canonical collection. The view layer reads a derived `View` and
//! changes things only through the methods here (or `dispatch`).
//!
//! # Concurrency
//!
//! State lives behind a mutex that is only held for synchronous transitions, never across an
//! `.await`, so several requests can be in flight on the same container at once. Each request gets
//! a sequence number from a monotonic counter:
//!
//! - a `load` response is dropped if a newer `load` was issued after it,
//! - a `load` response does not override records that a newer mutation already reconciled, nor
//!   bring back records a newer `remove` deleted,
//! - an `update` response is dropped if the record was reconciled by a newer request meanwhile, and
//!   never resurrects a record that was removed while it was in flight.

mod action;
mod view;

pub use action::{Action, Outcome, Selector};
pub use view::{derive, TotalOver, View, ViewOptions};

use crate::api::{Operation, RecordStore};
use crate::error::{Error, ErrorType};
use crate::model::{Amount, FilterUpdate, Fields, Filters, Record, RecordId, Scope};
use crate::Result;
use anyhow::anyhow;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};

/// Per-instance behavior of an `EntityList`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// When set, records are partitioned by this field and `load` requires a scope value.
    pub scope_field: Option<String>,
    /// Whether `select` may fetch a record from the store when it is not held locally.
    pub fallback_fetch: bool,
    /// The filters a new container starts with.
    pub filters: Filters,
    pub view: ViewOptions,
}

/// A record in the canonical collection and the sequence number of the response it came from.
#[derive(Debug, Clone)]
struct Entry {
    record: Record,
    seq: u64,
}

#[derive(Debug, Default)]
struct State {
    canonical: Vec<Entry>,
    filters: Filters,
    selected: Option<Record>,
    scope: Option<Scope>,
    error: Option<String>,
    /// The request currently shown as loading.
    loading: Option<u64>,
    in_flight: usize,
    next_seq: u64,
    latest_load: u64,
    /// Whether the response to `latest_load` is still outstanding.
    load_pending: bool,
    /// Ids removed while `latest_load` was pending, with the sequence of the removal.
    removed: HashMap<RecordId, u64>,
}

impl State {
    fn position(&self, id: &RecordId) -> Option<usize> {
        self.canonical.iter().position(|e| e.record.id() == id)
    }

    fn find(&self, id: &RecordId) -> Option<&Record> {
        self.position(id).map(|ix| &self.canonical[ix].record)
    }

    fn begin(&mut self, operation: Operation) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        if operation == Operation::List {
            self.latest_load = seq;
            self.load_pending = true;
        }
        self.loading = Some(seq);
        self.error = None;
        self.in_flight += 1;
        trace!("Request {seq} ({operation}) started");
        seq
    }

    fn finish(&mut self, seq: u64) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.loading == Some(seq) {
            self.loading = None;
        }
    }

    fn fail(&mut self, seq: u64, error: Error) -> Error {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.loading = None;
        warn!("Request {seq} failed: {error}");
        self.error = Some(error.message());
        error
    }

    /// Inserts `record`, or replaces the entry with the same id.
    fn upsert(&mut self, record: Record, seq: u64) {
        match self.position(record.id()) {
            Some(ix) => self.canonical[ix] = Entry { record, seq },
            None => self.canonical.push(Entry { record, seq }),
        }
    }

    /// Points `selected` at the current version of the selected record, or clears it if the record
    /// is gone.
    fn refresh_selection(&mut self) {
        if let Some(selected) = self.selected.take() {
            self.selected = self.find(selected.id()).cloned();
            if self.selected.is_none() {
                debug!("Selection {} cleared, the record is gone", selected.id());
            }
        }
    }

    /// Empties everything that belongs to a scope and invalidates in-flight loads.
    fn reset(&mut self) {
        self.canonical.clear();
        self.selected = None;
        self.error = None;
        self.removed.clear();
        self.next_seq += 1;
        self.latest_load = self.next_seq;
        self.load_pending = false;
    }

    /// Replaces the canonical collection with the response to load `seq`, keeping what newer
    /// requests have reconciled since the load was issued.
    fn apply_load(&mut self, records: Vec<Record>, seq: u64) -> usize {
        let newer: HashMap<RecordId, Entry> = self
            .canonical
            .drain(..)
            .filter(|e| e.seq > seq)
            .map(|e| (e.record.id().clone(), e))
            .collect();

        let mut seen = HashSet::new();
        let mut canonical = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id().clone();
            if !seen.insert(id.clone()) {
                warn!("The store returned record {id} more than once, keeping the first");
                continue;
            }
            if self.removed.get(&id).is_some_and(|removed| *removed > seq) {
                continue;
            }
            match newer.get(&id) {
                Some(entry) => canonical.push(entry.clone()),
                None => canonical.push(Entry { record, seq }),
            }
        }
        // records created by newer requests that this response could not know about
        let mut created: Vec<Entry> = newer
            .into_values()
            .filter(|e| !seen.contains(e.record.id()))
            .collect();
        created.sort_by_key(|e| e.seq);
        canonical.extend(created);

        self.canonical = canonical;
        self.removed.clear();
        self.refresh_selection();
        self.canonical.len()
    }
}

/// The entity-list state container. Cloning is cheap and yields a handle to the same state.
#[derive(Clone)]
pub struct EntityList {
    store: Arc<dyn RecordStore>,
    options: Arc<Options>,
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for EntityList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityList")
            .field("options", &self.options)
            .field("state", &*self.state())
            .finish()
    }
}

impl EntityList {
    /// Creates an empty container backed by `store`. Nothing is fetched until `load` is called.
    pub fn new(store: Arc<dyn RecordStore>, options: Options) -> Self {
        let state = State {
            filters: options.filters.clone(),
            ..Default::default()
        };
        Self {
            store,
            options: Arc::new(options),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Creates a container and sets its scope value in one go.
    pub fn with_scope(
        store: Arc<dyn RecordStore>,
        options: Options,
        scope: Option<impl Into<String>>,
    ) -> Self {
        let list = Self::new(store, options);
        list.set_scope(scope);
        list
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // no code panics while holding the lock, but a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    // ---------------------------------------------------------------------------------------------
    // Read surface
    // ---------------------------------------------------------------------------------------------

    /// The filtered, sorted records and their total, computed from the current state.
    pub fn view(&self) -> View {
        let state = self.state();
        derive(
            state.canonical.iter().map(|e| &e.record),
            &state.filters,
            &self.options.view,
        )
    }

    pub fn total(&self) -> Amount {
        self.view().total()
    }

    /// True while the most recently issued request is in flight.
    pub fn is_loading(&self) -> bool {
        self.state().loading.is_some()
    }

    /// The number of requests that have been issued and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    /// The message of the most recent failure, cleared when the next request starts.
    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn selected(&self) -> Option<Record> {
        self.state().selected.clone()
    }

    pub fn filters(&self) -> Filters {
        self.state().filters.clone()
    }

    pub fn scope(&self) -> Option<Scope> {
        self.state().scope.clone()
    }

    /// A copy of the canonical collection in reception order.
    pub fn snapshot(&self) -> Vec<Record> {
        self.state()
            .canonical
            .iter()
            .map(|e| e.record.clone())
            .collect()
    }

    /// Looks up a record in the canonical collection.
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.state().find(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().canonical.is_empty()
    }

    // ---------------------------------------------------------------------------------------------
    // Actions
    // ---------------------------------------------------------------------------------------------

    /// Runs `action` and reports what it did.
    pub async fn dispatch(&self, action: Action) -> Result<Outcome> {
        match action {
            Action::Load => self.load().await.map(|count| Outcome::Loaded { count }),
            Action::Create(fields) => self
                .create(fields)
                .await
                .map(|record| Outcome::Created { record }),
            Action::Update(id, fields) => self
                .update(&id, fields)
                .await
                .map(|record| Outcome::Updated { record }),
            Action::Delete(id) => self.remove(&id).await.map(|()| Outcome::Deleted { id }),
            Action::SetFilter(update) => {
                self.set_filter(update);
                Ok(Outcome::FilterChanged)
            }
            Action::Select(selector) => self
                .select(selector)
                .await
                .map(|record| Outcome::Selected { record }),
            Action::ClearSelection => {
                self.clear_selection();
                Ok(Outcome::SelectionCleared)
            }
        }
    }

    /// Sets (or clears) the scope value. Changing the scope empties the container; call `load`
    /// afterwards to fetch the records of the new scope.
    pub fn set_scope(&self, value: Option<impl Into<String>>) {
        let scope = match (&self.options.scope_field, value) {
            (Some(field), Some(value)) => Some(Scope::new(field.clone(), value)),
            _ => None,
        };
        let mut state = self.state();
        if state.scope != scope {
            debug!("Scope changed from {:?} to {:?}", state.scope, scope);
            state.scope = scope;
            state.reset();
        }
    }

    /// Replaces the canonical collection with the records of the current scope. Returns the number
    /// of records held afterwards.
    ///
    /// When the container is scoped and has no scope value, it is reset to empty and the store is
    /// not called.
    ///
    /// A response that arrives after a newer `load` was issued is discarded. A discarded success
    /// returns the number of records currently held. A discarded failure still returns the error but
    /// does not set `error()`, which belongs to the newer load.
    pub async fn load(&self) -> Result<usize> {
        let (seq, scope) = {
            let mut state = self.state();
            if self.options.scope_field.is_some() && state.scope.is_none() {
                debug!("No scope is set, resetting instead of loading");
                state.reset();
                return Ok(0);
            }
            let seq = state.begin(Operation::List);
            (seq, state.scope.clone())
        };

        let result = self.store.list(scope.as_ref()).await;

        let mut state = self.state();
        if seq < state.latest_load {
            debug!("Discarding the response to load {seq}, a newer load was issued");
            state.finish(seq);
            return match result {
                Ok(_) => Ok(state.canonical.len()),
                Err(e) => Err(Error::new(ErrorType::Load, e)),
            };
        }
        state.load_pending = false;
        match result {
            Ok(mut records) => {
                if let Some(scope) = &scope {
                    let before = records.len();
                    records.retain(|r| scope.contains(r));
                    if records.len() < before {
                        warn!(
                            "Dropped {} record(s) outside of scope '{}'",
                            before - records.len(),
                            scope.value()
                        );
                    }
                }
                let count = state.apply_load(records, seq);
                state.finish(seq);
                info!("Loaded {count} records");
                Ok(count)
            }
            Err(e) => Err(state.fail(seq, Error::new(ErrorType::Load, e))),
        }
    }

    /// Creates a record in the store and appends the store's version, with its assigned id, to the
    /// canonical collection. Required fields are the caller's responsibility.
    pub async fn create(&self, fields: Fields) -> Result<Record> {
        let seq = self.state().begin(Operation::Create);

        let result = self.store.create(&fields).await;

        let mut state = self.state();
        match result {
            Ok(record) => {
                debug!("Created record {}", record.id());
                state.upsert(record.clone(), seq);
                state.finish(seq);
                Ok(record)
            }
            Err(e) => Err(state.fail(seq, Error::new(ErrorType::Create, e))),
        }
    }

    /// Replaces the record `id` in the store with `fields` and then replaces the canonical record
    /// with the store's version. The selection follows the new version.
    pub async fn update(&self, id: &RecordId, fields: Fields) -> Result<Record> {
        let seq = self.state().begin(Operation::Update);

        let result = self.store.update(id, &fields).await;

        let mut state = self.state();
        match result {
            Ok(record) => {
                match state.position(id) {
                    None => debug!("Record {id} was removed while its update was in flight"),
                    Some(ix) if state.canonical[ix].seq > seq => {
                        debug!("Discarding update {seq} of record {id}, a newer response exists")
                    }
                    Some(ix) => {
                        state.canonical[ix] = Entry {
                            record: record.clone(),
                            seq,
                        };
                        if state.selected.as_ref().is_some_and(|s| s.id() == id) {
                            state.selected = Some(record.clone());
                        }
                        debug!("Updated record {id}");
                    }
                }
                state.finish(seq);
                Ok(record)
            }
            Err(e) => Err(state.fail(seq, Error::new(ErrorType::Update, e))),
        }
    }

    /// Deletes the record `id` from the store and then from the canonical collection. Clears the
    /// selection if it pointed at `id`.
    pub async fn remove(&self, id: &RecordId) -> Result<()> {
        let seq = self.state().begin(Operation::Delete);

        let result = self.store.delete(id).await;

        let mut state = self.state();
        match result {
            Ok(()) => {
                if let Some(ix) = state.position(id) {
                    state.canonical.remove(ix);
                }
                if state.load_pending {
                    state.removed.insert(id.clone(), seq);
                }
                if state.selected.as_ref().is_some_and(|s| s.id() == id) {
                    state.selected = None;
                }
                debug!("Removed record {id}");
                state.finish(seq);
                Ok(())
            }
            Err(e) => Err(state.fail(seq, Error::new(ErrorType::Delete, e))),
        }
    }

    /// Merges `update` into the active filters. The view reflects it on the next read.
    pub fn set_filter(&self, update: FilterUpdate) {
        let mut state = self.state();
        state.filters.merge(update);
        trace!("Filters are now {:?}", state.filters);
    }

    /// Selects a record for editing. The canonical collection is searched first; when the record
    /// is not there and `fallback_fetch` is enabled, it is fetched from the store. A fetched record
    /// must belong to the current scope, and is added to the canonical collection.
    ///
    /// On failure the previous selection is kept.
    pub async fn select(&self, selector: impl Into<Selector>) -> Result<Record> {
        let selector = selector.into();
        let id = selector.id().clone();

        let (seq, scope) = {
            let mut state = self.state();
            if let Some(record) = state.find(&id).cloned() {
                state.selected = Some(record.clone());
                return Ok(record);
            }
            if !self.options.fallback_fetch {
                let error = Error::new(ErrorType::NotFound, anyhow!("Record {id} is not loaded"));
                state.error = Some(error.message());
                return Err(error);
            }
            (state.begin(Operation::GetById), state.scope.clone())
        };

        let result = self.store.get_by_id(&id).await;

        let mut state = self.state();
        let record = match result {
            Ok(Some(record)) => record,
            Ok(None) => {
                let e = anyhow!("Record {id} does not exist in the store");
                return Err(state.fail(seq, Error::new(ErrorType::NotFound, e)));
            }
            Err(e) => {
                let e = e.context(format!("Record {id} could not be fetched"));
                return Err(state.fail(seq, Error::new(ErrorType::NotFound, e)));
            }
        };

        let in_scope = match (&self.options.scope_field, &scope) {
            (None, _) => true,
            (Some(_), Some(scope)) => scope.contains(&record),
            (Some(field), None) => {
                debug!("No scope is set, unable to verify '{field}' of record {id}");
                false
            }
        };
        if !in_scope {
            let e = anyhow!("Record {id} belongs to a different scope");
            return Err(state.fail(seq, Error::new(ErrorType::ScopeMismatch, e)));
        }

        if state.scope != scope {
            let e = anyhow!("The scope changed while record {id} was being fetched");
            return Err(state.fail(seq, Error::new(ErrorType::ScopeMismatch, e)));
        }

        state.upsert(record.clone(), seq);
        state.selected = Some(record.clone());
        state.finish(seq);
        debug!("Selected record {id} from the store");
        Ok(record)
    }

    /// Clears the selection.
    pub fn clear_selection(&self) {
        self.state().selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryStore;
    use crate::model::{Direction, SortBy};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        Fields::from_json(value).unwrap()
    }

    fn scoped() -> Options {
        Options {
            scope_field: Some("userId".to_string()),
            ..Default::default()
        }
    }

    fn seeded() -> (Arc<MemoryStore>, EntityList) {
        let store = Arc::new(MemoryStore::default());
        let list = EntityList::new(store.clone(), Options::default());
        (store, list)
    }

    async fn wait_for_calls(store: &MemoryStore, operation: Operation, count: usize) {
        loop {
            let n = store
                .calls()
                .await
                .into_iter()
                .filter(|op| *op == operation)
                .count();
            if n >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    fn id(i: i64) -> RecordId {
        RecordId::Int(i)
    }

    #[tokio::test]
    async fn test_load_without_scope_does_not_call_the_store() {
        let store = Arc::new(MemoryStore::default());
        let list = EntityList::new(store.clone(), scoped());
        assert_eq!(list.load().await.unwrap(), 0);
        assert!(list.is_empty());
        assert!(!list.is_loading());
        assert!(list.error().is_none());
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_scoped() {
        let store = Arc::new(MemoryStore::default());
        let list = EntityList::with_scope(store.clone(), scoped(), Some("u1"));
        assert_eq!(list.load().await.unwrap(), 6);
        assert!(list
            .snapshot()
            .iter()
            .all(|r| r.text("userId").as_deref() == Some("u1")));
        let view = list.view();
        assert_eq!(view.visible()[0].name(), "Whole Foods Market");
        assert!(!list.is_loading());
        assert_eq!(list.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_create_appends_store_version() {
        let store = Arc::new(MemoryStore::new(vec![Record::new(
            8i64,
            fields(json!({"name": "Gym", "amount": 30})),
        )]));
        let list = EntityList::new(store.clone(), Options::default());
        list.load().await.unwrap();

        let record = list
            .create(fields(json!({"name": "Rent", "amount": "1200"})))
            .await
            .unwrap();

        assert_eq!(record.id(), &id(9));
        assert_eq!(list.len(), 2);
        let held = list.get(&id(9)).unwrap();
        assert_eq!(held.amount().value(), Decimal::from(1200));
        let as_json = serde_json::to_value(&held).unwrap();
        assert_eq!(as_json["amount"], json!(1200));
        assert_eq!(as_json["id"], json!(9));
    }

    #[tokio::test]
    async fn test_failed_update_leaves_canonical_untouched() {
        let store = Arc::new(MemoryStore::new(vec![Record::new(
            9i64,
            fields(json!({"name": "Rent", "amount": 1200})),
        )]));
        let list = EntityList::new(store.clone(), Options::default());
        list.load().await.unwrap();
        let before = list.snapshot();

        store.fail_next(Operation::Update).await;
        let err = list
            .update(&id(9), fields(json!({"name": "Rent", "amount": 1300})))
            .await
            .unwrap_err();

        assert_eq!(err.error_type(), ErrorType::Update);
        assert_eq!(list.snapshot(), before);
        assert_eq!(
            list.get(&id(9)).unwrap().amount().value(),
            Decimal::from(1200)
        );
        assert_eq!(
            list.error().as_deref(),
            Some("Unable to save changes to the record")
        );
        assert!(!list.is_loading());
    }

    #[tokio::test]
    async fn test_failed_create_and_remove_leave_canonical_untouched() {
        let (store, list) = seeded();
        list.load().await.unwrap();
        list.select(id(2)).await.unwrap();
        let before = list.snapshot();

        store.fail_next(Operation::Create).await;
        let err = list.create(fields(json!({"name": "X"}))).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Create);
        assert_eq!(list.snapshot(), before);

        store.fail_next(Operation::Delete).await;
        let err = list.remove(&id(2)).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Delete);
        assert_eq!(list.snapshot(), before);
        assert_eq!(list.selected().unwrap().id(), &id(2));
        assert_eq!(list.error().as_deref(), Some("Unable to delete the record"));
    }

    #[tokio::test]
    async fn test_failed_load_keeps_records() {
        let (store, list) = seeded();
        list.load().await.unwrap();
        store.fail_next(Operation::List).await;
        let err = list.load().await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Load);
        assert_eq!(list.len(), 10);
        assert_eq!(list.error().as_deref(), Some("Unable to load records"));
        assert!(!list.is_loading());

        // the next request clears the error
        list.load().await.unwrap();
        assert!(list.error().is_none());
    }

    #[tokio::test]
    async fn test_remove_clears_selection() {
        let (_, list) = seeded();
        list.load().await.unwrap();
        list.select(id(3)).await.unwrap();
        list.remove(&id(3)).await.unwrap();
        assert!(list.selected().is_none());
        assert!(list.get(&id(3)).is_none());
        assert_eq!(list.len(), 9);
    }

    #[tokio::test]
    async fn test_remove_keeps_other_selection() {
        let (_, list) = seeded();
        list.load().await.unwrap();
        list.select(id(4)).await.unwrap();
        list.remove(&id(3)).await.unwrap();
        assert_eq!(list.selected().unwrap().id(), &id(4));
    }

    #[tokio::test]
    async fn test_update_replaces_record_and_selection() {
        let (_, list) = seeded();
        list.load().await.unwrap();
        list.select(id(5)).await.unwrap();
        let mut new_fields = list.get(&id(5)).unwrap().into_fields();
        new_fields.set("amount", json!(150));
        let updated = list.update(&id(5), new_fields).await.unwrap();
        assert_eq!(updated.amount().value(), Decimal::from(150));
        assert_eq!(list.get(&id(5)).unwrap(), updated);
        assert_eq!(list.selected().unwrap(), updated);
    }

    #[tokio::test]
    async fn test_ids_stay_unique() {
        let (_, list) = seeded();
        list.load().await.unwrap();
        let a = list.create(fields(json!({"name": "A"}))).await.unwrap();
        list.update(a.id(), fields(json!({"name": "B"}))).await.unwrap();
        list.create(fields(json!({"name": "C"}))).await.unwrap();
        list.remove(&id(1)).await.unwrap();
        list.load().await.unwrap();

        let ids: Vec<String> = list.snapshot().iter().map(|r| r.id().to_string()).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        assert_eq!(ids.len(), 11);
    }

    #[tokio::test]
    async fn test_load_drops_duplicate_ids() {
        let store = Arc::new(MemoryStore::new(vec![
            Record::new(1i64, fields(json!({"name": "first"}))),
            Record::new("1", fields(json!({"name": "second"}))),
            Record::new(2i64, fields(json!({"name": "other"}))),
        ]));
        let list = EntityList::new(store, Options::default());
        assert_eq!(list.load().await.unwrap(), 2);
        assert_eq!(list.get(&id(1)).unwrap().name(), "first");
    }

    #[tokio::test]
    async fn test_total_is_sum_of_visible() {
        let (_, list) = seeded();
        list.load().await.unwrap();
        list.set_filter(FilterUpdate::category("Food"));
        let view = list.view();
        let sum: Amount = view.visible().iter().map(Record::amount).sum();
        assert_eq!(view.total(), sum);
        assert_eq!(view.len(), 5);
        assert_eq!(list.total(), sum);
    }

    #[tokio::test]
    async fn test_sort_by_amount_desc() {
        let store = Arc::new(MemoryStore::new(vec![
            Record::new(1i64, fields(json!({"amount": 50}))),
            Record::new(2i64, fields(json!({"amount": 100}))),
        ]));
        let list = EntityList::new(store, Options::default());
        list.load().await.unwrap();
        list.set_filter(FilterUpdate::sort(SortBy::new("amount", Direction::Desc)));
        let ids: Vec<RecordId> = list.view().visible().iter().map(|r| r.id().clone()).collect();
        assert_eq!(ids, vec![id(2), id(1)]);
        // the canonical order is untouched
        assert_eq!(list.snapshot()[0].id(), &id(1));
    }

    #[tokio::test]
    async fn test_stale_load_is_discarded() {
        let (store, list) = seeded();
        let release = store.pause_next(Operation::List).await;

        let (first, second) = tokio::join!(list.load(), async {
            wait_for_calls(&store, Operation::List, 1).await;
            store.insert(fields(json!({"name": "Late"}))).await;
            let n = list.load().await.unwrap();
            release.send(()).unwrap();
            n
        });

        assert_eq!(second, 11);
        assert_eq!(first.unwrap(), 11);
        assert_eq!(list.len(), 11);
        assert!(!list.is_loading());
        assert_eq!(list.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_loading_tracks_latest_request() {
        let (store, list) = seeded();
        let release = store.pause_next(Operation::List).await;

        let (loaded, ()) = tokio::join!(list.load(), async {
            wait_for_calls(&store, Operation::List, 1).await;
            assert!(list.is_loading());
            assert_eq!(list.in_flight(), 1);
            assert!(list.error().is_none());
            release.send(()).unwrap();
        });

        assert_eq!(loaded.unwrap(), 10);
        assert!(!list.is_loading());
    }

    #[tokio::test]
    async fn test_update_does_not_resurrect_removed_record() {
        let (store, list) = seeded();
        list.load().await.unwrap();
        let release = store.pause_next(Operation::Update).await;

        let id3 = id(3);
        let (updated, ()) = tokio::join!(
            list.update(&id3, fields(json!({"name": "Shell"}))),
            async {
                wait_for_calls(&store, Operation::Update, 1).await;
                list.remove(&id(3)).await.unwrap();
                release.send(()).unwrap();
            }
        );

        assert!(updated.is_ok());
        assert!(list.get(&id(3)).is_none());
        assert_eq!(list.len(), 9);
    }

    #[tokio::test]
    async fn test_older_update_response_is_discarded() {
        let (store, list) = seeded();
        list.load().await.unwrap();
        let release = store.pause_next(Operation::Update).await;

        let id3 = id(3);
        let (first, ()) = tokio::join!(
            list.update(&id3, fields(json!({"name": "A"}))),
            async {
                wait_for_calls(&store, Operation::Update, 1).await;
                list.update(&id(3), fields(json!({"name": "B"})))
                    .await
                    .unwrap();
                release.send(()).unwrap();
            }
        );

        assert_eq!(first.unwrap().name(), "A");
        assert_eq!(list.get(&id(3)).unwrap().name(), "B");
    }

    #[tokio::test]
    async fn test_load_does_not_bring_back_removed_record() {
        let (store, list) = seeded();
        list.load().await.unwrap();
        let release = store.pause_next(Operation::List).await;

        let (loaded, ()) = tokio::join!(list.load(), async {
            wait_for_calls(&store, Operation::List, 2).await;
            list.remove(&id(3)).await.unwrap();
            release.send(()).unwrap();
        });

        assert_eq!(loaded.unwrap(), 9);
        assert!(list.get(&id(3)).is_none());
    }

    #[tokio::test]
    async fn test_stale_failed_load_returns_error() {
        let (store, list) = seeded();
        store.fail_next(Operation::List).await;
        let release = store.pause_next(Operation::List).await;

        let (first, second) = tokio::join!(list.load(), async {
            wait_for_calls(&store, Operation::List, 1).await;
            let n = list.load().await.unwrap();
            release.send(()).unwrap();
            n
        });

        assert_eq!(second, 10);
        let err = first.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Load);
        // the newer load succeeded, so no error is shown
        assert!(list.error().is_none());
        assert_eq!(list.len(), 10);
        assert_eq!(list.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_remove_without_pending_load_keeps_no_tombstone() {
        let (_store, list) = seeded();
        list.load().await.unwrap();
        list.remove(&id(3)).await.unwrap();
        list.remove(&id(4)).await.unwrap();
        assert!(list.state().removed.is_empty());
        assert_eq!(list.len(), 8);
    }

    #[tokio::test]
    async fn test_tombstones_cleared_after_pending_load() {
        let (store, list) = seeded();
        list.load().await.unwrap();
        let release = store.pause_next(Operation::List).await;

        let (loaded, ()) = tokio::join!(list.load(), async {
            wait_for_calls(&store, Operation::List, 2).await;
            list.remove(&id(3)).await.unwrap();
            assert_eq!(list.state().removed.len(), 1);
            release.send(()).unwrap();
        });

        assert_eq!(loaded.unwrap(), 9);
        assert!(list.state().removed.is_empty());
        list.remove(&id(4)).await.unwrap();
        assert!(list.state().removed.is_empty());
    }

    #[tokio::test]
    async fn test_load_keeps_newer_update_and_create() {
        let (store, list) = seeded();
        list.load().await.unwrap();
        let release = store.pause_next(Operation::List).await;

        let (loaded, created) = tokio::join!(list.load(), async {
            wait_for_calls(&store, Operation::List, 2).await;
            list.update(&id(3), fields(json!({"name": "Changed"})))
                .await
                .unwrap();
            let created = list.create(fields(json!({"name": "New"}))).await.unwrap();
            release.send(()).unwrap();
            created
        });

        assert_eq!(loaded.unwrap(), 11);
        assert_eq!(list.get(&id(3)).unwrap().name(), "Changed");
        assert_eq!(list.get(created.id()).unwrap().name(), "New");
    }

    #[tokio::test]
    async fn test_scope_change_invalidates_load() {
        let store = Arc::new(MemoryStore::default());
        let list = EntityList::with_scope(store.clone(), scoped(), Some("u1"));
        let release = store.pause_next(Operation::List).await;

        let (loaded, ()) = tokio::join!(list.load(), async {
            wait_for_calls(&store, Operation::List, 1).await;
            list.set_scope(Some("u2"));
            release.send(()).unwrap();
        });

        assert_eq!(loaded.unwrap(), 0);
        assert!(list.is_empty());
        assert_eq!(list.scope().unwrap().value(), "u2");

        assert_eq!(list.load().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_set_scope_resets_only_on_change() {
        let store = Arc::new(MemoryStore::default());
        let list = EntityList::with_scope(store.clone(), scoped(), Some("u1"));
        list.load().await.unwrap();
        list.select(id(1)).await.unwrap();

        list.set_scope(Some("u1"));
        assert_eq!(list.len(), 6);
        assert!(list.selected().is_some());

        list.set_scope(None::<String>);
        assert!(list.is_empty());
        assert!(list.selected().is_none());
        assert!(list.scope().is_none());
    }

    #[tokio::test]
    async fn test_set_scope_ignored_without_scope_field() {
        let (_, list) = seeded();
        list.set_scope(Some("u1"));
        assert!(list.scope().is_none());
        assert_eq!(list.load().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_select_missing_without_fallback() {
        let (store, list) = seeded();
        list.load().await.unwrap();
        list.select(id(2)).await.unwrap();

        let err = list.select(id(99)).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotFound);
        assert_eq!(list.selected().unwrap().id(), &id(2));
        assert_eq!(list.error().as_deref(), Some("Record not found"));
        assert!(!store.calls().await.contains(&Operation::GetById));
    }

    #[tokio::test]
    async fn test_select_by_record_uses_local_version() {
        let (_, list) = seeded();
        list.load().await.unwrap();
        let stale = Record::new(4i64, fields(json!({"name": "stale"})));
        let selected = list.select(&stale).await.unwrap();
        assert_eq!(selected.name(), "Chipotle Mexican Grill");
    }

    #[tokio::test]
    async fn test_select_fetches_when_enabled() {
        let store = Arc::new(MemoryStore::default());
        let options = Options {
            fallback_fetch: true,
            ..scoped()
        };
        let list = EntityList::with_scope(store.clone(), options, Some("u1"));
        list.load().await.unwrap();
        let other_client = store
            .insert(fields(json!({"name": "Lunch", "userId": "u1"})))
            .await;

        let selected = list.select(other_client.id()).await.unwrap();

        assert_eq!(selected, other_client);
        assert_eq!(list.selected().unwrap(), other_client);
        assert_eq!(list.len(), 7);
        assert!(store.calls().await.contains(&Operation::GetById));
    }

    #[tokio::test]
    async fn test_select_fetch_rejects_other_scope() {
        let store = Arc::new(MemoryStore::default());
        let options = Options {
            fallback_fetch: true,
            ..scoped()
        };
        let list = EntityList::with_scope(store.clone(), options, Some("u1"));
        list.load().await.unwrap();
        list.select(id(1)).await.unwrap();

        let err = list.select(id(7)).await.unwrap_err();

        assert_eq!(err.error_type(), ErrorType::ScopeMismatch);
        assert_eq!(err.message(), "Record not found");
        assert_eq!(list.selected().unwrap().id(), &id(1));
        assert!(list.get(&id(7)).is_none());
        assert!(!list.is_loading());
    }

    #[tokio::test]
    async fn test_select_fetch_not_in_store() {
        let store = Arc::new(MemoryStore::default());
        let options = Options {
            fallback_fetch: true,
            ..Default::default()
        };
        let list = EntityList::new(store, options);
        let err = list.select(id(42)).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotFound);
        assert!(list.selected().is_none());
        assert!(list.error().is_some());
    }

    #[tokio::test]
    async fn test_dispatch() {
        let (_, list) = seeded();
        assert_eq!(
            list.dispatch(Action::Load).await.unwrap(),
            Outcome::Loaded { count: 10 }
        );
        assert_eq!(
            list.dispatch(Action::SetFilter(FilterUpdate::search("gas")))
                .await
                .unwrap(),
            Outcome::FilterChanged
        );
        assert_eq!(list.view().len(), 1);

        let outcome = list.dispatch(Action::Select(id(3).into())).await.unwrap();
        assert!(matches!(outcome, Outcome::Selected { record } if record.id() == &id(3)));

        let outcome = list.dispatch(Action::Delete(id(3))).await.unwrap();
        assert_eq!(outcome, Outcome::Deleted { id: id(3) });
        assert!(list.view().is_empty());
        assert!(list.selected().is_none());

        list.dispatch(Action::Select(id(4).into())).await.unwrap();
        assert_eq!(
            list.dispatch(Action::ClearSelection).await.unwrap(),
            Outcome::SelectionCleared
        );
        assert!(list.selected().is_none());
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let value = serde_json::to_value(Outcome::Loaded { count: 3 }).unwrap();
        assert_eq!(value, json!({"outcome": "loaded", "count": 3}));
    }
}
