//! Clients for the record store: the remote CRUD service that owns the records.
//!
//! The `RecordStore` trait is the only thing the container knows about. `RestStore` talks to a
//! json-server style REST endpoint and `MemoryStore` keeps everything in memory so that the whole
//! program can run, top-to-bottom, without a server.

mod memory;
mod rest;

use crate::model::{Fields, Record, RecordId, Scope};
use crate::Config;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// When this environment variable is set and non-empty, the app uses a seeded `MemoryStore`
/// instead of the configured REST endpoint.
const TEST_MODE_ENV: &str = "ELIST_IN_TEST_MODE";

/// The CRUD contract of the record store. Every call is asynchronous and may fail.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Lists the records, restricted to `scope` when one is given.
    async fn list(&self, scope: Option<&Scope>) -> anyhow::Result<Vec<Record>>;

    /// Creates a record from `fields`. The store assigns the id.
    async fn create(&self, fields: &Fields) -> anyhow::Result<Record>;

    /// Replaces the record `id` with `fields`.
    async fn update(&self, id: &RecordId, fields: &Fields) -> anyhow::Result<Record>;

    /// Deletes the record `id`.
    async fn delete(&self, id: &RecordId) -> anyhow::Result<()>;

    /// Fetches a single record. `None` means the store does not have it.
    async fn get_by_id(&self, id: &RecordId) -> anyhow::Result<Option<Record>>;
}

/// The calls a `RecordStore` can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Create,
    Update,
    Delete,
    GetById,
}

serde_plain::derive_display_from_serialize!(Operation);

/// Which record store backs the app.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Use the REST endpoint from the config file.
    #[default]
    Rest,
    /// Use an in-memory store seeded with demo data.
    Testing,
}

impl Mode {
    /// Returns `Mode::Testing` when `ELIST_IN_TEST_MODE` is set and non-empty, otherwise
    /// `Mode::Rest`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(s) if !s.is_empty() => Mode::Testing,
            _ => Mode::Rest,
        }
    }
}

/// Builds the record store selected by `mode`.
pub(crate) fn store(config: &Config, mode: Mode) -> anyhow::Result<Arc<dyn RecordStore>> {
    Ok(match mode {
        Mode::Rest => Arc::new(RestStore::new(
            config.base_url().clone(),
            config.collection(),
        )?),
        Mode::Testing => Arc::new(MemoryStore::default()),
    })
}
