//! elist: a state container for a list of records kept by a remote CRUD service.
//!
//! The heart of the crate is [`EntityList`], which holds the canonical records, the active
//! filters, the selected record and the loading/error flags, and derives the visible records and
//! their total on demand. Records are read and written through a [`RecordStore`]; [`RestStore`]
//! talks to a json-server style REST endpoint and [`MemoryStore`] keeps everything in memory.
//!
//! The `elist` binary wraps this in a small CLI configured from `$ELIST_HOME/config.json`.

mod api;
pub mod args;
pub mod commands;
mod config;
mod container;
mod error;
pub mod model;
mod utils;


pub use api::{MemoryStore, Mode, Operation, RecordStore, RestStore};
pub use config::Config;
pub use container::{
    derive, Action, EntityList, Options, Outcome, Selector, TotalOver, View, ViewOptions,
};
pub use error::{Error, ErrorType, Result};
