//! Command handlers for the elist CLI.
//!
//! This module contains implementations for all CLI subcommands. Every handler except `init`
//! works on an `EntityList` opened with [`open`].

mod add;
mod delete;
mod init;
mod list;
mod show;
mod update;

use crate::args::KeyValue;
use crate::container::EntityList;
use crate::error::{ErrorType, IntoResult};
use crate::model::Fields;
use crate::{api, Config, Mode, Result};
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use add::add;
pub use delete::delete;
pub use init::init;
pub use list::{list, Listing};
pub use show::show;
pub use update::update;

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Opens the entity list described by `config`, backed by the store selected by `mode`.
///
/// `scope` overrides the scope value from the config file. Nothing is loaded yet.
pub fn open(config: &Config, mode: Mode, scope: Option<&str>) -> Result<EntityList> {
    let store = api::store(config, mode).pub_result(ErrorType::Config)?;
    let scope = scope.or(config.scope());
    debug!(
        "Opening '{}' at {} with scope {:?}",
        config.collection(),
        config.base_url(),
        scope
    );
    Ok(EntityList::with_scope(store, config.options(), scope))
}

/// Builds `Fields` from the `--field key=value` pairs of a command.
fn fields_from(pairs: &[KeyValue]) -> Fields {
    let mut fields = Fields::default();
    for pair in pairs {
        fields.set(pair.key(), pair.value().clone());
    }
    fields
}

fn plural(count: usize, word: &str) -> String {
    format!("{} {}{}", count, word, if count == 1 { "" } else { "s" })
}
