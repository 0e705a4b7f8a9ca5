//! These structs provide the CLI interface for the elist CLI.

use crate::model::{RecordId, SortBy};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// elist: A command-line client for a list of records kept by a REST service.
///
/// Records live in a json-server style collection, e.g. `http://localhost:3001/api/expenses`.
/// elist loads them, filters and sorts them locally, shows a running total of their `amount`
/// field, and adds, changes and deletes records through the service.
///
/// When the collection is shared by several owners, configure a scope field (e.g. `userId`) and
/// pass `--scope` so that only one owner's records are touched.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory and the configuration file.
    ///
    /// This is the first command you should run. Decide what directory you want to keep the
    /// configuration in and pass this as --elist-home. By default, it will be $HOME/elist.
    Init(InitArgs),
    /// Load the records and print the ones that match the filters, along with their total.
    List(ListArgs),
    /// Add a record.
    Add(AddArgs),
    /// Change a record. Fields that are not given keep their current values.
    Update(UpdateArgs),
    /// Delete one or more records.
    Delete(DeleteArgs),
    /// Print a single record.
    Show(ShowArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where the elist configuration is held. Defaults to ~/elist
    #[arg(long, env = "ELIST_HOME", default_value_t = default_elist_home())]
    elist_home: DisplayPath,

    /// The scope value, e.g. the id of the user whose records you want to see. Overrides the
    /// scope in the config file.
    #[arg(long, env = "ELIST_SCOPE")]
    scope: Option<String>,
}

impl Common {
    pub fn new(log_level: LevelFilter, elist_home: PathBuf, scope: Option<String>) -> Self {
        Self {
            log_level,
            elist_home: elist_home.into(),
            scope,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn elist_home(&self) -> &DisplayPath {
        &self.elist_home
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

/// (Not shown): Args for the `elist init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The root URL of the REST service, e.g. http://localhost:3001/api
    #[arg(long)]
    base_url: String,

    /// The name of the collection, e.g. expenses
    #[arg(long)]
    collection: String,

    /// The field that holds the owner of a record, e.g. userId. When set, a scope value is
    /// required to load records.
    #[arg(long)]
    scope_field: Option<String>,
}

impl InitArgs {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        scope_field: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            collection: collection.into(),
            scope_field,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn scope_field(&self) -> Option<&str> {
        self.scope_field.as_deref()
    }
}

/// How `elist list` prints the records.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned columns followed by the total.
    #[default]
    Table,
    /// The records and the total as a JSON object.
    Json,
    /// Comma separated values with a header row.
    Csv,
}

serde_plain::derive_display_from_serialize!(OutputFormat);
serde_plain::derive_fromstr_from_deserialize!(OutputFormat);

/// (Not shown): Args for the `elist list` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct ListArgs {
    /// Only show records whose searchable fields contain this text, ignoring case.
    #[arg(long)]
    search: Option<String>,

    /// Only show records in this category. The match is exact.
    #[arg(long)]
    category: Option<String>,

    /// Only show records where a field has exactly this value, e.g. --where status=pending. Can be
    /// given more than once.
    #[arg(long = "where")]
    conditions: Vec<KeyValue>,

    /// The sort order, e.g. date_desc or amount_asc. Unrecognized values keep the order the
    /// service returned.
    #[arg(long)]
    sort: Option<SortBy>,

    /// The output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

impl ListArgs {
    pub fn new(
        search: Option<String>,
        category: Option<String>,
        conditions: Vec<KeyValue>,
        sort: Option<SortBy>,
        format: OutputFormat,
    ) -> Self {
        Self {
            search,
            category,
            conditions,
            sort,
            format,
        }
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn conditions(&self) -> &[KeyValue] {
        &self.conditions
    }

    pub fn sort(&self) -> Option<&SortBy> {
        self.sort.as_ref()
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

/// (Not shown): Args for the `elist add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// A field of the new record, e.g. --field name=Rent --field amount=1200
    #[arg(long = "field", required = true)]
    fields: Vec<KeyValue>,
}

impl AddArgs {
    pub fn new(fields: Vec<KeyValue>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[KeyValue] {
        &self.fields
    }
}

/// (Not shown): Args for the `elist update` command.
#[derive(Debug, Parser, Clone)]
pub struct UpdateArgs {
    /// The id of the record to change.
    id: RecordId,

    /// A field to change, e.g. --field amount=1300
    #[arg(long = "field", required = true)]
    fields: Vec<KeyValue>,
}

impl UpdateArgs {
    pub fn new(id: impl Into<RecordId>, fields: Vec<KeyValue>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn fields(&self) -> &[KeyValue] {
        &self.fields
    }
}

/// (Not shown): Args for the `elist delete` command.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    /// The ids of the records to delete.
    #[arg(required = true)]
    ids: Vec<RecordId>,
}

impl DeleteArgs {
    pub fn new(ids: Vec<RecordId>) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }
}

/// (Not shown): Args for the `elist show` command.
#[derive(Debug, Parser, Clone)]
pub struct ShowArgs {
    /// The id of the record to print.
    id: RecordId,
}

impl ShowArgs {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }
}

/// A `key=value` pair given on the command line. The value is read as a JSON number or boolean
/// when it looks like one, otherwise it is text.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    key: String,
    value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value as text, the way it would be compared by an equality filter.
    pub fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl FromStr for KeyValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value, got '{s}'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("The key is empty in '{s}'"));
        }
        let value = match serde_json::from_str::<Value>(value) {
            Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
            _ => Value::String(value.to_string()),
        };
        Ok(Self::new(key, value))
    }
}

fn default_elist_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("elist"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --elist-home or ELIST_HOME instead of relying on the default \
                elist home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("elist")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
