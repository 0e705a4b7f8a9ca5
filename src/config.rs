//! Configuration file handling for elist.
//!
//! The configuration file is stored at `$ELIST_HOME/config.json` and names the record store the
//! app talks to along with the per-instance options of the entity list.

use crate::container::{Options, TotalOver, ViewOptions};
use crate::error::{Error, ErrorType, IntoResult, Res};
use crate::model::{Filters, SortBy};
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

const APP_NAME: &str = "elist";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$ELIST_HOME` and from there it loads `$ELIST_HOME/config.json`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
}

impl Config {
    /// Creates the home directory and an initial `config.json` in it.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the home directory, e.g. `$HOME/elist`
    /// - `base_url` - The root of the REST service, e.g. `http://localhost:3001/api/`
    /// - `collection` - The collection the records live in, e.g. `expenses`
    /// - `scope_field` - When given, records are partitioned by this field, e.g. `userId`
    ///
    /// # Errors
    /// - Returns an error if the URL is not usable or if any file operations fail.
    pub async fn create(
        dir: impl Into<PathBuf>,
        base_url: &str,
        collection: &str,
        scope_field: Option<&str>,
    ) -> Result<Self> {
        let base_url = parse_base_url(base_url).pub_result(ErrorType::Config)?;
        if collection.trim().is_empty() {
            let e = anyhow::anyhow!("The collection name is empty");
            return Err(Error::new(ErrorType::Config, e));
        }

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the elist home directory")
            .pub_result(ErrorType::Io)?;
        let root = utils::canonicalize(&maybe_relative)
            .await
            .pub_result(ErrorType::Io)?;
        let config_path = root.join(CONFIG_JSON);

        let mut config_file = ConfigFile::new(base_url, collection.trim());
        config_file.scope_field = scope_field.map(str::to_string);
        config_file
            .save(&config_path)
            .await
            .pub_result(ErrorType::Io)?;

        Ok(Self {
            root,
            config_path,
            config_file,
        })
    }

    /// This will
    /// - validate that `elist_home` exists and that the config file exists
    /// - load and validate the config file
    /// - return the loaded configuration object
    pub async fn load(elist_home: impl Into<PathBuf>) -> Result<Self> {
        Self::load_inner(elist_home.into())
            .await
            .pub_result(ErrorType::Config)
    }

    async fn load_inner(maybe_relative: PathBuf) -> Res<Self> {
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("elist home is missing, run 'elist init' first")?;
        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;
        Ok(Self {
            root,
            config_path,
            config_file,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn base_url(&self) -> &Url {
        &self.config_file.base_url
    }

    pub fn collection(&self) -> &str {
        &self.config_file.collection
    }

    pub fn scope_field(&self) -> Option<&str> {
        self.config_file.scope_field.as_deref()
    }

    /// The scope value used when none is given on the command line.
    pub fn scope(&self) -> Option<&str> {
        self.config_file.scope.as_deref()
    }

    pub fn fallback_fetch(&self) -> bool {
        self.config_file.fallback_fetch
    }

    /// Builds the options of an `EntityList` from the settings in the config file.
    pub fn options(&self) -> Options {
        let defaults = ViewOptions::default();
        let file = &self.config_file;
        Options {
            scope_field: file.scope_field.clone(),
            fallback_fetch: file.fallback_fetch,
            filters: Filters {
                sort_by: file.default_sort.clone().unwrap_or_default(),
                ..Default::default()
            },
            view: ViewOptions {
                search_fields: file
                    .search_fields
                    .clone()
                    .unwrap_or(defaults.search_fields),
                date_fields: file.date_fields.clone().unwrap_or(defaults.date_fields),
                total_over: file.total_over,
            },
        }
    }

    /// Changes a setting and writes the config file back to disk.
    #[cfg(test)]
    pub(crate) async fn edit(&mut self, f: impl FnOnce(&mut ConfigFile)) -> Res<()> {
        f(&mut self.config_file);
        self.config_file.save(&self.config_path).await
    }
}

/// Parses `s` and makes sure it ends with a slash so that the collection can be joined onto it.
fn parse_base_url(s: &str) -> Res<Url> {
    let mut url = Url::parse(s.trim()).with_context(|| format!("Invalid base URL '{s}'"))?;
    if url.cannot_be_a_base() {
        bail!("The base URL '{s}' can not have a path appended to it");
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "elist",
///   "config_version": 1,
///   "base_url": "http://localhost:3001/api/",
///   "collection": "expenses",
///   "scope_field": "userId",
///   "scope": "u1",
///   "search_fields": ["name", "category"],
///   "default_sort": "date_desc",
///   "total_over": "visible",
///   "fallback_fetch": true
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub(crate) struct ConfigFile {
    /// Application name, should always be "elist"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Root URL of the REST service
    base_url: Url,

    /// The collection, appended to `base_url`
    collection: String,

    /// The field that partitions records, e.g. the owning user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) scope_field: Option<String>,

    /// The default scope value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) scope: Option<String>,

    /// Fields the search term is matched against. Defaults to name and category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) search_fields: Option<Vec<String>>,

    /// Fields sorted as dates. Defaults to date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) date_fields: Option<Vec<String>>,

    /// The initial sort order. Defaults to date_desc
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) default_sort: Option<SortBy>,

    /// Whether the total is summed over the visible records or all of them
    #[serde(default)]
    pub(crate) total_over: TotalOver,

    /// Whether selecting a record that is not loaded fetches it from the store
    #[serde(default)]
    pub(crate) fallback_fetch: bool,
}

impl ConfigFile {
    /// Creates a ConfigFile with default settings for everything but the store location.
    pub fn new(base_url: Url, collection: impl Into<String>) -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            base_url,
            collection: collection.into(),
            scope_field: None,
            scope: None,
            search_fields: None,
            date_fields: None,
            default_sort: None,
            total_over: TotalOver::default(),
            fallback_fetch: false,
        }
    }

    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            !config.collection.is_empty(),
            "The collection is empty in config file {}",
            path.display()
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create_and_load() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("elist_home");

        let config = Config::create(&home_dir, "http://localhost:3001/api", "expenses", Some("userId"))
            .await
            .unwrap();
        assert_eq!(config.base_url().as_str(), "http://localhost:3001/api/");
        assert_eq!(config.collection(), "expenses");
        assert_eq!(config.scope_field(), Some("userId"));
        assert!(config.config_path().is_file());

        let loaded = Config::load(&home_dir).await.unwrap();
        assert_eq!(loaded.config_file, config.config_file);
        assert_eq!(loaded.root(), config.root());
    }

    #[tokio::test]
    async fn test_config_create_rejects_bad_url() {
        let dir = TempDir::new().unwrap();
        let err = Config::create(dir.path(), "not a url", "expenses", None)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);

        let err = Config::create(dir.path(), "mailto:me@example.com", "expenses", None)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);

        let err = Config::create(dir.path(), "http://localhost", " ", None)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);
    }

    #[tokio::test]
    async fn test_config_load_missing() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("nope")).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);

        let err = Config::load(dir.path()).await.unwrap_err();
        assert!(format!("{err}").contains("config file is missing"));
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "elist",
            "config_version": 1,
            "base_url": "http://localhost:3001/api/",
            "collection": "expenses"
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();
        assert_eq!(config.collection, "expenses");
        assert_eq!(config.scope_field, None);
        assert_eq!(config.total_over, TotalOver::Visible);
        assert!(!config.fallback_fetch);
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "wrong_app",
            "config_version": 1,
            "base_url": "http://localhost:3001/api/",
            "collection": "expenses"
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let result = ConfigFile::load(&config_path).await;
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[tokio::test]
    async fn test_options_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::create(dir.path(), "http://localhost/", "expenses", Some("userId"))
            .await
            .unwrap();

        let options = config.options();
        assert_eq!(options.scope_field.as_deref(), Some("userId"));
        assert_eq!(options.view, ViewOptions::default());
        assert_eq!(options.filters, Filters::default());

        config
            .edit(|file| {
                file.default_sort = Some(SortBy::new("amount", Direction::Asc));
                file.search_fields = Some(vec!["name".to_string(), "status".to_string()]);
                file.total_over = TotalOver::Canonical;
                file.fallback_fetch = true;
            })
            .await
            .unwrap();
        let reloaded = Config::load(dir.path()).await.unwrap();
        let options = reloaded.options();
        assert_eq!(options.filters.sort_by, SortBy::new("amount", Direction::Asc));
        assert_eq!(options.view.search_fields, vec!["name", "status"]);
        assert_eq!(options.view.date_fields, vec!["date"]);
        assert_eq!(options.view.total_over, TotalOver::Canonical);
        assert!(options.fallback_fetch);
    }

    #[test]
    fn test_config_file_serialization_omits_none_fields() {
        let url = Url::parse("http://localhost/").unwrap();
        let json = serde_json::to_string(&ConfigFile::new(url, "expenses")).unwrap();
        assert!(!json.contains("scope_field"));
        assert!(!json.contains("default_sort"));
        assert!(json.contains("total_over"));
    }
}
