//! Settings consumed by the task store
//!
//! A [`Config`] is built once by the front-end and then passed (by reference) to the constructors that need it.
//! Nothing in this crate modifies it afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::task::ListName;

/// Name of the CalDAV collection that holds the tasks, under `<sync.url>/<sync.username>/`
pub const DEFAULT_COLLECTION: &str = "cbratasks";

/// Store and sync settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Folder that contains the task files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// The list new tasks go to, unless told otherwise
    #[serde(default)]
    pub default_list: ListName,

    #[serde(default)]
    pub sync: SyncConfig,

    /// Name of the remote collection
    #[serde(default = "default_collection")]
    pub collection: String,
}

/// How to reach the CalDAV server
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Everything the CalDAV client needs, once the configuration has been validated
#[derive(Clone, Debug)]
pub struct SyncCredentials {
    pub url: Url,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_data_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("cbra").join("tasks"),
        None => PathBuf::from(".cbra-tasks"),
    }
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_list: ListName::default(),
            sync: SyncConfig::default(),
            collection: default_collection(),
        }
    }
}

impl Config {
    /// A configuration that stores its files in `data_dir`, with sync disabled
    pub fn with_data_dir<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Parse (and validate) a TOML configuration
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|err| Error::Config(format!("invalid configuration: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() || self.collection.contains('/') {
            return Err(Error::Config(format!("invalid collection name {:?}", self.collection)));
        }
        self.sync_credentials().map(|_| ())
    }

    /// The sync settings, or `None` when sync is disabled
    pub fn sync_credentials(&self) -> Result<Option<SyncCredentials>> {
        if self.sync.enabled == false {
            return Ok(None);
        }

        let url = match self.sync.url.as_deref().map(str::trim) {
            None | Some("") => return Err(Error::Config("sync is enabled but sync.url is not set".to_string())),
            Some(url) => Url::parse(url)?,
        };
        let username = match self.sync.username.as_deref().map(str::trim) {
            None | Some("") => return Err(Error::Config("sync is enabled but sync.username is not set".to_string())),
            Some(username) => username.to_string(),
        };
        let password = self.sync.password.clone().unwrap_or_default();

        Ok(Some(SyncCredentials { url, username, password }))
    }
}
