//! Defines the top level configuration for the relayer.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use thiserror::Error;

/// Directory under `$HOME` used when `--home` is not given.
pub const DEFAULT_HOME_DIR: &str = ".relayer";

/// The top level configuration for the relayer.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[allow(clippy::module_name_repetitions)]
pub struct RelayerConfig {
    /// The chains the relayer knows about.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// The configuration of one chain: which backends serve it and how.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[allow(clippy::module_name_repetitions)]
pub struct ChainConfig {
    /// The name used to refer to the chain on the command line.
    pub name: String,
    /// Whether the chain is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The chain backend.
    pub chain: BackendConfig,
    /// The signer backend, if the chain submits transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<BackendConfig>,
    /// The prover backend.
    pub prover: BackendConfig,
}

/// Selects a module by identifier and carries its custom configuration.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[allow(clippy::module_name_repetitions)]
pub struct BackendConfig {
    /// The identifier of the module providing the backend.
    pub module: String,
    /// The custom configuration for the module.
    #[serde(default)]
    pub config: Value,
}

/// Errors that can occur loading or saving the relayer config.
#[derive(Debug, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("I/O error on `{0}`: {1}")]
    Io(String, #[source] std::io::Error),

    /// The file is not a valid configuration.
    #[error("invalid config `{file}` at {}: {}", source.path(), source.inner())]
    Parse {
        /// The offending file.
        file: String,
        /// The JSON path and the original serde error.
        #[source]
        source: serde_path_to_error::Error<serde_json::Error>,
    },

    /// `--home` was not given and the user's home directory is unknown.
    #[error("cannot locate the home directory, pass --home or set RELAYER_HOME")]
    HomeDirNotFound,

    /// Two chains share a name.
    #[error("chain `{0}` is defined more than once")]
    DuplicateChain(String),

    /// The configuration could not be encoded.
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Returns true, used as a default value for boolean fields.
const fn default_true() -> bool {
    true
}

/// The home directory used when none is given on the command line.
///
/// # Errors
/// Returns [`ConfigError::HomeDirNotFound`] if the user's home directory
/// cannot be determined.
pub fn default_home() -> Result<PathBuf, ConfigError> {
    relayer_home(dirs::home_dir())
}

fn relayer_home(user_home: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    let user_home = user_home.ok_or(ConfigError::HomeDirNotFound)?;
    Ok(user_home.join(DEFAULT_HOME_DIR))
}

/// The location of the configuration file inside `home`.
#[must_use]
pub fn config_path(home: &Path) -> PathBuf {
    home.join("config").join("config.json")
}

impl RelayerConfig {
    /// Load a `RelayerConfig` from a JSON file on disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, does not parse, or names
    /// a chain twice.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        let config: Self = parse_json(&bytes, path)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |e| ConfigError::Io(path.display().to_string(), e);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        fs::write(path, bytes).map_err(io_err)
    }

    /// Returns the chain named `name`.
    #[must_use]
    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.name == name)
    }

    /// Append a chain.
    ///
    /// # Errors
    /// Returns [`ConfigError::DuplicateChain`] if the name is taken.
    pub fn add_chain(&mut self, chain: ChainConfig) -> Result<(), ConfigError> {
        if self.chain(&chain.name).is_some() {
            return Err(ConfigError::DuplicateChain(chain.name));
        }
        self.chains.push(chain);
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, chain) in self.chains.iter().enumerate() {
            if self.chains[..i].iter().any(|c| c.name == chain.name) {
                return Err(ConfigError::DuplicateChain(chain.name.clone()));
            }
        }
        Ok(())
    }
}

impl ChainConfig {
    /// Load a single chain definition from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not parse.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        parse_json(&bytes, path)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(bytes: &[u8], path: &Path) -> Result<T, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|source| ConfigError::Parse {
        file: path.display().to_string(),
        source,
    })
}

/// Parse a module configuration value into the target struct while producing
/// detailed path-aware error messages.
///
/// Every module can reuse this in its factory. It leverages
/// `serde_path_to_error` to include the exact JSON path of the failure
/// (e.g. `ibc_address`).
///
/// # Errors
/// Returns an [`anyhow::Error`] with the precise path and the original serde
/// error message.
pub fn parse_config<T>(value: Value) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    // Going through a string lets the JSON deserializer report line/column
    // information alongside the path.
    let json_string = value.to_string();

    let mut deserializer = serde_json::Deserializer::from_str(&json_string);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer)
        .map_err(|e| anyhow::anyhow!("config error at {}: {}", e.path(), e.inner()))
}
