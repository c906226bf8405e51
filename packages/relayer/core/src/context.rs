//! What a command handler gets to work with.

use std::{future::Future, path::PathBuf};

use clap::ArgMatches;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{self, ConfigError, RelayerConfig},
    registry::Registry,
};

/// The id of the global `--home` flag.
pub const HOME_ARG: &str = "home";

/// Everything a command handler may use: its parsed arguments, the registry
/// of modules and the cancellation signal of the process.
pub struct CommandContext<'a> {
    matches: &'a ArgMatches,
    registry: &'a Registry,
    home: Option<PathBuf>,
    cancellation: CancellationToken,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(
        matches: &'a ArgMatches,
        registry: &'a Registry,
        cancellation: CancellationToken,
    ) -> Self {
        let home = matches
            .try_get_one::<PathBuf>(HOME_ARG)
            .ok()
            .flatten()
            .cloned();
        Self {
            matches,
            registry,
            home,
            cancellation,
        }
    }

    /// Arguments of the selected command, including global flags.
    #[must_use]
    pub const fn matches(&self) -> &'a ArgMatches {
        self.matches
    }

    /// The registry of modules. It is read-only once commands run.
    #[must_use]
    pub const fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// The relayer home directory: `--home` if given, `~/.relayer` otherwise.
    ///
    /// # Errors
    /// Returns an error if no `--home` was given and the user's home
    /// directory is unknown.
    pub fn home(&self) -> Result<PathBuf, ConfigError> {
        self.home.clone().map_or_else(config::default_home, Ok)
    }

    /// The location of the configuration file.
    ///
    /// # Errors
    /// See [`CommandContext::home`].
    pub fn config_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(config::config_path(&self.home()?))
    }

    /// Load the configuration file.
    ///
    /// # Errors
    /// Returns an error if the file is missing or invalid.
    pub fn load_config(&self) -> Result<RelayerConfig, ConfigError> {
        RelayerConfig::from_file(self.config_path()?)
    }

    /// The token cancelled when the process is asked to stop.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Drive `fut` to completion unless the process is asked to stop first.
    ///
    /// # Errors
    /// Returns an error if cancellation wins the race.
    pub async fn until_cancelled<F: Future>(&self, fut: F) -> anyhow::Result<F::Output> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(anyhow::anyhow!("command cancelled")),
            output = fut => Ok(output),
        }
    }
}
