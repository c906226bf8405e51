//! Defines the [`Module`] trait that must be implemented by all relayer modules.

use std::{
    fmt,
    marker::{Send, Sync},
    sync::Arc,
};

use crate::{backend::Backend, command::CommandFragment, error::Error, schema::ConfigSchema};

/// A capability category a module can fulfill.
#[non_exhaustive]
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Deserialize,
    serde::Serialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Talks to a chain: queries state and submits transactions.
    Chain,
    /// Holds keys and signs on behalf of a chain backend.
    Signer,
    /// Produces light-client states and state proofs.
    Prover,
}

impl Role {
    /// Every role, in the order used for listings.
    pub const ALL: [Self; 3] = [Self::Chain, Self::Signer, Self::Prover];

    /// Returns the lower case name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chain => "chain",
            Self::Signer => "signer",
            Self::Prover => "prover",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The `Module` trait defines the interface for a pluggable relayer module.
///
/// Declaring capabilities must not perform I/O or touch process-wide state;
/// all work happens later, when a [`Factory`] or a command handler runs.
pub trait Module: Send + Sync + 'static {
    /// Returns the identifier of the module.
    /// This identifier is used to select the module in the configuration file.
    fn id(&self) -> &'static str;

    /// Returns the roles this module fulfills.
    fn roles(&self) -> Vec<Role>;

    /// Returns the configuration schema for the given role.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedRole`] if the module does not fill `role`.
    fn schema(&self, role: Role) -> Result<ConfigSchema, Error>;

    /// Returns the constructor of backend instances for the given role.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedRole`] if the module does not fill `role`.
    fn factory(&self, role: Role) -> Result<Arc<dyn Factory>, Error>;

    /// Returns the command fragments this module adds to the CLI.
    fn commands(&self) -> Vec<CommandFragment> {
        Vec::new()
    }

    /// A one-line description used in listings.
    fn description(&self) -> &'static str {
        ""
    }

    /// Shorthand for the error returned when `role` is not supported.
    fn unsupported(&self, role: Role) -> Error {
        Error::UnsupportedRole {
            id: self.id().to_string(),
            role,
        }
    }
}

/// Constructs backend instances from module specific configuration.
///
/// Every call must produce an independent instance, and invalid or incomplete
/// configuration must be rejected with a descriptive error.
#[async_trait::async_trait]
pub trait Factory: Send + Sync {
    /// Creates a backend instance from the given configuration.
    async fn create(&self, config: serde_json::Value) -> anyhow::Result<Box<dyn Backend>>;
}
