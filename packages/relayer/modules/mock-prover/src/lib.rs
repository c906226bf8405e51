//! The `mock` module: a prover for test networks that trusts its counterparty.
//!
//! Client states are plain JSON and proofs are a SHA-256 commitment over the
//! proven pair, so they can be checked without any light client logic.

#![deny(clippy::nursery, clippy::pedantic, warnings)]
#![allow(missing_docs)]

use std::sync::Arc;

use anyhow::ensure;
use ibc_relayer_core::{
    parse_config, Backend, ConfigSchema, Error, Factory, FieldKind, LightClientState, Module,
    ProverBackend, Role, StateProof,
};
use serde_json::json;
use sha2::{Digest, Sha256};

/// The identifier of this module in configuration files.
pub const MODULE_ID: &str = "mock";

/// The light client type produced by [`MockProver`].
pub const CLIENT_TYPE: &str = "mock-client";

const DEFAULT_COMMITMENT_PREFIX: &str = "ibc";

/// The `MockModule` provides a prover that does not verify anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockModule;

/// The configuration of a mock prover.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    /// Number of blocks behind the tip considered final.
    #[serde(default)]
    pub finality_delay: u64,
    /// Prefix mixed into every commitment.
    #[serde(default = "default_commitment_prefix")]
    pub commitment_prefix: String,
}

fn default_commitment_prefix() -> String {
    DEFAULT_COMMITMENT_PREFIX.to_string()
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            finality_delay: 0,
            commitment_prefix: default_commitment_prefix(),
        }
    }
}

/// A prover whose proofs are SHA-256 commitments.
#[derive(Clone, Debug)]
pub struct MockProver {
    config: MockConfig,
}

impl MockProver {
    /// Create a prover from `config`.
    #[must_use]
    pub const fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// `sha256(height_be || prefix || path || value)`
    #[must_use]
    pub fn commitment(&self, height: u64, path: &str, value: &[u8]) -> [u8; 32] {
        Sha256::new()
            .chain_update(height.to_be_bytes())
            .chain_update(self.config.commitment_prefix.as_bytes())
            .chain_update(path.as_bytes())
            .chain_update(value)
            .finalize()
            .into()
    }
}

impl Backend for MockProver {
    fn role(&self) -> Role {
        Role::Prover
    }

    fn as_prover(&self) -> Option<&dyn ProverBackend> {
        Some(self)
    }
}

impl ProverBackend for MockProver {
    fn client_type(&self) -> &str {
        CLIENT_TYPE
    }

    fn create_initial_light_client_state(&self, height: u64) -> anyhow::Result<LightClientState> {
        ensure!(height > 0, "initial height must be positive");
        let client_state = json!({
            "client_type": CLIENT_TYPE,
            "latest_height": height,
            "finality_delay": self.config.finality_delay,
        });
        let consensus_state = json!({
            "height": height,
            "commitment_prefix": self.config.commitment_prefix,
        });
        Ok(LightClientState {
            client_state: serde_json::to_vec(&client_state)?,
            consensus_state: serde_json::to_vec(&consensus_state)?,
        })
    }

    fn finalized_height(&self, latest_height: u64) -> u64 {
        latest_height.saturating_sub(self.config.finality_delay)
    }

    fn prove_state(&self, height: u64, path: &str, value: &[u8]) -> anyhow::Result<StateProof> {
        ensure!(!path.is_empty(), "state path must not be empty");
        Ok(StateProof {
            proof: self.commitment(height, path, value).to_vec(),
            proof_height: height,
        })
    }
}

struct MockFactory;

#[async_trait::async_trait]
impl Factory for MockFactory {
    async fn create(&self, config: serde_json::Value) -> anyhow::Result<Box<dyn Backend>> {
        let config = if config.is_null() {
            MockConfig::default()
        } else {
            parse_config(config)?
        };
        Ok(Box::new(MockProver::new(config)))
    }
}

impl Module for MockModule {
    fn id(&self) -> &'static str {
        MODULE_ID
    }

    fn roles(&self) -> Vec<Role> {
        vec![Role::Prover]
    }

    fn schema(&self, role: Role) -> Result<ConfigSchema, Error> {
        if role != Role::Prover {
            return Err(self.unsupported(role));
        }
        Ok(ConfigSchema::new()
            .optional(
                "finality_delay",
                FieldKind::Integer,
                "Blocks behind the tip considered final",
                0,
            )
            .optional(
                "commitment_prefix",
                FieldKind::String,
                "Prefix mixed into every commitment",
                DEFAULT_COMMITMENT_PREFIX,
            ))
    }

    fn factory(&self, role: Role) -> Result<Arc<dyn Factory>, Error> {
        if role != Role::Prover {
            return Err(self.unsupported(role));
        }
        Ok(Arc::new(MockFactory))
    }

    fn description(&self) -> &'static str {
        "Trusting prover for test networks"
    }
}
