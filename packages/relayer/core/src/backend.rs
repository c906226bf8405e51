//! Runtime interfaces of the backend instances built by module factories.
//!
//! A [`Backend`] reports its [`Role`] and exposes the matching role interface
//! through one of the `as_*` accessors. New roles add a defaulted accessor, so
//! existing modules keep compiling unchanged.

use std::fmt::Debug;

use crate::module::Role;

/// A backend instance produced by a [`Factory`](crate::module::Factory).
pub trait Backend: Send + Sync + Debug {
    /// The role this instance was built for.
    fn role(&self) -> Role;

    /// Returns the chain interface if this instance is a chain backend.
    fn as_chain(&self) -> Option<&dyn ChainBackend> {
        None
    }

    /// Returns the signer interface if this instance is a signer backend.
    fn as_signer(&self) -> Option<&dyn SignerBackend> {
        None
    }

    /// Returns the prover interface if this instance is a prover backend.
    fn as_prover(&self) -> Option<&dyn ProverBackend> {
        None
    }
}

/// The `ChainBackend` trait is the chain facing side of the relayer.
#[async_trait::async_trait]
pub trait ChainBackend: Send + Sync {
    /// The identifier of the chain in the relayer configuration.
    fn chain_id(&self) -> &str;

    /// Queries the latest height of the chain.
    async fn latest_height(&self) -> anyhow::Result<u64>;
}

/// The `SignerBackend` trait signs digests on behalf of a chain backend.
pub trait SignerBackend: Send + Sync {
    /// The address of the signing key.
    fn address(&self) -> String;

    /// Signs a 32 byte digest.
    ///
    /// # Errors
    /// Returns an error if the digest is malformed or signing fails.
    fn sign(&self, digest: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Encoded light client state used to create a client on the counterparty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LightClientState {
    /// The encoded client state.
    pub client_state: Vec<u8>,
    /// The encoded consensus state at the initial height.
    pub consensus_state: Vec<u8>,
}

/// A proof of a key/value pair at a given height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateProof {
    /// The encoded proof.
    pub proof: Vec<u8>,
    /// The height at which the proof was produced.
    pub proof_height: u64,
}

/// The `ProverBackend` trait produces light client states and proofs.
pub trait ProverBackend: Send + Sync {
    /// The light client type produced by this prover.
    fn client_type(&self) -> &str;

    /// Creates the initial light client state at `height`.
    ///
    /// # Errors
    /// Returns an error if the state cannot be encoded.
    fn create_initial_light_client_state(&self, height: u64) -> anyhow::Result<LightClientState>;

    /// Returns the latest height considered final given the chain's `latest_height`.
    fn finalized_height(&self, latest_height: u64) -> u64;

    /// Proves that `path` maps to `value` at `height`.
    ///
    /// # Errors
    /// Returns an error if the proof cannot be produced.
    fn prove_state(&self, height: u64, path: &str, value: &[u8]) -> anyhow::Result<StateProof>;
}
