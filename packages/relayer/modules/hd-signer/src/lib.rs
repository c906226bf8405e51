//! The `hd` module: a signer deriving secp256k1 keys from a BIP-39 mnemonic.

#![deny(clippy::nursery, clippy::pedantic, warnings)]
#![allow(missing_docs)]

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use anyhow::{ensure, Context as _};
use clap::{Arg, ArgAction};
use ibc_relayer_core::{
    parse_config, Backend, CommandContext, CommandFragment, CommandHandler, ConfigSchema, Error,
    Factory, FieldKind, Module, Role, SignerBackend,
};
use tracing::debug;

/// The identifier of this module in configuration files.
pub const MODULE_ID: &str = "hd";

/// The first account of the standard Ethereum derivation path.
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// The `HdModule` provides a signer backed by a hierarchical deterministic wallet.
#[derive(Clone, Copy, Debug, Default)]
pub struct HdModule;

/// The configuration of an HD signer.
#[derive(Clone, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct HdConfig {
    /// The BIP-39 mnemonic phrase.
    pub mnemonic: String,
    /// The BIP-32 derivation path.
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    DEFAULT_DERIVATION_PATH.to_string()
}

impl fmt::Debug for HdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdConfig")
            .field("mnemonic", &"<redacted>")
            .field("path", &self.path)
            .finish()
    }
}

/// A key derived from a mnemonic.
pub struct HdSigner {
    signer: PrivateKeySigner,
    path: String,
}

impl HdSigner {
    /// Derive the key at `config.path`.
    ///
    /// # Errors
    /// Returns an error if the mnemonic or the derivation path is invalid.
    pub fn new(config: &HdConfig) -> anyhow::Result<Self> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(config.mnemonic.trim())
            .derivation_path(&config.path)
            .with_context(|| format!("invalid derivation path `{}`", config.path))?
            .build()
            .context("invalid mnemonic")?;
        debug!(address = %signer.address(), path = %config.path, "derived hd key");
        Ok(Self {
            signer,
            path: config.path.clone(),
        })
    }

    /// The address of the derived key.
    #[must_use]
    pub fn eth_address(&self) -> Address {
        self.signer.address()
    }

    /// The derivation path of the key.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for HdSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdSigner")
            .field("address", &self.eth_address())
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Backend for HdSigner {
    fn role(&self) -> Role {
        Role::Signer
    }

    fn as_signer(&self) -> Option<&dyn SignerBackend> {
        Some(self)
    }
}

impl SignerBackend for HdSigner {
    fn address(&self) -> String {
        self.eth_address().to_checksum(None)
    }

    fn sign(&self, digest: &[u8]) -> anyhow::Result<Vec<u8>> {
        ensure!(
            digest.len() == B256::len_bytes(),
            "digest must be {} bytes, got {}",
            B256::len_bytes(),
            digest.len()
        );
        let signature = self.signer.sign_hash_sync(&B256::from_slice(digest))?;
        // r || s || v with v in {27, 28}
        Ok(signature.as_bytes().to_vec())
    }
}

struct HdFactory;

#[async_trait::async_trait]
impl Factory for HdFactory {
    async fn create(&self, config: serde_json::Value) -> anyhow::Result<Box<dyn Backend>> {
        let config: HdConfig = parse_config(config)?;
        Ok(Box::new(HdSigner::new(&config)?))
    }
}

impl Module for HdModule {
    fn id(&self) -> &'static str {
        MODULE_ID
    }

    fn roles(&self) -> Vec<Role> {
        vec![Role::Signer]
    }

    fn schema(&self, role: Role) -> Result<ConfigSchema, Error> {
        if role != Role::Signer {
            return Err(self.unsupported(role));
        }
        Ok(ConfigSchema::new()
            .required("mnemonic", FieldKind::String, "BIP-39 mnemonic phrase")
            .optional(
                "path",
                FieldKind::String,
                "BIP-32 derivation path",
                DEFAULT_DERIVATION_PATH,
            ))
    }

    fn factory(&self, role: Role) -> Result<Arc<dyn Factory>, Error> {
        if role != Role::Signer {
            return Err(self.unsupported(role));
        }
        Ok(Arc::new(HdFactory))
    }

    fn commands(&self) -> Vec<CommandFragment> {
        vec![
            CommandFragment::new([MODULE_ID], "Inspect HD wallet keys"),
            CommandFragment::new([MODULE_ID, "address"], "Print the address derived from a mnemonic")
                .arg(
                    Arg::new("mnemonic")
                        .long("mnemonic")
                        .env("RELAYER_MNEMONIC")
                        .hide_env_values(true)
                        .required(true)
                        .action(ArgAction::Set)
                        .help("BIP-39 mnemonic phrase"),
                )
                .arg(
                    Arg::new("path")
                        .long("path")
                        .default_value(DEFAULT_DERIVATION_PATH)
                        .action(ArgAction::Set)
                        .help("BIP-32 derivation path"),
                )
                .handler(PrintAddress),
        ]
    }

    fn description(&self) -> &'static str {
        "BIP-39/BIP-32 secp256k1 signer"
    }
}

struct PrintAddress;

#[async_trait::async_trait]
impl CommandHandler for PrintAddress {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let matches = ctx.matches();
        let config = HdConfig {
            mnemonic: matches
                .get_one::<String>("mnemonic")
                .context("missing mnemonic")?
                .clone(),
            path: matches
                .get_one::<String>("path")
                .cloned()
                .unwrap_or_else(default_path),
        };
        let signer = HdSigner::new(&config)?;
        println!("{}", signer.address());
        Ok(())
    }
}
