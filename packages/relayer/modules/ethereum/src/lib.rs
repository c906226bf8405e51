//! The `ethereum` module: a chain backend for EVM execution nodes.

#![deny(clippy::nursery, clippy::pedantic, warnings)]
#![allow(missing_docs)]

pub mod rpc;

use std::{sync::Arc, time::Duration};

use alloy_primitives::Address;
use anyhow::{bail, ensure, Context as _};
use clap::{Arg, ArgAction};
use ibc_relayer_core::{
    parse_config, Backend, ChainBackend, CommandContext, CommandFragment, CommandHandler,
    ConfigSchema, Error, Factory, FieldKind, Module, Role,
};
use tracing::info;
use url::Url;

use rpc::RpcClient;

/// The identifier of this module in configuration files.
pub const MODULE_ID: &str = "ethereum";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// The `EthereumModule` provides a chain backend talking to an Ethereum
/// JSON-RPC endpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct EthereumModule;

/// The configuration of an Ethereum chain backend.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct EthereumConfig {
    /// The chain identifier used by the relayer.
    pub chain_id: String,
    /// The EIP-155 chain id.
    pub eth_chain_id: u64,
    /// The JSON-RPC endpoint.
    pub rpc_addr: String,
    /// The address of the IBC router contract.
    pub ibc_address: Address,
    /// Per request timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// A connected Ethereum chain.
#[derive(Debug)]
pub struct EthereumChain {
    config: EthereumConfig,
    client: RpcClient,
}

impl EthereumChain {
    /// Validate `config` and prepare a client. No request is sent.
    ///
    /// # Errors
    /// Returns an error if `rpc_addr` is not an http(s) URL.
    pub fn new(config: EthereumConfig) -> anyhow::Result<Self> {
        let url = Url::parse(&config.rpc_addr)
            .with_context(|| format!("invalid rpc_addr `{}`", config.rpc_addr))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "invalid rpc_addr `{}`: unsupported scheme `{}`",
            config.rpc_addr,
            url.scheme()
        );
        let client = RpcClient::new(url, Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    /// The configuration this chain was built from.
    #[must_use]
    pub const fn config(&self) -> &EthereumConfig {
        &self.config
    }

    /// The address of the IBC router contract.
    #[must_use]
    pub const fn ibc_address(&self) -> Address {
        self.config.ibc_address
    }
}

impl Backend for EthereumChain {
    fn role(&self) -> Role {
        Role::Chain
    }

    fn as_chain(&self) -> Option<&dyn ChainBackend> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl ChainBackend for EthereumChain {
    fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    async fn latest_height(&self) -> anyhow::Result<u64> {
        self.client
            .block_number()
            .await
            .with_context(|| format!("failed to query {}", self.client.url()))
    }
}

struct EthereumFactory;

#[async_trait::async_trait]
impl Factory for EthereumFactory {
    async fn create(&self, config: serde_json::Value) -> anyhow::Result<Box<dyn Backend>> {
        let config: EthereumConfig = parse_config(config)?;
        Ok(Box::new(EthereumChain::new(config)?))
    }
}

impl Module for EthereumModule {
    fn id(&self) -> &'static str {
        MODULE_ID
    }

    fn roles(&self) -> Vec<Role> {
        vec![Role::Chain]
    }

    fn schema(&self, role: Role) -> Result<ConfigSchema, Error> {
        if role != Role::Chain {
            return Err(self.unsupported(role));
        }
        Ok(ConfigSchema::new()
            .required("chain_id", FieldKind::String, "Chain identifier used by the relayer")
            .required("eth_chain_id", FieldKind::Integer, "EIP-155 chain id")
            .required("rpc_addr", FieldKind::String, "JSON-RPC endpoint (http or https)")
            .required("ibc_address", FieldKind::String, "Address of the IBC router contract")
            .optional(
                "timeout_secs",
                FieldKind::Integer,
                "Per request timeout in seconds",
                DEFAULT_TIMEOUT_SECS,
            ))
    }

    fn factory(&self, role: Role) -> Result<Arc<dyn Factory>, Error> {
        if role != Role::Chain {
            return Err(self.unsupported(role));
        }
        Ok(Arc::new(EthereumFactory))
    }

    fn commands(&self) -> Vec<CommandFragment> {
        vec![
            CommandFragment::new([MODULE_ID], "Query Ethereum chains"),
            CommandFragment::new(
                [MODULE_ID, "height"],
                "Print the latest block number of a configured chain",
            )
            .arg(
                Arg::new("chain")
                    .long("chain")
                    .required(true)
                    .action(ArgAction::Set)
                    .help("Name of the chain in the configuration file"),
            )
            .handler(Height),
        ]
    }

    fn description(&self) -> &'static str {
        "Ethereum JSON-RPC chain"
    }
}

struct Height;

#[async_trait::async_trait]
impl CommandHandler for Height {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let name = ctx
            .matches()
            .get_one::<String>("chain")
            .context("missing chain argument")?;

        let height = ctx
            .until_cancelled(async {
                let config = ctx.load_config()?;
                let chain = config
                    .chain(name)
                    .with_context(|| format!("chain `{name}` is not configured"))?;
                if chain.chain.module != MODULE_ID {
                    bail!(
                        "chain `{name}` uses the `{}` chain module, not `{MODULE_ID}`",
                        chain.chain.module
                    );
                }
                let backend = ctx
                    .registry()
                    .build_backend(Role::Chain, &chain.chain)
                    .await?;
                let chain = backend
                    .as_chain()
                    .context("backend does not expose a chain interface")?;
                chain.latest_height().await
            })
            .await??;

        info!(chain = %name, height, "queried latest height");
        println!("{height}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ibc_relayer_core::{BackendConfig, ChainConfig, Framework, Registry, RelayerConfig};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    use super::*;

    const IBC_ADDRESS: &str = "0x3ed6b3c2c8f4a5e1bb7bc6dbc6a0f37ee7fa4b34";

    fn chain_config(rpc_addr: &str) -> serde_json::Value {
        json!({
            "chain_id": "sepolia",
            "eth_chain_id": 11_155_111,
            "rpc_addr": rpc_addr,
            "ibc_address": IBC_ADDRESS,
        })
    }

    fn backend(config: serde_json::Value) -> BackendConfig {
        BackendConfig {
            module: MODULE_ID.to_string(),
            config,
        }
    }

    async fn node(block_number: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "jsonrpc": "2.0", "id": 1, "result": block_number }),
            ))
            .mount(&server)
            .await;
        server
    }

    fn registry() -> Registry {
        Registry::from_modules([Arc::new(EthereumModule) as Arc<dyn Module>]).unwrap()
    }

    #[test]
    fn timeout_defaults_to_ten_seconds() {
        let config: EthereumConfig = parse_config(chain_config("http://127.0.0.1:8545")).unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.ibc_address, IBC_ADDRESS.parse::<Address>().unwrap());
    }

    #[test]
    fn only_the_chain_role_is_supported() {
        assert!(matches!(
            EthereumModule.schema(Role::Signer),
            Err(Error::UnsupportedRole { role: Role::Signer, .. })
        ));
        assert!(EthereumModule.factory(Role::Prover).is_err());
    }

    #[tokio::test]
    async fn factory_rejects_a_malformed_url() {
        let err = registry()
            .build_backend(Role::Chain, &backend(chain_config("not a url")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { role: Role::Chain, .. }));
        assert!(err.to_string().contains("invalid rpc_addr `not a url`"), "{err}");
    }

    #[tokio::test]
    async fn factory_rejects_a_non_http_url() {
        let err = registry()
            .build_backend(Role::Chain, &backend(chain_config("ws://127.0.0.1:8546")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme `ws`"), "{err}");
    }

    #[tokio::test]
    async fn factory_rejects_a_malformed_address() {
        let mut config = chain_config("http://127.0.0.1:8545");
        config["ibc_address"] = json!("0x1234");

        let err = registry()
            .build_backend(Role::Chain, &backend(config))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ibc_address"), "{err}");
    }

    #[tokio::test]
    async fn latest_height_queries_the_node() {
        let server = node("0x10").await;

        let backend = registry()
            .build_backend(Role::Chain, &backend(chain_config(&server.uri())))
            .await
            .unwrap();
        let chain = backend.as_chain().unwrap();

        assert_eq!(chain.chain_id(), "sepolia");
        assert_eq!(chain.latest_height().await.unwrap(), 16);
    }

    fn write_config(home: &std::path::Path, rpc_addr: &str) {
        let mut config = RelayerConfig::default();
        config
            .add_chain(ChainConfig {
                name: "sepolia".to_string(),
                enabled: true,
                chain: backend(chain_config(rpc_addr)),
                signer: None,
                prover: BackendConfig {
                    module: "mock".to_string(),
                    config: serde_json::Value::Null,
                },
            })
            .unwrap();
        config
            .save(ibc_relayer_core::config::config_path(home))
            .unwrap();
    }

    async fn run_height(home: &std::path::Path, token: CancellationToken) -> Result<(), Error> {
        let mut app = Framework::new("relayer")
            .with_module(EthereumModule)
            .build()
            .unwrap();
        app.run(
            [
                "relayer".into(),
                "--home".into(),
                home.as_os_str().to_owned(),
                "ethereum".into(),
                "height".into(),
                "--chain".into(),
                "sepolia".into(),
            ],
            token,
        )
        .await
    }

    #[tokio::test]
    async fn height_command_queries_the_configured_chain() {
        let server = node("0x2a").await;
        let home = tempfile::tempdir().unwrap();
        write_config(home.path(), &server.uri());

        run_height(home.path(), CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn height_command_stops_when_cancelled() {
        let home = tempfile::tempdir().unwrap();
        write_config(home.path(), "http://127.0.0.1:9");

        let token = CancellationToken::new();
        token.cancel();
        let err = run_height(home.path(), token).await.unwrap_err();

        assert_eq!(err.to_string(), "command cancelled");
    }
}
