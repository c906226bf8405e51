//! A minimal Ethereum JSON-RPC client.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

/// The error type for the JSON-RPC client.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum RpcClientError {
    /// HTTP request error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// The response could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// Speaks JSON-RPC 2.0 over HTTP to an Ethereum execution node.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct RpcClient {
    client: Client,
    url: Url,
}

impl RpcClient {
    /// Create a client for `url`. Every request is bounded by `timeout`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, RpcClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// The endpoint this client talks to.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Fetches the number of the most recent block.
    ///
    /// # Errors
    /// Returns an error if the request fails or the result is not a quantity.
    pub async fn block_number(&self) -> Result<u64, RpcClientError> {
        let quantity: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
    }

    #[tracing::instrument(skip(self, params), fields(url = %self.url))]
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcClientError> {
        debug!("json-rpc request");

        let response: Response<T> = self
            .client
            .post(self.url.clone())
            .json(&Request {
                jsonrpc: "2.0",
                id: 1,
                method,
                params,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (response.result, response.error) {
            (_, Some(error)) => Err(RpcClientError::Rpc {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcClientError::Malformed(format!(
                "`{method}` returned neither a result nor an error"
            ))),
        }
    }
}

/// Decodes a hex encoded JSON-RPC quantity such as `0x1b4`.
fn parse_quantity(quantity: &str) -> Result<u64, RpcClientError> {
    let digits = quantity.strip_prefix("0x").ok_or_else(|| {
        RpcClientError::Malformed(format!("quantity `{quantity}` is not 0x prefixed"))
    })?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| RpcClientError::Malformed(format!("quantity `{quantity}`: {e}")))
}
