//! JSON-RPC plumbing for talking to a ledger node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rocket::serde::json::{json, Value};
use serde::Deserialize;

use crate::model::signature::decode_hex;

use super::LedgerError;

/// Something that can carry a JSON-RPC call to a node and bring back its
/// result.
#[rocket::async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, LedgerError>;
}

/// JSON-RPC over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Every request made through this transport is bounded by `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[rocket::async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        trace!("rpc{id} -> {method}");
        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (response.error, response.result) {
            (Some(error), _) => {
                debug!("rpc{id} <- error {}: {}", error.code, error.message);
                Err(LedgerError::Rpc {
                    code: error.code,
                    message: error.message,
                })
            }
            (None, Some(result)) => Ok(result),
            // A null result is legitimate, e.g. a receipt that does not exist yet.
            (None, None) => Ok(Value::Null),
        }
    }
}

/// The string held by a JSON value, or a `Malformed` error.
pub fn as_str(value: &Value) -> Result<&str, LedgerError> {
    value
        .as_str()
        .ok_or_else(|| LedgerError::Malformed(format!("expected a string, got {value}")))
}

/// Parse a hex quantity such as `"0x1a"`.
pub fn parse_quantity(value: &Value) -> Result<u64, LedgerError> {
    let text = as_str(value)?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Malformed(format!("quantity without 0x prefix: {text}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| LedgerError::Malformed(format!("invalid quantity: {text}")))
}

/// Encode a quantity in the compact hex form nodes return.
#[cfg(test)]
pub fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

/// Parse hex-encoded bytes such as a call result.
pub fn parse_data(value: &Value) -> Result<Vec<u8>, LedgerError> {
    let text = as_str(value)?;
    decode_hex(text).ok_or_else(|| LedgerError::Malformed(format!("invalid hex data: {text}")))
}
