//! JSON-RPC transport seam
//!
//! The core never opens sockets itself: everything that talks to a node goes
//! through `RpcTransport`, which the caller injects. `HttpTransport` is the
//! production implementation over reqwest.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Malformed(String),
}

impl RpcError {
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Request/response channel to a node
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, RpcError>;
}

#[async_trait]
impl<T: RpcTransport + ?Sized> RpcTransport for Arc<T> {
    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, RpcError> {
        (**self).call(method, params).await
    }
}

/// JSON-RPC 2.0 over HTTP POST
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, RpcError> {
        let id = Uuid::new_v4().to_string();
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!("rpc -> {} {}", method, id);
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(format!("HTTP {}: {}", status, e)))?;

        parse_envelope(body)
    }
}

/// Split a JSON-RPC response envelope into its result or error
pub fn parse_envelope(mut body: JsonValue) -> Result<JsonValue, RpcError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(JsonValue::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(RpcError::Rpc { code, message });
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(RpcError::Malformed(
            "response has neither result nor error".into(),
        )),
    }
}
