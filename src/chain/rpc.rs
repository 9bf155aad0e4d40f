// src/chain/rpc.rs
//
// JSON-RPC batch wire types and the transport seam.
// A batch is a JSON array of eth_call requests; the reply array may arrive in any
// order and may omit or fail individual entries.

use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const READ_CALL_METHOD: &str = "eth_call";

/// One independent read: a target contract and its calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCall {
    pub target: Address,
    pub data: Bytes,
}

impl ReadCall {
    pub fn new(target: Address, data: impl Into<Bytes>) -> Self {
        Self { target, data: data.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallObject {
    pub to: Address,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: (CallObject, String),
}

impl RpcRequest {
    pub fn read_call(id: u64, call: &ReadCall, block_tag: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: READ_CALL_METHOD.to_string(),
            params: (
                CallObject { to: call.target, data: format!("0x{}", hex::encode(&call.data)) },
                block_tag.to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// `null` for entries the server could not tie to a request.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Decoded payload, or `None` for an error entry or undecodable hex.
    pub fn payload(&self) -> Option<Bytes> {
        if let Some(err) = &self.error {
            log::debug!("call {:?} failed: {} ({})", self.id, err.message, err.code);
            return None;
        }
        let result = self.result.as_deref()?;
        match hex::decode(result.trim_start_matches("0x")) {
            Ok(raw) => Some(Bytes::from(raw)),
            Err(e) => {
                log::debug!("call {:?} returned undecodable hex: {}", self.id, e);
                None
            }
        }
    }
}

/// Network seam. One invocation = one round trip carrying the whole slice.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send_batch(&self, requests: &[RpcRequest]) -> EngineResult<Vec<RpcResponse>>;
}

/// Parse a batch reply body. Anything other than a JSON array is a transport failure.
pub fn parse_batch_body(body: &str) -> EngineResult<Vec<RpcResponse>> {
    serde_json::from_str::<Vec<RpcResponse>>(body)
        .map_err(|e| EngineError::TransientTransport(format!("batch reply is not a response array: {}", e)))
}
