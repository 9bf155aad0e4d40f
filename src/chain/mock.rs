// src/chain/mock.rs
//
// Scripted in-process transport for unit and integration tests.
// Compiled for unit tests and behind the `test-utils` feature.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::types::Address;

use crate::chain::rpc::{RpcErrorObject, RpcRequest, RpcResponse, RpcTransport};
use crate::error::{EngineError, EngineResult};

type Handler = Box<dyn Fn(Address, &[u8]) -> Option<Vec<u8>> + Send + Sync>;

pub struct ScriptedTransport {
    handler: Handler,
    failures_left: AtomicU32,
    always_fail: bool,
    reverse_replies: bool,
    attempts: AtomicU32,
    batch_sizes: Mutex<Vec<usize>>,
}

impl ScriptedTransport {
    /// `handler(target, calldata)` returns the reply bytes, or `None` for an error entry.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Address, &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            failures_left: AtomicU32::new(0),
            always_fail: false,
            reverse_replies: false,
            attempts: AtomicU32::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the calldata it was sent.
    pub fn echo() -> Self {
        Self::new(|_, data| Some(data.to_vec()))
    }

    /// Whole-batch transport failure for the first `n` round trips.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Return reply entries in reverse request order.
    pub fn reversed(mut self) -> Self {
        self.reverse_replies = true;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn send_batch(&self, requests: &[RpcRequest]) -> EngineResult<Vec<RpcResponse>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(EngineError::TransientTransport("scripted outage".into()));
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::TransientTransport("scripted transient failure".into()));
        }
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(requests.len());
        }

        let mut replies: Vec<RpcResponse> = requests
            .iter()
            .map(|req| {
                let (call, _tag) = &req.params;
                let data = hex::decode(call.data.trim_start_matches("0x")).unwrap_or_default();
                match (self.handler)(call.to, &data) {
                    Some(out) => RpcResponse { id: Some(req.id), result: Some(format!("0x{}", hex::encode(out))), error: None },
                    None => RpcResponse {
                        id: Some(req.id),
                        result: None,
                        error: Some(RpcErrorObject { code: 3, message: "execution reverted".into() }),
                    },
                }
            })
            .collect();
        if self.reverse_replies {
            replies.reverse();
        }
        Ok(replies)
    }
}
