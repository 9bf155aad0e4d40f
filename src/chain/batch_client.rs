// src/chain/batch_client.rs
//
// Packs independent read calls into chunked JSON-RPC batches.
// - chunk size bounded (upstream batch limits), bounded chunks in flight
// - replies matched back by request id, never by arrival order
// - transport failures retried per chunk with linear backoff
// - exhausted chunks degrade to `None` placeholders ("unknown", not zero)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::Bytes;
use futures::{stream, StreamExt};

use crate::chain::retry::{retry_with, RetryPolicy};
use crate::chain::rpc::{ReadCall, RpcRequest, RpcResponse, RpcTransport};
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub chunk_size: usize,
    pub retries: u32,
    pub base_delay: Duration,
    pub max_inflight_chunks: usize,
    pub block_tag: String,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            retries: 2,
            base_delay: Duration::from_millis(500),
            max_inflight_chunks: 4,
            block_tag: "latest".to_string(),
        }
    }
}

pub struct BatchCallClient {
    transport: Arc<dyn RpcTransport>,
    settings: BatchSettings,
    next_id: AtomicU64,
}

impl BatchCallClient {
    pub fn new(transport: Arc<dyn RpcTransport>, settings: BatchSettings) -> Self {
        Self { transport, settings, next_id: AtomicU64::new(1) }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// `batch_call_with_retries` using the configured retry count.
    pub async fn batch_call(&self, calls: &[ReadCall]) -> Vec<Option<Bytes>> {
        self.batch_call_with_retries(calls, self.settings.retries).await
    }

    /// One output slot per input call, same order. `None` = unknown.
    pub async fn batch_call_with_retries(&self, calls: &[ReadCall], retries: u32) -> Vec<Option<Bytes>> {
        if calls.is_empty() {
            return Vec::new();
        }
        let chunk_size = self.settings.chunk_size.max(1);
        let inflight = self.settings.max_inflight_chunks.max(1);

        // Owned chunks keep the stream's futures free of borrowed slice lifetimes,
        // which `tokio::spawn` and rocket handlers need to prove `Send`.
        let owned: Vec<Vec<ReadCall>> = calls.chunks(chunk_size).map(<[ReadCall]>::to_vec).collect();

        // `buffered` yields in submission order, so flattening keeps input order.
        let chunks: Vec<Vec<Option<Bytes>>> = stream::iter(owned)
            .map(|chunk| async move { self.call_chunk(&chunk, retries).await })
            .buffered(inflight)
            .collect()
            .await;

        chunks.into_iter().flatten().collect()
    }

    async fn call_chunk(&self, chunk: &[ReadCall], retries: u32) -> Vec<Option<Bytes>> {
        let first_id = self.next_id.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        let requests: Vec<RpcRequest> = chunk
            .iter()
            .enumerate()
            .map(|(i, call)| RpcRequest::read_call(first_id + i as u64, call, &self.settings.block_tag))
            .collect();

        let policy = RetryPolicy::linear(retries, self.settings.base_delay);
        let transport = &self.transport;
        let requests_ref = &requests;
        let outcome = retry_with(policy, |e: &EngineError| e.is_transient(), |attempt| async move {
            log::debug!(
                "sending batch ids {}..{} (attempt {})",
                first_id, first_id + requests_ref.len() as u64 - 1, attempt
            );
            transport.send_batch(requests_ref).await
        })
        .await;

        match outcome {
            Ok(responses) => {
                // entries without an id (or with an id we never sent) cannot be matched
                let mut keyed: Vec<(u64, RpcResponse)> =
                    responses.into_iter().filter_map(|r| r.id.map(|id| (id, r))).collect();
                keyed.sort_by_key(|(id, _)| *id);
                requests
                    .iter()
                    .map(|req| {
                        keyed
                            .binary_search_by_key(&req.id, |(id, _)| *id)
                            .ok()
                            .and_then(|idx| keyed[idx].1.payload())
                    })
                    .collect()
            }
            Err(e) => {
                log::warn!(
                    "batch of {} calls failed after {} attempts: {}; returning placeholders",
                    chunk.len(), policy.max_attempts, e
                );
                vec![None; chunk.len()]
            }
        }
    }
}
