// tests/batch_client_integration.rs
// =================================
// Batching behaviour against scripted transports: ordering, chunking,
// transient-failure retries and placeholder degradation.

use std::sync::Arc;
use std::time::Duration;

use dex_route_engine::chain::batch_client::{BatchCallClient, BatchSettings};
use dex_route_engine::chain::mock::ScriptedTransport;
use dex_route_engine::chain::rpc::ReadCall;
use ethers::types::Address;

// ====== Test Helpers ======

fn calls(n: usize) -> Vec<ReadCall> {
    (0..n)
        .map(|i| ReadCall::new(Address::from_low_u64_be(i as u64 + 1), (i as u32).to_be_bytes().to_vec()))
        .collect()
}

fn fast_settings(chunk_size: usize) -> BatchSettings {
    BatchSettings { chunk_size, base_delay: Duration::from_millis(1), ..BatchSettings::default() }
}

// ====== Tests ======

#[tokio::test]
async fn test_order_preserved_across_chunks_and_reordered_replies() {
    let transport = Arc::new(ScriptedTransport::echo().reversed());
    let client = BatchCallClient::new(transport.clone(), fast_settings(7));

    let input = calls(30);
    let out = client.batch_call(&input).await;

    assert_eq!(out.len(), input.len());
    for (call, slot) in input.iter().zip(&out) {
        assert_eq!(slot.as_ref().map(|b| b.to_vec()), Some(call.data.to_vec()));
    }
    assert_eq!(transport.batch_sizes().iter().sum::<usize>(), 30);
    assert_eq!(transport.batch_sizes().len(), 5);
}

#[tokio::test]
async fn test_chunk_size_does_not_change_results() {
    let input = calls(23);
    let mut outputs = Vec::new();
    for chunk_size in [1, 4, 10, 100] {
        let client = BatchCallClient::new(Arc::new(ScriptedTransport::echo()), fast_settings(chunk_size));
        outputs.push(client.batch_call(&input).await);
    }
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_transient_failures_recovered_within_retry_budget() {
    // one chunk, two transport failures, two retries allowed
    let transport = Arc::new(ScriptedTransport::echo().failing_first(2));
    let client = BatchCallClient::new(transport.clone(), fast_settings(10));

    let out = client.batch_call_with_retries(&calls(5), 2).await;

    assert!(out.iter().all(|slot| slot.is_some()));
    assert_eq!(transport.attempts(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_degrade_to_placeholders() {
    let transport = Arc::new(ScriptedTransport::echo().always_failing());
    let client = BatchCallClient::new(transport.clone(), fast_settings(4));

    let out = client.batch_call_with_retries(&calls(9), 1).await;

    assert_eq!(out.len(), 9);
    assert!(out.iter().all(|slot| slot.is_none()));
    // 3 chunks x (1 + 1 retry)
    assert_eq!(transport.attempts(), 6);
}

#[tokio::test]
async fn test_failing_entry_does_not_poison_siblings() {
    let target_to_fail = Address::from_low_u64_be(3);
    let transport = Arc::new(ScriptedTransport::new(move |to, data| {
        if to == target_to_fail { None } else { Some(data.to_vec()) }
    }));
    let client = BatchCallClient::new(transport, fast_settings(10));

    let out = client.batch_call(&calls(5)).await;

    assert!(out[2].is_none());
    assert_eq!(out.iter().filter(|s| s.is_some()).count(), 4);
}
