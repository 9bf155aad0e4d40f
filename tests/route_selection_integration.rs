// tests/route_selection_integration.rs
// ====================================
// RouteSelector against a scripted quoter: candidate fan-out, single-batch
// quoting, best-route choice and the no-route / zero-output distinction.

use std::sync::Arc;
use std::time::Duration;

use dex_route_engine::chain::batch_client::{BatchCallClient, BatchSettings};
use dex_route_engine::chain::mock::ScriptedTransport;
use dex_route_engine::chain::path_codec::{decode_path, selector, QUOTE_EXACT_INPUT_SIG};
use dex_route_engine::engine::router::{RouteOutcome, RouteSelector};
use dex_route_engine::models::{RouteKind, RouteRequest};
use ethers::abi::{self, ParamType, Token as AbiToken};
use ethers::types::{Address, U256};

// ====== Test Helpers ======

const QUOTER: u64 = 0xC0;
const TOKEN_IN: u64 = 0x01;
const TOKEN_OUT: u64 = 0x02;
const HUB: u64 = 0x03;

fn addr(x: u64) -> Address {
    Address::from_low_u64_be(x)
}

/// Pull (tokens, spacings, amount_in) back out of quoteExactInput calldata.
fn decode_quote_call(data: &[u8]) -> Option<(Vec<Address>, Vec<i32>, U256)> {
    if data.len() < 4 || data[..4] != selector(QUOTE_EXACT_INPUT_SIG) {
        return None;
    }
    let mut tokens = abi::decode(&[ParamType::Bytes, ParamType::Uint(256)], &data[4..]).ok()?.into_iter();
    let path = tokens.next()?.into_bytes()?;
    let amount_in = tokens.next()?.into_uint()?;
    let (hops, spacings) = decode_path(&path).ok()?;
    Some((hops, spacings, amount_in))
}

/// Full quoter reply: (amountOut, sqrtPriceX96After[], ticksCrossed[], gasEstimate).
fn quoter_reply(amount_out: u64, gas: u64) -> Vec<u8> {
    abi::encode(&[
        AbiToken::Uint(U256::from(amount_out)),
        AbiToken::Array(vec![]),
        AbiToken::Array(vec![]),
        AbiToken::Uint(U256::from(gas)),
    ])
}

fn selector_for<F>(quote: F, chunk_size: usize) -> (RouteSelector, Arc<ScriptedTransport>)
where
    F: Fn(&[Address], &[i32]) -> Option<Vec<u8>> + Send + Sync + 'static,
{
    let transport = Arc::new(ScriptedTransport::new(move |to, data| {
        if to != addr(QUOTER) {
            return None;
        }
        let (tokens, spacings, _) = decode_quote_call(data)?;
        quote(&tokens, &spacings)
    }));
    let client = Arc::new(BatchCallClient::new(
        transport.clone(),
        BatchSettings { chunk_size, base_delay: Duration::from_millis(1), ..BatchSettings::default() },
    ));
    (RouteSelector::new(client, addr(QUOTER)), transport)
}

fn request(spacings: Vec<i32>, intermediates: Vec<Address>) -> RouteRequest {
    RouteRequest {
        token_in: addr(TOKEN_IN),
        token_out: addr(TOKEN_OUT),
        amount_in: U256::from(1_000_000u64),
        tick_spacings: spacings,
        intermediates,
    }
}

// ====== Tests ======

#[tokio::test]
async fn test_multi_hop_wins_when_it_pays_more() {
    let (router, transport) = selector_for(
        |tokens, spacings| match (tokens.len(), spacings) {
            (2, [100]) => Some(quoter_reply(100, 90_000)),
            (3, [100, 200]) => Some(quoter_reply(150, 180_000)),
            _ => None,
        },
        100,
    );

    let outcome = router.best_route(&request(vec![100, 200], vec![addr(HUB)])).await.unwrap();

    match outcome {
        RouteOutcome::Found(q) => {
            assert_eq!(q.amount_out, U256::from(150));
            assert_eq!(q.kind, RouteKind::MultiHop);
            assert_eq!(q.path, vec![addr(TOKEN_IN), addr(HUB), addr(TOKEN_OUT)]);
            assert_eq!(q.tick_spacings, vec![100, 200]);
            assert_eq!(q.gas_estimate, Some(U256::from(180_000)));
        }
        other => panic!("expected a route, got {:?}", other),
    }
    // 2 direct + 1 intermediate x 2 x 2 multi-hop, all in one round trip
    assert_eq!(transport.batch_sizes(), vec![6]);
}

#[tokio::test]
async fn test_equal_output_prefers_direct() {
    let (router, _) = selector_for(|_, _| Some(quoter_reply(500, 100_000)), 100);

    let outcome = router.best_route(&request(vec![1, 50], vec![addr(HUB)])).await.unwrap();

    match outcome {
        RouteOutcome::Found(q) => {
            assert_eq!(q.kind, RouteKind::Direct);
            assert_eq!(q.tick_spacings, vec![1]);
        }
        other => panic!("expected a route, got {:?}", other),
    }
}

#[tokio::test]
async fn test_equal_output_and_hops_prefers_lower_gas() {
    let (router, _) = selector_for(
        |_, spacings| match spacings {
            [2000] => Some(quoter_reply(500, 80_000)),
            _ => Some(quoter_reply(500, 120_000)),
        },
        100,
    );

    let outcome = router.best_route(&request(vec![1, 2000], vec![])).await.unwrap();
    match outcome {
        RouteOutcome::Found(q) => assert_eq!(q.tick_spacings, vec![2000]),
        other => panic!("expected a route, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_route_when_every_pool_reverts() {
    let (router, _) = selector_for(|_, _| None, 100);
    let outcome = router.best_route(&request(vec![1, 50, 100], vec![addr(HUB)])).await.unwrap();
    assert_eq!(outcome, RouteOutcome::NoRoute);
}

#[tokio::test]
async fn test_zero_output_is_reported_separately() {
    let (router, _) = selector_for(
        |tokens, _| if tokens.len() == 2 { Some(quoter_reply(0, 50_000)) } else { None },
        100,
    );
    let outcome = router.best_route(&request(vec![1, 50], vec![addr(HUB)])).await.unwrap();
    assert_eq!(outcome, RouteOutcome::ZeroOutput);
}

#[tokio::test]
async fn test_chunked_quoting_finds_same_best() {
    let quote = |tokens: &[Address], spacings: &[i32]| {
        let score = tokens.len() as u64 * 10 + spacings.iter().map(|s| *s as u64).sum::<u64>() % 97;
        Some(quoter_reply(score, 1))
    };
    let (wide, _) = selector_for(quote, 100);
    let (narrow, transport) = selector_for(quote, 3);
    let req = request(vec![1, 50, 100, 200, 2000], vec![addr(HUB), addr(0x04)]);

    let a = wide.best_route(&req).await.unwrap();
    let b = narrow.best_route(&req).await.unwrap();
    assert_eq!(a, b);
    assert!(transport.batch_sizes().len() > 1);
}

#[tokio::test]
async fn test_same_token_rejected_before_network() {
    let (router, transport) = selector_for(|_, _| Some(quoter_reply(1, 1)), 100);
    let mut req = request(vec![1], vec![]);
    req.token_out = req.token_in;
    assert!(router.best_route(&req).await.is_err());
    assert_eq!(transport.attempts(), 0);
}
