// src/engine/aggregator.rs
//
// Keeps the pool listing fresh. One refresh cycle:
//   cached snapshot (warm start) -> pool counts -> pool addresses
//   -> pool details -> token metadata -> per-pool reserves -> persist
// Every stage goes through the shared BatchCallClient. Reserve fetches run
// per pool and patch the live view as each one lands. Only a cycle whose
// listing came back complete retires pools or replaces the snapshot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, Bytes, U256};
use futures::{stream, StreamExt};

use crate::chain::batch_client::BatchCallClient;
use crate::chain::contracts::{
    self, decode_address, decode_bool, decode_int24, decode_reserves, decode_slot0, decode_symbol, decode_u8,
    decode_uint, view,
};
use crate::chain::rpc::ReadCall;
use crate::engine::guard::{GuardTicket, OperationGuard};
use crate::engine::repository::{CacheStatus, PoolRepository, TokenRegistry};
use crate::error::{EngineError, EngineResult};
use crate::models::{PoolKind, PoolSnapshot, Token};

pub const REFRESH_KEY: &str = "pool-refresh";

/// Factories to enumerate. Either may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Factories {
    pub basic: Option<Address>,
    pub concentrated: Option<Address>,
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub interval: Duration,
    pub reserve_retry_rounds: u32,
    pub reserve_retry_delay: Duration,
    pub max_concurrent_pools: usize,
    /// Upper bound on `allPoolsLength()` taken from any one factory.
    pub max_pools_per_factory: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            reserve_retry_rounds: 3,
            reserve_retry_delay: Duration::from_millis(2000),
            max_concurrent_pools: 8,
            max_pools_per_factory: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub cache: CacheStatus,
    /// Every requested pool address decoded; otherwise nothing was retired or persisted.
    pub complete: bool,
    pub listed: usize,
    pub stored: usize,
    pub skipped: usize,
    pub missing_reserves: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Basic,
    Concentrated,
}

impl Family {
    fn detail_calls(self, pool: Address) -> Vec<ReadCall> {
        match self {
            Family::Basic => vec![view(pool, contracts::TOKEN0), view(pool, contracts::TOKEN1), view(pool, contracts::STABLE)],
            Family::Concentrated => vec![
                view(pool, contracts::TOKEN0),
                view(pool, contracts::TOKEN1),
                view(pool, contracts::TICK_SPACING),
                view(pool, contracts::SLOT0),
            ],
        }
    }
}

struct PoolListing {
    pools: Vec<(Address, Family)>,
    complete: bool,
}

struct PoolDetails {
    address: Address,
    kind: PoolKind,
    token0: Address,
    token1: Address,
    sqrt_price_x96: Option<U256>,
    tick: Option<i32>,
}

fn decode_details(address: Address, family: Family, slots: &[Option<Bytes>]) -> Option<PoolDetails> {
    let token0 = decode_address(slots.first()?.as_ref())?;
    let token1 = decode_address(slots.get(1)?.as_ref())?;
    match family {
        Family::Basic => {
            let stable = decode_bool(slots.get(2)?.as_ref())?;
            Some(PoolDetails { address, kind: PoolKind::Basic { stable }, token0, token1, sqrt_price_x96: None, tick: None })
        }
        Family::Concentrated => {
            let tick_spacing = decode_int24(slots.get(2)?.as_ref())?;
            let (sqrt_price_x96, tick) = decode_slot0(slots.get(3)?.as_ref())?;
            Some(PoolDetails {
                address,
                kind: PoolKind::Concentrated { tick_spacing },
                token0,
                token1,
                sqrt_price_x96: Some(sqrt_price_x96),
                tick: Some(tick),
            })
        }
    }
}

pub struct StateAggregator {
    client: Arc<BatchCallClient>,
    repo: Arc<PoolRepository>,
    tokens: Arc<TokenRegistry>,
    factories: Factories,
    guard: OperationGuard,
    settings: RefreshSettings,
}

impl StateAggregator {
    pub fn new(
        client: Arc<BatchCallClient>,
        repo: Arc<PoolRepository>,
        tokens: Arc<TokenRegistry>,
        factories: Factories,
        settings: RefreshSettings,
    ) -> Self {
        Self { client, repo, tokens, factories, guard: OperationGuard::new(), settings }
    }

    pub fn repository(&self) -> &Arc<PoolRepository> {
        &self.repo
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Registry lookup, falling back to one on-demand metadata fetch.
    pub async fn resolve_token(&self, address: Address) -> Option<Token> {
        if let Some(token) = self.tokens.get(&address).await {
            return Some(token);
        }
        self.fetch_token_metadata(vec![address]).await;
        self.tokens.get(&address).await
    }

    pub fn is_refreshing(&self) -> bool {
        self.guard.is_held(REFRESH_KEY)
    }

    /// Full cycle at the current wall-clock time.
    pub async fn refresh(&self) -> EngineResult<RefreshReport> {
        let ticket = self.guard.try_acquire(REFRESH_KEY)?;
        self.run_cycle(&ticket, chrono::Utc::now().timestamp_millis()).await
    }

    /// Same as `refresh` with an explicit clock (epoch ms).
    pub async fn refresh_at(&self, now_ms: i64) -> EngineResult<RefreshReport> {
        let ticket = self.guard.try_acquire(REFRESH_KEY)?;
        self.run_cycle(&ticket, now_ms).await
    }

    /// Claim the refresh slot now and run the cycle plus reserve retries in the background.
    /// Rejected with `OperationInProgress` while another cycle holds the slot.
    pub fn spawn_refresh(self: &Arc<Self>) -> EngineResult<()> {
        let ticket = self.guard.try_acquire(REFRESH_KEY)?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.cycle_with_retries(&ticket).await {
                log::error!("triggered pool refresh failed: {}", e);
            }
        });
        Ok(())
    }

    /// One cycle plus bounded reserve retries, all under the same ticket.
    async fn cycle_with_retries(&self, ticket: &GuardTicket) -> EngineResult<RefreshReport> {
        let report = self.run_cycle(ticket, chrono::Utc::now().timestamp_millis()).await?;
        if report.missing_reserves > 0 {
            self.retry_rounds(ticket, self.settings.reserve_retry_rounds, self.settings.reserve_retry_delay).await;
        }
        Ok(report)
    }

    async fn run_cycle(&self, ticket: &GuardTicket, now_ms: i64) -> EngineResult<RefreshReport> {
        log::debug!("{} started", ticket.key());

        let cache = if self.repo.is_empty().await {
            self.repo.load_cached(now_ms).await
        } else {
            CacheStatus::Absent
        };
        if let CacheStatus::Fresh { pools, age_ms } = &cache {
            log::info!("serving {} cached pools ({}s old) while refreshing", pools, age_ms / 1000);
        }

        let PoolListing { pools: listed, complete } = self.list_pools().await?;

        let details = self.fetch_details(&listed).await;
        let mut skipped = listed.len() - details.len();

        let mut token_addrs = Vec::with_capacity(details.len() * 2);
        for d in &details {
            token_addrs.push(d.token0);
            token_addrs.push(d.token1);
        }
        self.fetch_token_metadata(token_addrs).await;

        let mut fresh = Vec::with_capacity(details.len());
        for d in details {
            let (Some(token0), Some(token1)) = (self.tokens.get(&d.token0).await, self.tokens.get(&d.token1).await) else {
                log::debug!("skipping pool {:?}: token metadata unknown", d.address);
                skipped += 1;
                continue;
            };
            fresh.push(PoolSnapshot {
                address: d.address,
                kind: d.kind,
                token0,
                token1,
                reserve0: U256::zero(),
                reserve1: U256::zero(),
                sqrt_price_x96: d.sqrt_price_x96,
                tick: d.tick,
            });
        }
        let stored = fresh.len();
        for pool in &fresh {
            self.repo.merge(pool.clone()).await;
        }
        // unknown addresses are not absent ones: only a complete listing retires pools
        if complete {
            let listed_set: HashSet<Address> = listed.iter().map(|(addr, _)| *addr).collect();
            self.repo.retain(&listed_set).await;
        }

        self.fetch_reserves_progressively(fresh).await;
        let missing_reserves = self.repo.pools_missing_reserves().await.len();

        if complete {
            self.repo.persist(now_ms).await?;
        } else {
            log::warn!("pool listing incomplete; keeping existing entries and the previous snapshot");
        }
        let report = RefreshReport { cache, complete, listed: listed.len(), stored, skipped, missing_reserves };
        log::info!(
            "pool refresh done: {} listed, {} stored, {} skipped, {} without reserves",
            report.listed, report.stored, report.skipped, report.missing_reserves
        );
        Ok(report)
    }

    /// Counts then addresses. A missing count aborts the cycle; missing addresses
    /// mark the listing incomplete.
    async fn list_pools(&self) -> EngineResult<PoolListing> {
        let factories: Vec<(Address, Family)> = [
            self.factories.basic.map(|f| (f, Family::Basic)),
            self.factories.concentrated.map(|f| (f, Family::Concentrated)),
        ]
        .into_iter()
        .flatten()
        .collect();
        if factories.is_empty() {
            return Ok(PoolListing { pools: Vec::new(), complete: true });
        }

        let count_calls: Vec<ReadCall> = factories.iter().map(|(f, _)| view(*f, contracts::ALL_POOLS_LENGTH)).collect();
        let counts = self.client.batch_call(&count_calls).await;

        let mut index_calls = Vec::new();
        let mut families = Vec::new();
        for ((factory, family), slot) in factories.iter().zip(&counts) {
            let count = decode_uint(slot.as_ref()).ok_or_else(|| {
                EngineError::TransientTransport(format!("pool count unavailable for factory {:?}", factory))
            })?;
            let limit = self.settings.max_pools_per_factory;
            let count = if count > U256::from(limit) {
                log::warn!("factory {:?} reports {} pools; listing only the first {}", factory, count, limit);
                limit
            } else {
                count.as_u64()
            };
            log::debug!("factory {:?} lists {} pools", factory, count);
            for i in 0..count {
                index_calls.push(contracts::all_pools(*factory, i));
                families.push(*family);
            }
        }

        let addresses = self.client.batch_call(&index_calls).await;
        let decoded: Vec<(Address, Family)> = addresses
            .iter()
            .zip(families)
            .filter_map(|(slot, family)| decode_address(slot.as_ref()).map(|a| (a, family)))
            .collect();
        let complete = decoded.len() == index_calls.len();
        if !complete {
            log::warn!("{} of {} pool addresses unavailable this cycle", index_calls.len() - decoded.len(), index_calls.len());
        }

        let mut seen = HashSet::new();
        let pools = decoded.into_iter().filter(|(a, _)| seen.insert(*a)).collect();
        Ok(PoolListing { pools, complete })
    }

    async fn fetch_details(&self, listed: &[(Address, Family)]) -> Vec<PoolDetails> {
        let mut calls = Vec::new();
        let mut spans = Vec::with_capacity(listed.len());
        for (addr, family) in listed {
            let per_pool = family.detail_calls(*addr);
            spans.push((calls.len(), per_pool.len()));
            calls.extend(per_pool);
        }
        let replies = self.client.batch_call(&calls).await;

        listed
            .iter()
            .zip(spans)
            .filter_map(|((addr, family), (start, width))| {
                let slots = replies.get(start..start + width)?;
                let details = decode_details(*addr, *family, slots);
                if details.is_none() {
                    log::debug!("skipping pool {:?}: details incomplete", addr);
                }
                details
            })
            .collect()
    }

    /// symbol()+decimals() for tokens the registry has not seen.
    async fn fetch_token_metadata(&self, candidates: Vec<Address>) {
        let unknown = self.tokens.unknown(candidates).await;
        if unknown.is_empty() {
            return;
        }
        let calls: Vec<ReadCall> = unknown
            .iter()
            .flat_map(|t| [view(*t, contracts::SYMBOL), view(*t, contracts::DECIMALS)])
            .collect();
        let replies = self.client.batch_call(&calls).await;

        for (i, address) in unknown.iter().enumerate() {
            let Some(decimals) = replies.get(2 * i + 1).and_then(|s| decode_u8(s.as_ref())) else {
                log::debug!("decimals unavailable for token {:?}", address);
                continue;
            };
            let symbol = replies
                .get(2 * i)
                .and_then(|s| decode_symbol(s.as_ref()))
                .unwrap_or_else(|| format!("{:#x}", address));
            self.tokens.insert(Token::new(*address, symbol, decimals)).await;
        }
    }

    /// One independent fetch per pool, each patching its own entry on arrival.
    /// Returns how many pools ended up with non-zero reserves.
    async fn fetch_reserves_progressively(&self, pools: Vec<PoolSnapshot>) -> usize {
        let concurrency = self.settings.max_concurrent_pools.max(1);
        stream::iter(pools)
            .map(|pool| async move { self.fetch_reserves(&pool).await })
            .buffer_unordered(concurrency)
            .collect::<Vec<bool>>()
            .await
            .into_iter()
            .filter(|landed| *landed)
            .count()
    }

    async fn fetch_reserves(&self, pool: &PoolSnapshot) -> bool {
        let calls = match pool.kind {
            PoolKind::Basic { .. } => vec![view(pool.address, contracts::GET_RESERVES)],
            PoolKind::Concentrated { .. } => vec![
                contracts::balance_of(pool.token0.address, pool.address),
                contracts::balance_of(pool.token1.address, pool.address),
            ],
        };
        let replies = self.client.batch_call(&calls).await;
        let first = replies.first().and_then(Option::as_ref);
        let reserves = match pool.kind {
            PoolKind::Basic { .. } => decode_reserves(first),
            PoolKind::Concentrated { .. } => {
                decode_uint(first).zip(decode_uint(replies.get(1).and_then(Option::as_ref)))
            }
        };

        match reserves {
            Some((r0, r1)) if !(r0.is_zero() && r1.is_zero()) => {
                self.repo.patch_reserves(pool.address, r0, r1).await
            }
            _ => {
                log::debug!("reserves for pool {:?} not available yet", pool.address);
                false
            }
        }
    }

    /// Bounded rounds over pools still showing zero reserves, holding the refresh slot.
    /// Recoveries reach the live view only; the next full cycle persists them.
    pub async fn retry_missing_reserves(&self, rounds: u32, delay: Duration) -> EngineResult<usize> {
        let ticket = self.guard.try_acquire(REFRESH_KEY)?;
        Ok(self.retry_rounds(&ticket, rounds, delay).await)
    }

    async fn retry_rounds(&self, ticket: &GuardTicket, rounds: u32, delay: Duration) -> usize {
        log::debug!("{}: retrying missing reserves", ticket.key());
        let mut recovered = 0;
        for round in 1..=rounds {
            let missing = self.repo.pools_missing_reserves().await;
            if missing.is_empty() {
                break;
            }
            tokio::time::sleep(delay).await;
            let landed = self.fetch_reserves_progressively(missing.clone()).await;
            log::info!("reserve retry round {}/{}: {} of {} pools recovered", round, rounds, landed, missing.len());
            recovered += landed;
        }
        recovered
    }

    /// Refresh, then retry missing reserves, every `settings.interval`. Never returns.
    pub async fn run_periodic(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        loop {
            ticker.tick().await;
            let ticket = match self.guard.try_acquire(REFRESH_KEY) {
                Ok(ticket) => ticket,
                Err(_) => {
                    log::debug!("periodic refresh skipped, one is running");
                    continue;
                }
            };
            if let Err(e) = self.cycle_with_retries(&ticket).await {
                log::error!("periodic pool refresh failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{self, Token as AbiToken};

    fn word(v: u64) -> Vec<u8> {
        abi::encode(&[AbiToken::Uint(U256::from(v))])
    }

    #[test]
    fn test_decode_basic_details() {
        let t0 = Address::from([1; 20]);
        let t1 = Address::from([2; 20]);
        let slots = vec![
            Some(Bytes::from(abi::encode(&[AbiToken::Address(t0)]))),
            Some(Bytes::from(abi::encode(&[AbiToken::Address(t1)]))),
            Some(Bytes::from(word(1))),
        ];
        let d = decode_details(Address::from([9; 20]), Family::Basic, &slots).unwrap();
        assert_eq!(d.kind, PoolKind::Basic { stable: true });
        assert_eq!((d.token0, d.token1), (t0, t1));
    }

    #[test]
    fn test_incomplete_details_skip_pool() {
        let t0 = Address::from([1; 20]);
        let slots = vec![Some(Bytes::from(abi::encode(&[AbiToken::Address(t0)]))), None, Some(Bytes::from(word(200)))];
        assert!(decode_details(Address::from([9; 20]), Family::Concentrated, &slots).is_none());
        assert!(decode_details(Address::from([9; 20]), Family::Basic, &[]).is_none());
    }
}
