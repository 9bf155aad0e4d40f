use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ethers::types::Address;

use crate::chain::batch_client::{BatchCallClient, BatchSettings};
use crate::chain::providers;
use crate::chain::rpc::RpcTransport;
use crate::config::Config;
use crate::engine::aggregator::{Factories, RefreshSettings, StateAggregator};
use crate::engine::repository::{FileStore, KeyValueStore, PoolRepository, TokenRegistry};
use crate::engine::router::RouteSelector;
use crate::models::Token;

pub struct AppState {
    pub client: Arc<BatchCallClient>,
    pub router: RouteSelector,
    pub tokens: Arc<TokenRegistry>,
    pub pools: Arc<PoolRepository>,
    pub aggregator: Arc<StateAggregator>,

    // Routing candidates
    pub tick_spacings: Vec<i32>,
    pub intermediates: Vec<Address>,
}

fn parse_address(raw: &str, what: &str) -> Result<Address> {
    Address::from_str(raw.trim()).with_context(|| format!("{} is not an address: {:?}", what, raw))
}

/// `address:SYMBOL:decimals`
pub fn parse_known_token(entry: &str) -> Result<Token> {
    let mut parts = entry.split(':');
    let (Some(address), Some(symbol), Some(decimals), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(anyhow!("KNOWN_TOKENS entry {:?} must look like address:SYMBOL:decimals", entry));
    };
    let decimals: u8 = decimals.trim().parse().with_context(|| format!("bad decimals in {:?}", entry))?;
    Ok(Token::new(parse_address(address, "KNOWN_TOKENS")?, symbol.trim(), decimals))
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let transport = providers::create_transport(&config.rpc_url, Duration::from_secs(config.rpc_timeout_secs))?;
        let store = FileStore::new(&config.cache_dir)
            .with_context(|| format!("cannot open cache dir {}", config.cache_dir))?;
        Self::with_transport(config, transport, Box::new(store))
    }

    /// Wire everything around an existing transport and store.
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn RpcTransport>,
        store: Box<dyn KeyValueStore>,
    ) -> Result<Self> {
        let client = Arc::new(BatchCallClient::new(
            transport,
            BatchSettings {
                chunk_size: config.batch_chunk_size,
                retries: config.rpc_retries,
                base_delay: Duration::from_millis(config.rpc_retry_base_delay_ms),
                block_tag: config.block_tag.clone(),
                ..BatchSettings::default()
            },
        ));

        let quoter = parse_address(&config.quoter_address, "QUOTER_ADDRESS")?;
        let factories = Factories {
            basic: config.pool_factory_address.as_deref().map(|a| parse_address(a, "POOL_FACTORY_ADDRESS")).transpose()?,
            concentrated: config.cl_factory_address.as_deref().map(|a| parse_address(a, "CL_FACTORY_ADDRESS")).transpose()?,
        };
        let intermediates = config
            .intermediate_tokens
            .iter()
            .map(|a| parse_address(a, "INTERMEDIATE_TOKENS"))
            .collect::<Result<Vec<_>>>()?;
        let seed = config.known_tokens.iter().map(|e| parse_known_token(e)).collect::<Result<Vec<_>>>()?;

        let tokens = Arc::new(TokenRegistry::new(seed));
        let pools = Arc::new(PoolRepository::new(store, Duration::from_secs(config.cache_ttl_secs)));
        let aggregator = Arc::new(StateAggregator::new(
            client.clone(),
            pools.clone(),
            tokens.clone(),
            factories,
            RefreshSettings {
                interval: Duration::from_secs(config.refresh_interval_secs.max(1)),
                reserve_retry_rounds: config.reserve_retry_rounds,
                reserve_retry_delay: Duration::from_millis(config.reserve_retry_delay_ms),
                max_pools_per_factory: config.max_pools_per_factory,
                ..RefreshSettings::default()
            },
        ));

        log::info!(
            "engine ready: {} spacings, {} intermediates, factories {:?}",
            config.tick_spacings.len(),
            intermediates.len(),
            factories
        );

        Ok(AppState {
            router: RouteSelector::new(client.clone(), quoter),
            client,
            tokens,
            pools,
            aggregator,
            tick_spacings: config.tick_spacings.clone(),
            intermediates,
        })
    }
}
