use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub quoter_address: String,
    pub pool_factory_address: Option<String>,
    pub cl_factory_address: Option<String>,
    pub port: u16,

    // Batching / transport
    pub batch_chunk_size: usize,
    pub rpc_retries: u32,
    pub rpc_retry_base_delay_ms: u64,
    pub rpc_timeout_secs: u64,
    pub block_tag: String,

    // Routing
    pub tick_spacings: Vec<i32>,
    pub intermediate_tokens: Vec<String>,
    /// `address:SYMBOL:decimals`
    pub known_tokens: Vec<String>,

    // Pool cache
    pub cache_dir: String,
    pub cache_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub reserve_retry_rounds: u32,
    pub reserve_retry_delay_ms: u64,
    pub max_pools_per_factory: u64,
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

pub fn parse_spacings(raw: &[String]) -> Result<Vec<i32>, Box<dyn std::error::Error>> {
    let mut spacings = Vec::with_capacity(raw.len());
    for s in raw {
        let spacing: i32 = s.parse().map_err(|_| format!("invalid tick spacing {:?}", s))?;
        if spacing <= 0 {
            return Err(format!("tick spacing {} must be positive", spacing).into());
        }
        spacings.push(spacing);
    }
    Ok(spacings)
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Secrets first, then public config
        dotenv::from_filename("secrets.env").ok();
        dotenv::from_filename("config/engine.env").ok();
        dotenv::dotenv().ok();

        let spacings = list_var("TICK_SPACINGS");
        let tick_spacings = if spacings.is_empty() { vec![1, 50, 100, 200, 2000] } else { parse_spacings(&spacings)? };

        Ok(Config {
            rpc_url: env::var("RPC_URL").map_err(|_| "RPC_URL must be set")?,
            quoter_address: env::var("QUOTER_ADDRESS").map_err(|_| "QUOTER_ADDRESS must be set")?,
            pool_factory_address: env::var("POOL_FACTORY_ADDRESS").ok(),
            cl_factory_address: env::var("CL_FACTORY_ADDRESS").ok(),
            port: var_or("PORT", 8000),

            batch_chunk_size: var_or("BATCH_CHUNK_SIZE", 10),
            rpc_retries: var_or("RPC_RETRIES", 2),
            rpc_retry_base_delay_ms: var_or("RPC_RETRY_BASE_DELAY_MS", 500),
            rpc_timeout_secs: var_or("RPC_TIMEOUT_SECS", 10),
            block_tag: env::var("BLOCK_TAG").unwrap_or_else(|_| "latest".to_string()),

            tick_spacings,
            intermediate_tokens: list_var("INTERMEDIATE_TOKENS"),
            known_tokens: list_var("KNOWN_TOKENS"),

            cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| ".cache".to_string()),
            cache_ttl_secs: var_or("CACHE_TTL_SECS", 3600),
            refresh_interval_secs: var_or("REFRESH_INTERVAL_SECS", 300),
            reserve_retry_rounds: var_or("RESERVE_RETRY_ROUNDS", 3),
            reserve_retry_delay_ms: var_or("RESERVE_RETRY_DELAY_MS", 2000),
            max_pools_per_factory: var_or("MAX_POOLS_PER_FACTORY", 5000),
        })
    }
}
