// src/engine/repository.rs
//
// Injected state holders with an explicit lifecycle:
// - TokenRegistry: known token metadata (seeded from config, grown by refreshes)
// - PoolRepository: live keyed pool view + the persisted snapshot
// - KeyValueStore: where the snapshot lives (file-backed in production)

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::error::{EngineError, EngineResult};
use crate::models::{CacheSnapshot, PoolSnapshot, Token};

pub const POOL_SNAPSHOT_KEY: &str = "pool-snapshot";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> EngineResult<Option<String>>;
    /// Replaces the whole value; readers never observe a partial write.
    async fn put(&self, key: &str, value: &str) -> EngineResult<()>;
    async fn remove(&self, key: &str) -> EngineResult<()>;
}

/// One JSON file per key. Writes go to a unique temp file first, then rename over.
pub struct FileStore {
    dir: PathBuf,
    write_seq: AtomicU64,
}

impl FileStore {
    /// Creates the directory up front; called once at startup.
    pub fn new(dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, write_seq: AtomicU64::new(0) })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &str) -> EngineResult<()> {
        let target = self.path_for(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!("{}.json.{}.tmp", key, seq));
        fs::write(&tmp, value).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> EngineResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> EngineResult<()> {
        self.entries.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> EngineResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: RwLock<HashMap<Address, Token>>,
}

impl TokenRegistry {
    pub fn new(seed: impl IntoIterator<Item = Token>) -> Self {
        Self { tokens: RwLock::new(seed.into_iter().map(|t| (t.address, t)).collect()) }
    }

    pub async fn get(&self, address: &Address) -> Option<Token> {
        self.tokens.read().await.get(address).cloned()
    }

    pub async fn insert(&self, token: Token) {
        self.tokens.write().await.insert(token.address, token);
    }

    /// Addresses from `candidates` not yet known.
    pub async fn unknown(&self, candidates: impl IntoIterator<Item = Address>) -> Vec<Address> {
        let tokens = self.tokens.read().await;
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|a| !tokens.contains_key(a) && seen.insert(*a))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheStatus {
    /// Snapshot valid; carries its age in ms.
    Fresh { pools: usize, age_ms: i64 },
    /// Snapshot present but older than the ttl; ignored.
    Expired,
    Absent,
}

pub struct PoolRepository {
    store: Box<dyn KeyValueStore>,
    ttl: Duration,
    live: RwLock<HashMap<Address, PoolSnapshot>>,
    last_persisted_ms: RwLock<Option<i64>>,
}

impl PoolRepository {
    pub fn new(store: Box<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl, live: RwLock::new(HashMap::new()), last_persisted_ms: RwLock::new(None) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read the persisted snapshot; a valid one seeds the live view.
    pub async fn load_cached(&self, now_ms: i64) -> CacheStatus {
        let raw = match self.store.get(POOL_SNAPSHOT_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheStatus::Absent,
            Err(e) => {
                log::warn!("pool snapshot unreadable: {}", e);
                return CacheStatus::Absent;
            }
        };
        let snapshot: CacheSnapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("pool snapshot corrupt, ignoring: {}", e);
                return CacheStatus::Absent;
            }
        };
        if !snapshot.is_valid_at(now_ms, self.ttl) {
            log::info!("pool snapshot from {} expired, waiting for live refresh", snapshot.timestamp);
            return CacheStatus::Expired;
        }

        let pools = snapshot.pools.len();
        let mut live = self.live.write().await;
        for pool in snapshot.pools {
            live.entry(pool.address).or_insert(pool);
        }
        *self.last_persisted_ms.write().await = Some(snapshot.timestamp);
        CacheStatus::Fresh { pools, age_ms: now_ms - snapshot.timestamp }
    }

    /// Write the current live view as one snapshot (whole-value replace).
    pub async fn persist(&self, now_ms: i64) -> EngineResult<()> {
        let pools = self.pools().await;
        let snapshot = CacheSnapshot { pools, timestamp: now_ms };
        let json = serde_json::to_string(&snapshot).map_err(|e| EngineError::Storage(e.to_string()))?;
        self.store.put(POOL_SNAPSHOT_KEY, &json).await?;
        *self.last_persisted_ms.write().await = Some(now_ms);
        log::info!("persisted pool snapshot with {} pools", snapshot.pools.len());
        Ok(())
    }

    pub async fn invalidate(&self) -> EngineResult<()> {
        self.store.remove(POOL_SNAPSHOT_KEY).await?;
        self.live.write().await.clear();
        *self.last_persisted_ms.write().await = None;
        Ok(())
    }

    pub async fn last_persisted_ms(&self) -> Option<i64> {
        *self.last_persisted_ms.read().await
    }

    /// Insert or replace one pool entry, keeping reserves already known for it
    /// when the incoming entry has none.
    pub async fn merge(&self, mut pool: PoolSnapshot) {
        let mut live = self.live.write().await;
        if let Some(existing) = live.get(&pool.address) {
            if pool.needs_reserves() {
                pool.reserve0 = existing.reserve0;
                pool.reserve1 = existing.reserve1;
            }
        }
        live.insert(pool.address, pool);
    }

    /// Keyed functional update: only the matching entry changes.
    pub async fn patch_reserves(&self, address: Address, reserve0: U256, reserve1: U256) -> bool {
        let mut live = self.live.write().await;
        match live.get_mut(&address) {
            Some(pool) => {
                pool.reserve0 = reserve0;
                pool.reserve1 = reserve1;
                true
            }
            None => false,
        }
    }

    /// Drop entries no longer listed by the factories.
    pub async fn retain(&self, listed: &HashSet<Address>) {
        self.live.write().await.retain(|addr, _| listed.contains(addr));
    }

    pub async fn get(&self, address: &Address) -> Option<PoolSnapshot> {
        self.live.read().await.get(address).cloned()
    }

    /// Live view sorted by address.
    pub async fn pools(&self) -> Vec<PoolSnapshot> {
        let mut pools: Vec<PoolSnapshot> = self.live.read().await.values().cloned().collect();
        pools.sort_by_key(|p| p.address);
        pools
    }

    pub async fn len(&self) -> usize {
        self.live.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.live.read().await.is_empty()
    }

    pub async fn pools_missing_reserves(&self) -> Vec<PoolSnapshot> {
        self.pools().await.into_iter().filter(|p| p.needs_reserves()).collect()
    }
}
