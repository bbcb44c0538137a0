//! The result cache (C1): memoizes idempotent JSON-RPC `result` bytes keyed
//! by `(chain, method, hash(params))`, backed by a shared redis connection
//! pool. Best-effort: callers are expected to swallow store failures (spec.md
//! §7, "cache errors: always swallowed").

use std::time::Duration;

use bb8_redis::RedisConnectionManager;
use derive_more::{Display, Error, From};
use md5::{Digest, Md5};
use redis::AsyncCommands;
use tracing::{trace, warn};

pub type RedisPool = bb8::Pool<RedisConnectionManager>;

#[derive(Debug, Display, Error, From)]
pub enum CacheError {
    Pool(bb8::RunError<redis::RedisError>),
    Redis(redis::RedisError),
}

/// Build the redis connection pool used by both the cache and the rate
/// limiter. A single pool is shared process-wide (spec.md §5, "a shared
/// connection pool per process is used").
pub async fn build_pool(redis_url: &str, max_size: u32) -> Result<RedisPool, CacheError> {
    let manager = RedisConnectionManager::new(redis_url)?;
    let pool = bb8::Pool::builder()
        .max_size(max_size)
        .build(manager)
        .await?;
    Ok(pool)
}

/// `rpc:<chain-id>:<method>:<md5(params)>`
pub fn rpc_cache_key(chain_id: u64, method: &str, params_bytes: &[u8]) -> String {
    let digest = Md5::digest(params_bytes);
    format!("rpc:{chain_id}:{method}:{}", hex::encode(digest))
}

/// `tendermint:<chain-id>:<path>:<md5(path+query)>`
pub fn tendermint_cache_key(chain_id: u64, path: &str, path_and_query: &[u8]) -> String {
    let digest = Md5::digest(path_and_query);
    format!("tendermint:{chain_id}:{path}:{}", hex::encode(digest))
}

#[derive(Clone)]
pub struct ResultCache {
    pool: RedisPool,
}

impl ResultCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// `lookup(key) -> bytes | miss`. Any redis failure is surfaced to the
    /// caller (who is expected to treat it as a miss and log it), since a
    /// cache lookup failure should never block the request.
    pub async fn lookup(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        if value.is_some() {
            trace!(%key, "cache hit");
        } else {
            trace!(%key, "cache miss");
        }
        Ok(value)
    }

    /// `store(key, bytes, ttl)`, best-effort. Callers should log and ignore
    /// failures rather than fail the request over a cache write.
    pub async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, ttl_secs as usize).await?;
        Ok(())
    }

    /// Store, logging and swallowing any failure. This is the shape every
    /// call site in the proxy actually wants (spec.md §4.5 step 6: "the
    /// cache store step failing is logged and ignored").
    pub async fn store_best_effort(&self, key: &str, value: &[u8], ttl: Duration) {
        if let Err(err) = self.store(key, value, ttl).await {
            warn!(%key, ?err, "failed to store cache entry, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_keys_are_stable_and_printable() {
        let key = rpc_cache_key(1, "eth_blockNumber", b"[]");
        assert_eq!(key, rpc_cache_key(1, "eth_blockNumber", b"[]"));
        assert!(key.starts_with("rpc:1:eth_blockNumber:"));
        assert!(key.chars().all(|c| c.is_ascii_graphic()));
    }

    #[test]
    fn byte_different_params_hash_differently() {
        let a = rpc_cache_key(1, "m", br#"{"a":1,"b":2}"#);
        let b = rpc_cache_key(1, "m", br#"{"b":2,"a":1}"#);
        assert_ne!(a, b);
    }

    #[test]
    fn tendermint_keys_use_path_and_query() {
        let key = tendermint_cache_key(64, "status", b"status?height=1");
        assert!(key.starts_with("tendermint:64:status:"));
    }
}
