//! C3: the rate limiter built on top of the C2 quota script. Adds whitelist
//! bypass, observability counters, and bandwidth/IPFS-limit bookkeeping.

use std::collections::HashSet;

use bb8_redis::redis::AsyncCommands;
use chrono::{Datelike, Utc};
use tracing::{error, warn};

use crate::errors::RateLimitError;
use crate::quota::{incr_with_expiry_on_create, QuotaResult, QuotaScript};
use crate::{RedisConnection, RedisPool};

const HOUR_TTL_SECS: i64 = 90 * 60;
const DAY_TTL_SECS: i64 = 129_600; // 36h

pub enum BandwidthDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowError {
    QuotaExceeded,
    NoSuchKey,
}

/// Supplies the one-time snapshot of a tenant's IPFS plan usage/limits from
/// the system of record, used to lazily materialize the redis usage hash on
/// first miss. Implemented against the `gateway-entities` models by the
/// binary crate; kept as a trait here so this crate stays database-agnostic.
#[async_trait::async_trait]
pub trait IpfsUsageSource: Send + Sync {
    async fn initial_usage(&self, api_key: &str) -> anyhow::Result<IpfsUsageSnapshot>;
}

#[derive(Debug, Clone, Copy)]
pub struct IpfsUsageSnapshot {
    pub storage: u64,
    pub transfer_up: u64,
    pub transfer_down: u64,
}

pub struct RateLimiter {
    pool: RedisPool,
    quota: QuotaScript,
    whitelist: HashSet<String>,
}

impl RateLimiter {
    pub fn new(pool: RedisPool, whitelist: HashSet<String>) -> Self {
        Self {
            pool,
            quota: QuotaScript::new(),
            whitelist,
        }
    }

    pub fn is_whitelisted(&self, api_key: &str) -> bool {
        self.whitelist.contains(api_key)
    }

    /// `allow(chain, api-key, n) -> nil | {QUOTA_EXCEEDED, NO_SUCH_KEY, INTERNAL}`
    pub async fn allow(
        &self,
        chain_id: u64,
        api_key: &str,
        n: u64,
    ) -> Result<Option<AllowError>, RateLimitError> {
        let mut conn = self.pool.get().await?;

        if self.is_whitelisted(api_key) {
            self.allow_whitelist(&mut conn, chain_id, api_key, n).await?;
            return Ok(None);
        }

        let result = self.quota.admit(&mut conn, chain_id, api_key, n, true).await?;
        match result {
            QuotaResult::Ok => {
                if n > 0 {
                    self.bump_observability(&mut conn, chain_id, n).await;
                }
                Ok(None)
            }
            QuotaResult::NoKey => Ok(Some(AllowError::NoSuchKey)),
            QuotaResult::SecondExceeded | QuotaResult::DayExceeded => {
                Ok(Some(AllowError::QuotaExceeded))
            }
        }
    }

    /// whitelisted keys skip both limit checks but still accrue a day
    /// counter with a 36h TTL, so usage reporting stays accurate.
    async fn allow_whitelist(
        &self,
        conn: &mut RedisConnection<'_>,
        chain_id: u64,
        api_key: &str,
        n: u64,
    ) -> Result<(), RateLimitError> {
        let day = Utc::now().day();
        let key = format!("d:{chain_id}:{{{api_key}}}:{day}");
        incr_with_expiry_on_create(conn, &key, n as i64, DAY_TTL_SECS).await?;
        Ok(())
    }

    /// Fire-and-forget observability counters: failures are logged, never
    /// surfaced to the caller, per spec (`allow` must not fail because a
    /// counter increment failed).
    async fn bump_observability(&self, conn: &mut RedisConnection<'_>, chain_id: u64, n: u64) {
        let day = Utc::now().day();
        let counters = [
            format!("chain-hour:{chain_id}"),
            format!("chain-day:{chain_id}:{day}"),
            "global-hour".to_string(),
            format!("global-day:{day}"),
        ];
        for key in counters {
            let ttl = if key.starts_with("chain-hour") || key.starts_with("global-hour") {
                HOUR_TTL_SECS
            } else {
                DAY_TTL_SECS
            };
            if let Err(err) = incr_with_expiry_on_create(conn, &key, n as i64, ttl).await {
                warn!(%key, ?err, "failed to bump observability counter, ignoring");
            }
        }
    }

    /// `bandwidth(chain, api-key, bytes, direction)`. Whitelisted keys are
    /// admitted unconditionally (bandwidth is never denied, only metered).
    pub async fn bandwidth(
        &self,
        chain_id: u64,
        api_key: &str,
        bytes: u64,
        direction: BandwidthDirection,
    ) -> Result<(), RateLimitError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let day = now.day();
        let month = now.month();
        let dir = match direction {
            BandwidthDirection::Up => "up",
            BandwidthDirection::Down => "down",
        };

        let hour_key = format!("bw:{dir}:hour:{chain_id}:{{{api_key}}}");
        let day_key = format!("bw:{dir}:day:{chain_id}:{{{api_key}}}:{day}");
        let month_key = format!("bw:{dir}:month:{chain_id}:{{{api_key}}}:{month}");

        incr_with_expiry_on_create(&mut conn, &hour_key, bytes as i64, HOUR_TTL_SECS).await?;
        incr_with_expiry_on_create(&mut conn, &day_key, bytes as i64, DAY_TTL_SECS).await?;
        incr_with_expiry_on_create(&mut conn, &month_key, bytes as i64, DAY_TTL_SECS).await?;
        Ok(())
    }

    /// Lazily materializes, then checks, the persistent IPFS usage hash
    /// against the plan-limit hash. `size` is the prospective transfer the
    /// caller is about to make and `direction` says which usage field(s) it
    /// would land in: `Up` adds `size` to both `storage` and `transfer_up`
    /// (an upload grows both what's stored and what's been sent), `Down`
    /// adds it to `transfer_down` only. Returns `Ok(true)` when every usage
    /// field, with `size` added where it applies, stays under its
    /// corresponding limit.
    pub async fn check_ipfs_limit(
        &self,
        chain_id: u64,
        api_key: &str,
        size: u64,
        direction: BandwidthDirection,
        usage_source: &dyn IpfsUsageSource,
    ) -> Result<bool, RateLimitError> {
        let mut conn = self.pool.get().await?;
        let usage_key = format!("ipfs:usage:{chain_id}:{{{api_key}}}");
        let limit_key = format!("ipfs:limit:{chain_id}:{{{api_key}}}");

        let usage: Vec<(String, u64)> = conn.hgetall(&usage_key).await?;
        let usage: Vec<(String, u64)> = if usage.is_empty() {
            let snapshot = usage_source.initial_usage(api_key).await.map_err(|err| {
                error!(?err, %api_key, "failed to fetch ipfs usage snapshot from db");
                RateLimitError::UnexpectedScriptReply(0)
            })?;
            let fields = [
                ("storage", snapshot.storage),
                ("transfer_up", snapshot.transfer_up),
                ("transfer_down", snapshot.transfer_down),
            ];
            for (field, value) in fields {
                let _: () = conn.hset(&usage_key, field, value).await?;
            }
            fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
        } else {
            usage
        };

        let affected_fields: &[&str] = match direction {
            BandwidthDirection::Up => &["storage", "transfer_up"],
            BandwidthDirection::Down => &["transfer_down"],
        };

        let limits: std::collections::HashMap<String, u64> = conn.hgetall(&limit_key).await?;
        for (field, used) in usage {
            let limit = limits.get(&field).copied().unwrap_or(u64::MAX);
            let prospective = if affected_fields.contains(&field.as_str()) {
                used.saturating_add(size)
            } else {
                used
            };
            if prospective >= limit {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
