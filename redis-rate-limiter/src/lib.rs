//! Redis-backed quota admission (C2) and rate limiting (C3). Keys are
//! hash-tagged on the api-key (`{api-key}`) so every key for one tenant lives
//! on the same shard of a sharded redis deployment.

mod errors;
mod quota;
mod rate_limiter;

pub use bb8_redis::{bb8, redis, RedisConnectionManager};
pub use errors::{RateLimitError, RedisErrorSink, RedisPoolError};
pub use quota::{QuotaResult, QuotaScript};
pub use rate_limiter::{AllowError, BandwidthDirection, IpfsUsageSnapshot, IpfsUsageSource, RateLimiter};

pub type RedisPool = bb8::Pool<RedisConnectionManager>;
pub type RedisConnection<'a> = bb8::PooledConnection<'a, RedisConnectionManager>;

/// Build the shared redis pool, logging connection errors through
/// [`RedisErrorSink`] instead of dropping them silently.
pub async fn build_pool(redis_url: &str, max_size: u32) -> Result<RedisPool, RateLimitError> {
    let manager = RedisConnectionManager::new(redis_url)?;
    let pool = bb8::Pool::builder()
        .max_size(max_size)
        .error_sink(Box::new(RedisErrorSink))
        .build(manager)
        .await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_script_embeds_without_trailing_corruption() {
        let script = QuotaScript::new();
        // constructing it is the test: the embedded lua must parse into a
        // `redis::Script` without panicking.
        drop(script);
    }
}
