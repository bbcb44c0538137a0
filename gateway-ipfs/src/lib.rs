//! C8: the IPFS gateway adapter. `/ipfs/v0/<api-key>/api/v0/<ipfs-method>` is
//! proxied to an IPFS cluster HTTP endpoint, with bandwidth metering and CID
//! ownership checks layered on top of the C3 rate limiter.

mod errors;
mod ownership;
mod path;

pub use errors::IpfsError;
pub use gateway_entities::ipfs_files::PinStatus;
pub use ownership::{owns_cid, record_uploads, set_pin_status, AddResult};
pub use path::{bandwidth_direction, is_allowed_method, parse_path, Direction};

use redis_rate_limiter::{BandwidthDirection, IpfsUsageSource, RateLimiter};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use tracing::warn;

pub const IPFS_CHAIN_ID: u64 = 0;

pub struct IpfsAdapter {
    pub client: reqwest::Client,
    pub cluster_endpoint: String,
    pub db: DatabaseConnection,
}

#[derive(Debug, Deserialize)]
struct ObjectStat {
    #[serde(rename = "CumulativeSize")]
    cumulative_size: u64,
}

impl IpfsAdapter {
    pub fn new(client: reqwest::Client, cluster_endpoint: String, db: DatabaseConnection) -> Self {
        Self {
            client,
            cluster_endpoint,
            db,
        }
    }

    fn upstream_url(&self, method: &str, query: &str) -> String {
        let base = self.cluster_endpoint.trim_end_matches('/');
        if query.is_empty() {
            format!("{base}/api/v0/{method}")
        } else {
            format!("{base}/api/v0/{method}?{query}")
        }
    }

    /// Step 3 of the upload contract: admits the transfer against the
    /// tenant's plan limit *before* any bytes move, comparing prospective
    /// storage and transfer-up usage (current usage plus `content_length`)
    /// against the plan limit.
    pub async fn admit_upload(
        &self,
        rate_limiter: &RateLimiter,
        api_key: &str,
        content_length: u64,
        usage_source: &dyn IpfsUsageSource,
    ) -> Result<(), IpfsError> {
        self.admit_transfer(rate_limiter, api_key, content_length, BandwidthDirection::Up, usage_source)
            .await
    }

    /// Fetches `CumulativeSize` from the cluster's `/object/stat` endpoint so
    /// a download can be admitted against the plan limit before proxying.
    pub async fn object_size(&self, cid: &str) -> Result<u64, IpfsError> {
        let url = self.upstream_url("object/stat", &format!("arg={cid}"));
        let stat: ObjectStat = self.client.post(url).send().await?.json().await?;
        Ok(stat.cumulative_size)
    }

    /// Step 4 of the download contract: admits the transfer against the
    /// plan limit using the object's real size, fetched via [`object_size`]
    /// before any bytes are proxied.
    ///
    /// [`object_size`]: Self::object_size
    pub async fn admit_download(
        &self,
        rate_limiter: &RateLimiter,
        api_key: &str,
        size: u64,
        usage_source: &dyn IpfsUsageSource,
    ) -> Result<(), IpfsError> {
        self.admit_transfer(rate_limiter, api_key, size, BandwidthDirection::Down, usage_source)
            .await
    }

    async fn admit_transfer(
        &self,
        rate_limiter: &RateLimiter,
        api_key: &str,
        size: u64,
        direction: BandwidthDirection,
        usage_source: &dyn IpfsUsageSource,
    ) -> Result<(), IpfsError> {
        let within_limit = rate_limiter
            .check_ipfs_limit(IPFS_CHAIN_ID, api_key, size, direction, usage_source)
            .await?;
        if !within_limit {
            return Err(IpfsError::OverPlanLimit);
        }
        Ok(())
    }

    /// Step 3 (upload success path): persists newly uploaded files (skipping
    /// CIDs the tenant already owns) and meters the transferred bytes.
    pub async fn finish_upload(
        &self,
        rate_limiter: &RateLimiter,
        user_id: i64,
        api_key: &str,
        body_bytes: u64,
        add_results: &[AddResult],
    ) -> Result<i64, IpfsError> {
        let new_bytes = record_uploads(&self.db, user_id, add_results).await?;
        if let Err(err) = rate_limiter
            .bandwidth(IPFS_CHAIN_ID, api_key, body_bytes, BandwidthDirection::Up)
            .await
        {
            warn!(?err, %api_key, "failed to meter ipfs upload bandwidth, ignoring");
        }
        Ok(new_bytes)
    }

    pub async fn finish_download(&self, rate_limiter: &RateLimiter, api_key: &str, body_bytes: u64) {
        if let Err(err) = rate_limiter
            .bandwidth(IPFS_CHAIN_ID, api_key, body_bytes, BandwidthDirection::Down)
            .await
        {
            warn!(?err, %api_key, "failed to meter ipfs download bandwidth, ignoring");
        }
    }

    /// Step 5: pin/unpin, checking tenant ownership of the referenced CID
    /// first. `/pin/update` un-pins `old_cid` and pins `new_cid`.
    pub async fn pin(&self, user_id: i64, cid: &str, status: PinStatus) -> Result<(), IpfsError> {
        if !owns_cid(&self.db, user_id, cid).await? {
            return Err(IpfsError::NotOwner);
        }
        set_pin_status(&self.db, user_id, cid, status).await?;
        Ok(())
    }

    pub async fn pin_update(&self, user_id: i64, old_cid: &str, new_cid: &str) -> Result<(), IpfsError> {
        if !owns_cid(&self.db, user_id, new_cid).await? {
            return Err(IpfsError::NotOwner);
        }
        if owns_cid(&self.db, user_id, old_cid).await? {
            set_pin_status(&self.db, user_id, old_cid, PinStatus::Unpin).await?;
        }
        set_pin_status(&self.db, user_id, new_cid, PinStatus::Pin).await?;
        Ok(())
    }
}
