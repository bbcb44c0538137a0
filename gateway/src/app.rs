use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use gateway_cache::ResultCache;
use gateway_ipfs::IpfsAdapter;
use redis_rate_limiter::{IpfsUsageSnapshot, IpfsUsageSource, RateLimiter};
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::config::AppConfig;
use crate::rpcs::{ChainHandler, GenericChainHandler};

/// Connects to the database and runs pending migrations before the server
/// starts accepting requests.
pub async fn get_migrated_db(db_url: &str, min_connections: u32) -> anyhow::Result<DatabaseConnection> {
    let mut opt = sea_orm::ConnectOptions::new(db_url.to_owned());
    opt.max_connections(99)
        .min_connections(min_connections)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(60))
        .sqlx_logging(false);

    let db = sea_orm::Database::connect(opt).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Billing/plan machinery is out of scope (spec Non-goals); new tenants
/// simply start their IPFS usage hash at zero rather than being seeded from
/// a real subscription record.
pub struct ZeroUsageSource;

#[async_trait::async_trait]
impl IpfsUsageSource for ZeroUsageSource {
    async fn initial_usage(&self, _api_key: &str) -> anyhow::Result<IpfsUsageSnapshot> {
        Ok(IpfsUsageSnapshot {
            storage: 0,
            transfer_up: 0,
            transfer_down: 0,
        })
    }
}

pub struct GatewayApp {
    pub config: AppConfig,
    pub chains: HashMap<String, Arc<ChainHandler>>,
    pub cache: ResultCache,
    pub rate_limiter: Arc<RateLimiter>,
    pub db: DatabaseConnection,
    pub http_client: reqwest::Client,
    pub ipfs: IpfsAdapter,
    pub ipfs_usage_source: ZeroUsageSource,
    /// The optional second, generic `/rpc/<chain-name>/<api-key>/<path…>`
    /// router (spec.md §6), keyed by chain name. Unlike `chains`, this path
    /// carries a single router-wide api-key and no quota/cache layer of its
    /// own (spec.md §9 "Configuration shape").
    pub generic_chains: HashMap<String, Arc<GenericChainHandler>>,
    pub generic_apikey: Option<String>,
}

impl GatewayApp {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let redis_url = config
            .redis_urls
            .first()
            .ok_or_else(|| anyhow::anyhow!("at least one redis url is required"))?;

        let cache_pool = gateway_cache::build_pool(redis_url, 20).await?;
        let cache = ResultCache::new(cache_pool);

        let rate_limiter_pool = redis_rate_limiter::build_pool(redis_url, 20).await?;
        let whitelist: HashSet<String> = config.whitelist.iter().cloned().collect();
        let rate_limiter = Arc::new(RateLimiter::new(rate_limiter_pool, whitelist));

        let db = get_migrated_db(&config.database_url, 1).await?;

        let http_client = reqwest::Client::builder().build()?;

        let ipfs = IpfsAdapter::new(http_client.clone(), config.ipfs_cluster.endpoint(), db.clone());

        let mut chains = HashMap::new();
        for (name, chain_config) in &config.chains {
            chains.insert(
                name.clone(),
                Arc::new(ChainHandler::new(name.clone(), chain_config.clone())),
            );
        }

        for chain in chains.values() {
            // an initial synchronous round so request traffic right after
            // startup sees real health flags, not the all-healthy default
            chain.health.probe_once().await;

            let chain = Arc::clone(chain);
            tokio::spawn(async move {
                info!(chain = %chain.name, "starting health probe loop");
                chain.health.run_probe_loop().await;
            });
        }

        let mut generic_chains = HashMap::new();
        let mut generic_apikey = None;
        if let Some(rpc_router) = &config.rpc_router {
            generic_apikey = Some(rpc_router.apikey.clone());
            for (name, chain_config) in &rpc_router.chains {
                let handler = Arc::new(GenericChainHandler::new(name.clone(), chain_config.clone()));
                handler.health.probe_once().await;

                let spawned = Arc::clone(&handler);
                tokio::spawn(async move {
                    info!(chain = %spawned.name, "starting generic-router health probe loop");
                    spawned.health.run_probe_loop().await;
                });

                generic_chains.insert(name.clone(), handler);
            }
        }

        Ok(Self {
            config,
            chains,
            cache,
            rate_limiter,
            db,
            http_client,
            ipfs,
            ipfs_usage_source: ZeroUsageSource,
            generic_chains,
            generic_apikey,
        })
    }

    pub fn chain(&self, name: &str) -> Option<&ChainHandler> {
        self.chains.get(name)
    }

    /// Owned handle to a chain, for handlers (like the WS bridge) that spawn
    /// a task outliving the request's borrow of `self`.
    pub fn chain_arc(&self, name: &str) -> Option<Arc<ChainHandler>> {
        self.chains.get(name).cloned()
    }

    pub fn generic_chain(&self, name: &str) -> Option<&GenericChainHandler> {
        self.generic_chains.get(name).map(Arc::as_ref)
    }

    /// Stand-in for the tenant-identity lookup a real deployment keeps in its
    /// own database (out of scope per spec.md §1: "database ORM setup").
    /// Deterministic so the same api-key always maps to the same IPFS owner
    /// row across restarts.
    pub fn resolve_user_id(&self, api_key: &str) -> i64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        api_key.hash(&mut hasher);
        (hasher.finish() & 0x7fff_ffff_ffff_ffff) as i64
    }
}
