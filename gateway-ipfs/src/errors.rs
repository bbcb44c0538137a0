use derive_more::{Display, Error, From};

#[derive(Debug, Display, Error, From)]
pub enum IpfsError {
    Db(sea_orm::DbErr),
    Upstream(reqwest::Error),
    RateLimit(redis_rate_limiter::RateLimitError),
    #[display(fmt = "unsupported ipfs method")]
    #[error(ignore)]
    #[from(ignore)]
    UnsupportedMethod,
    #[display(fmt = "not the owner of this cid")]
    #[error(ignore)]
    #[from(ignore)]
    NotOwner,
    #[display(fmt = "over the ipfs plan limit")]
    #[error(ignore)]
    #[from(ignore)]
    OverPlanLimit,
}
