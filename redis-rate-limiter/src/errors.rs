pub use bb8_redis::bb8::ErrorSink as Bb8ErrorSync;
pub use bb8_redis::redis::RedisError;

use derive_more::{Display, Error, From};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RedisErrorSink;

impl Bb8ErrorSync<RedisError> for RedisErrorSink {
    fn sink(&self, err: RedisError) {
        warn!(?err, "redis error");
    }

    fn boxed_clone(&self) -> Box<dyn Bb8ErrorSync<RedisError>> {
        Box::new(self.clone())
    }
}

pub type RedisPoolError = bb8_redis::bb8::RunError<RedisError>;

#[derive(Debug, Display, Error, From)]
pub enum RateLimitError {
    Pool(RedisPoolError),
    Redis(RedisError),
    /// the quota script returned a value outside `{1, -1, -2, -3}`
    #[display(fmt = "quota script returned unexpected value {_0}")]
    #[error(ignore)]
    #[from(ignore)]
    UnexpectedScriptReply(i64),
}
