use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` takes precedence; otherwise falls back to the configured
/// logger level. Matches the teacher's `tracing-subscriber` + `EnvFilter`
/// setup.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(true).init();
}
