mod app;
mod config;
mod frontend;
mod logging;
mod rpcs;
mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use config::AppConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config/gateway.toml".to_string());
    let config = AppConfig::load(&config_path)?;

    logging::init(&config.logger.level);

    let listen: SocketAddr = config.listen.parse()?;

    let app = Arc::new(app::GatewayApp::new(config).await?);
    let router = router::build(app);

    info!(%listen, "starting gateway");

    axum::Server::bind(&listen)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
