use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skirmish_server::config::{load_game_config, ServerConfig};
use skirmish_server::game::scheduler::TickScheduler;
use skirmish_server::metrics::{self, Metrics};
use skirmish_server::net::bridge::ConcurrencyBridge;
use skirmish_server::net::game_session::GameSession;
use skirmish_server::net::tls::TlsConfig;
use skirmish_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Skirmish Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("Invalid server configuration")?;
    info!(
        "Configuration loaded: {}:{}, {} Hz, world {}px, max_players={}",
        config.bind_address, config.port, config.tick_rate, config.world_size, config.max_players
    );

    let game_config = load_game_config(&config.game_config_path).with_context(|| {
        format!(
            "Failed to load game config from {}",
            config.game_config_path.display()
        )
    })?;

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let bridge = Arc::new(ConcurrencyBridge::new());
    let mut game = GameSession::new(&config, game_config, bridge.clone(), metrics.clone())
        .context("Failed to build the world")?;
    let mut scheduler = TickScheduler::start(config.tick_rate, move |delta| game.step(delta))
        .context("Failed to start tick thread")?;

    let tls = TlsConfig::load(
        config.tls_cert_path.as_deref(),
        config.tls_key_path.as_deref(),
    )
    .await?;
    let server = WebTransportServer::new(&config, tls, bridge);
    info!(
        "Server ready on https://{}:{}",
        config.bind_address, config.port
    );
    info!("Certificate hash: {}", server.cert_hash());

    #[cfg(feature = "registration")]
    let registration = skirmish_server::registration::start_registration(metrics.clone());
    #[cfg(not(feature = "registration"))]
    let registration: Option<tokio::task::JoinHandle<()>> = None;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        }
    }

    if let Some(task) = registration {
        task.abort();
    }
    scheduler.stop();
    info!("Server stopped");

    Ok(())
}
