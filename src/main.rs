use std::sync::Arc;

use site_api::server::{serve, shutdown_signal, ServerState};
use site_api::{AppState, Config};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE_PATH: &str = "./Config.yml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load_from_file(CONFIG_FILE_PATH)
        .and_then(|c| c.into_runtime())
        .unwrap_or_else(|e| {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        });

    if config.default_salt {
        warn!("ip_salt is not configured; falling back to the built-in salt makes stored IP hashes predictable");
    }

    let config = Arc::new(config);
    let state = AppState::open(Arc::clone(&config)).unwrap_or_else(|e| {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    });

    let listener = TcpListener::bind(config.listen).await.unwrap_or_else(|e| {
        eprintln!("fatal: failed to bind {}: {e}", config.listen);
        std::process::exit(1);
    });

    info!(addr = %config.listen, site = %config.site_hostname, "listening");

    serve(listener, ServerState::new(Arc::new(state)), shutdown_signal()).await;
}
