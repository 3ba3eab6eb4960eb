use std::sync::Arc;

use focusdeck::api;
use focusdeck::config::Config;
use focusdeck::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            log::error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let bind_addr = state.config.bind_addr.clone();
    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Could not bind {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    log::info!("focusdeck listening on {}", bind_addr);
    if let Err(e) = axum::serve(listener, app).await {
        log::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
