mod calendar;
mod config;
mod currency;
mod db;
mod errors;
mod feeds;
mod models;
mod pricing;
mod risk;
mod server;
mod services;
mod state;

use crate::services::MarketDataService;
use crate::state::{AppState, DbCommand};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    // Structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("fx_hedge quote engine starting");

    // Load config
    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    // Init database
    let db_pool = match db::init_db(&cfg.data_dir) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("database init error: {e}");
            std::process::exit(1);
        }
    };

    let rate_source = match feeds::build_rate_source(&cfg) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("rate source error: {e}");
            std::process::exit(1);
        }
    };

    // Handlers -> DB writer, bounded
    let (db_tx, db_rx) = mpsc::channel::<DbCommand>(1024);

    let market = MarketDataService::new(rate_source, db_pool.clone());
    let app_state = AppState::new(cfg.clone(), db_pool.clone(), market, db_tx);

    // DB writer task (pricing audit trail)
    let db_pool_writer = db_pool.clone();
    tokio::spawn(async move {
        db::run_db_writer(db_pool_writer, db_rx).await;
    });

    if !app_state.market.health_check().await {
        tracing::warn!(source = app_state.market.source_name(), "rate source health check failed at startup");
    }

    let app = server::router(app_state);

    let addr = format!("0.0.0.0:{}", cfg.server_port);
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}
