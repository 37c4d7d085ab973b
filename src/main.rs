//! simple_bank - HTTP server entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│  Store   │───▶│  Token   │───▶│ Gateway  │
//! │  (YAML)  │    │ (PG/Mem) │    │JWT/PASETO│    │  (axum)  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Usage: `simple_bank [--env dev] [--port 8080]`

use std::sync::Arc;

use anyhow::{Context, Result};

use simple_bank::config::{AppConfig, StoreBackend};
use simple_bank::db::{Database, schema};
use simple_bank::gateway::{self, state::AppState};
use simple_bank::ledger::{MemoryStore, PgStore, Store};
use simple_bank::token::new_token_maker;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    match config.store {
        StoreBackend::Postgres => {
            let url = config
                .postgres_url
                .as_deref()
                .context("postgres_url is required for the postgres store")?;
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            schema::init_schema(db.pool()).await?;
            Ok(Arc::new(PgStore::new(db.pool().clone())))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = simple_bank::logging::init_logging(&app_config);

    tracing::info!("Starting simple_bank in {} mode", env);

    let store = open_store(&app_config).await?;
    store
        .health_check()
        .await
        .context("Store health check failed")?;
    tracing::info!(store = store.name(), "Ledger store ready");

    let token_maker = new_token_maker(app_config.token.scheme, &app_config.token.symmetric_key)
        .context("Failed to create token maker")?;
    tracing::info!(scheme = ?app_config.token.scheme, "Token maker ready");

    let state = Arc::new(AppState::new(
        store,
        token_maker,
        app_config.token.access_token_duration(),
    ));

    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(&app_config.gateway.host, port, state).await
}
