mod api;
mod config;
mod error;
mod migration;
pub mod models;
mod store;
mod validation;

use std::sync::Arc;

use anyhow::Context;
use env_logger::Env;

use crate::{
    api::AppState,
    config::Settings,
    store::{MemoryStore, PgStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::try_init_from_env(Env::default().default_filter_or("bms=info"))?;

    let settings = Settings::load().context("invalid BMS_* configuration")?;

    let store: Arc<dyn Store> = match &settings.database_url {
        Some(url) => {
            let store = PgStore::connect(url, settings.max_connections).await?;
            migration::migrate(store.pool(), &settings.migrations_dir).await?;
            Arc::new(store)
        }
        None => {
            log::warn!("BMS_DATABASE_URL is not set, records are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    api::start_web_server(AppState {
        store,
        settings: Arc::new(settings),
    })
    .await
}
