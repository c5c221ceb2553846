use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cache;
mod config;
mod coordinator;
mod errors;
mod health;
mod messaging;
mod metrics;
mod models;
mod service;
mod storage;
mod utils;

use config::Config;
use coordinator::Coordinator;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_pipeline=debug"))
        )
        .init();

    let config = Config::parse();
    tracing::info!(
        http_addr = %config.http_addr,
        topic = %config.kafka_topic,
        group = %config.kafka_group_id,
        cache = ?config.cache_backend,
        producer = config.producer_enabled,
        "Starting order pipeline"
    );

    let mut coordinator = Coordinator::connect(config.clone()).await?;
    coordinator.start()?;

    // Runs until SIGINT/SIGTERM
    let served = api::serve(&config.http_addr, coordinator.app_state()).await;

    coordinator.stop().await;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}
