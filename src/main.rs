use std::sync::Arc;

use anyhow::{Error, Result};
use notification_dispatch::{
    app,
    clients::{
        channel::ChannelClient,
        database::DatabaseClient,
        fallback::{FallbackStore, MemoryFallbackStore},
        rbmq::RabbitMqClient,
    },
    config::{Config, FallbackBackend},
    dispatcher::DispatchSettings,
    observability::{init_metrics, init_tracing},
    verifier::ChannelVerifier,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // RUST_LOG may come from .env, so it has to be loaded before the subscriber.
    dotenvy::dotenv().ok();
    let tracer_provider = init_tracing()?;

    let result = run().await;
    if let Err(e) = &result {
        error!(error = %e, "Fatal startup or runtime error, exiting");
    }

    if let Err(e) = tracer_provider.shutdown() {
        eprintln!("Failed to shut down tracer provider: {e}");
    }

    result
}

async fn run() -> Result<(), Error> {
    let config = Config::load()?;
    info!(
        channel = %config.notification_channel,
        fallback_backend = ?config.fallback_backend,
        "Configuration validated"
    );

    let metrics = init_metrics()?;

    let (database, fallback_store): (Option<Arc<DatabaseClient>>, Arc<dyn FallbackStore>) =
        match config.fallback_backend {
            FallbackBackend::Postgres => {
                let database = Arc::new(DatabaseClient::connect(&config).await?);
                database.migrate().await?;
                let store: Arc<dyn FallbackStore> = database.clone();
                (Some(database), store)
            }
            FallbackBackend::Memory => {
                warn!("Using in-memory fallback store; undelivered commands will not survive a restart");
                let store: Arc<dyn FallbackStore> = Arc::new(MemoryFallbackStore::new());
                (None, store)
            }
        };

    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);
    let channel_client: Arc<dyn ChannelClient> = rabbitmq.clone();

    let app = app::prepare(
        DispatchSettings::from_config(&config),
        &ChannelVerifier::from_config(&config),
        channel_client,
        fallback_store,
    )
    .await?;

    app.serve(
        config.server_port,
        database,
        Some(metrics),
        config.shutdown_grace(),
        shutdown_signal(),
    )
    .await?;

    if rabbitmq.is_connected() {
        rabbitmq.close().await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
