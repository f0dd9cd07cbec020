use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Error, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use crate::{
    api::{AppState, run_api_server},
    clients::{
        channel::ChannelClient, database::DatabaseClient, fallback::FallbackStore,
        health::HealthChecker,
    },
    dispatcher::{DispatchOrchestrator, DispatchSettings},
    error::StartupError,
    verifier::ChannelVerifier,
};

/// A fully constructed and verified service. Only obtainable through
/// [`prepare`], so nothing can serve traffic before verification passed.
pub struct App {
    orchestrator: Arc<DispatchOrchestrator>,
    channel_client: Arc<dyn ChannelClient>,
}

/// Builds the dispatch pipeline, then checks the broker for every required
/// channel.
pub async fn prepare(
    settings: DispatchSettings,
    verifier: &ChannelVerifier,
    channel_client: Arc<dyn ChannelClient>,
    fallback_store: Arc<dyn FallbackStore>,
) -> Result<App, StartupError> {
    let orchestrator =
        DispatchOrchestrator::new(settings, Arc::clone(&channel_client), fallback_store)?;

    verifier.verify(channel_client.as_ref()).await?;

    Ok(App {
        orchestrator: Arc::new(orchestrator),
        channel_client,
    })
}

impl App {
    pub fn orchestrator(&self) -> Arc<DispatchOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Serves `/health` and `/metrics` until `shutdown` resolves, then drains
    /// in-flight dispatches for at most `grace`.
    pub async fn serve<F>(
        self,
        port: u16,
        database: Option<Arc<DatabaseClient>>,
        metrics: Option<PrometheusHandle>,
        grace: Duration,
        shutdown: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(AppState {
            health_checker: HealthChecker::new(
                database,
                Arc::clone(&self.channel_client),
                Arc::clone(&self.orchestrator),
            ),
            metrics,
        });

        run_api_server(state, port, shutdown).await?;

        info!(
            in_flight = self.orchestrator.in_flight(),
            "Draining in-flight notifications"
        );

        match tokio::time::timeout(grace, self.orchestrator.drain()).await {
            Ok(()) => info!("All in-flight notifications handled"),
            Err(_) => warn!(
                in_flight = self.orchestrator.in_flight(),
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace period elapsed with notifications still in flight"
            ),
        }

        Ok(())
    }
}
