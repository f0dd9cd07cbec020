use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{channel::ChannelClient, database::DatabaseClient},
    dispatcher::DispatchOrchestrator,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    database: Option<Arc<DatabaseClient>>,
    channel_client: Arc<dyn ChannelClient>,
    orchestrator: Arc<DispatchOrchestrator>,
}

impl HealthChecker {
    pub fn new(
        database: Option<Arc<DatabaseClient>>,
        channel_client: Arc<dyn ChannelClient>,
        orchestrator: Arc<DispatchOrchestrator>,
    ) -> Self {
        Self {
            database,
            channel_client,
            orchestrator,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        if let Some(database) = &self.database {
            checks.insert("database".to_string(), check_database(database).await);
        }

        checks.insert("message_broker".to_string(), self.check_broker().await);

        let critical_failures = self.orchestrator.critical_failures();
        checks.insert("dispatch".to_string(), check_dispatch(critical_failures));

        HealthCheckResponse {
            status: determine_overall_status(&checks),
            timestamp: Utc::now(),
            critical_failures,
            checks,
        }
    }

    async fn check_broker(&self) -> ServiceHealth {
        let start = Instant::now();
        let channel = self.orchestrator.channel();

        match self.channel_client.describe_channel(channel).await {
            Ok(Some(_)) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Broker health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Ok(None) => {
                warn!(channel, "Notification channel disappeared from broker");
                ServiceHealth::unhealthy(format!("Channel '{}' not found", channel))
            }
            Err(e) => {
                warn!(error = %e, "Broker health check failed");
                ServiceHealth::unhealthy(format!("Broker unreachable: {}", e))
            }
        }
    }
}

async fn check_database(database: &DatabaseClient) -> ServiceHealth {
    let start = Instant::now();

    match database.health_check().await {
        Ok(_) => {
            let elapsed = start.elapsed().as_millis() as u64;
            debug!(response_time_ms = elapsed, "Database health check passed");
            ServiceHealth::healthy(elapsed)
        }
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            ServiceHealth::unhealthy(e.to_string())
        }
    }
}

fn check_dispatch(critical_failures: u64) -> ServiceHealth {
    if critical_failures == 0 {
        ServiceHealth::healthy(0)
    } else {
        ServiceHealth::degraded(format!(
            "{} notification(s) lost since startup, see error logs",
            critical_failures
        ))
    }
}

fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    if checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy)
    {
        HealthStatus::Unhealthy
    } else if checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded)
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
