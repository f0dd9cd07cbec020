use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{debug, error, info};

use crate::{
    clients::fallback::FallbackStore,
    config::Config,
    error::FallbackError,
    models::{command::NotificationCommand, fallback::UndeliveredCommandRecord},
    utils::retry_with_backoff,
};

const UPSERT_UNDELIVERED: &str = r#"
    INSERT INTO undelivered_commands (
        subject_entity_id,
        recipient_address,
        template_id,
        locale,
        last_attempt_correlation_id,
        payload,
        initial_attempt_at,
        last_attempt_at,
        retry_count,
        delivery_error_message
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (subject_entity_id) DO UPDATE SET
        recipient_address = EXCLUDED.recipient_address,
        template_id = EXCLUDED.template_id,
        locale = EXCLUDED.locale,
        last_attempt_correlation_id = EXCLUDED.last_attempt_correlation_id,
        payload = EXCLUDED.payload,
        last_attempt_at = EXCLUDED.last_attempt_at,
        delivery_error_message = EXCLUDED.delivery_error_message,
        retry_count = undelivered_commands.retry_count + 1
    RETURNING *
"#;

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let pool = retry_with_backoff(&config.retry_config(), "postgres_connect", || {
            PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(Duration::from_secs(5))
                .connect(&config.database_url)
        })
        .await
        .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow!("Database migration failed: {}", e))?;

        info!("Database schema up to date");

        Ok(())
    }

    pub async fn find_undelivered(
        &self,
        subject_entity_id: i64,
    ) -> Result<Option<UndeliveredCommandRecord>, FallbackError> {
        let record = sqlx::query_as::<_, UndeliveredCommandRecord>(
            "SELECT * FROM undelivered_commands WHERE subject_entity_id = $1",
        )
        .bind(subject_entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Oldest attempts first, the order a redelivery sweep works through them.
    pub async fn list_undelivered(
        &self,
        limit: i64,
    ) -> Result<Vec<UndeliveredCommandRecord>, FallbackError> {
        let records = sqlx::query_as::<_, UndeliveredCommandRecord>(
            "SELECT * FROM undelivered_commands ORDER BY last_attempt_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl FallbackStore for DatabaseClient {
    async fn persist(
        &self,
        command: &NotificationCommand,
        error_message: &str,
    ) -> Result<UndeliveredCommandRecord, FallbackError> {
        let record = UndeliveredCommandRecord::first_attempt(command, error_message, Utc::now())?;

        // Fresh transaction from the pool; never one borrowed from the caller.
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, UndeliveredCommandRecord>(UPSERT_UNDELIVERED)
            .bind(record.subject_entity_id)
            .bind(&record.recipient_address)
            .bind(&record.template_id)
            .bind(&record.locale)
            .bind(&record.last_attempt_correlation_id)
            .bind(&record.payload)
            .bind(record.initial_attempt_at)
            .bind(record.last_attempt_at)
            .bind(record.retry_count)
            .bind(&record.delivery_error_message)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    subject_entity_id = record.subject_entity_id,
                    correlation_id = %record.last_attempt_correlation_id,
                    "Failed to write undelivered command"
                );
                e
            })?;

        tx.commit().await?;

        debug!(
            subject_entity_id = stored.subject_entity_id,
            retry_count = stored.retry_count,
            "Undelivered command committed"
        );

        Ok(stored)
    }
}
