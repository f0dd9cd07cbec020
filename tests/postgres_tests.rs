use anyhow::Result;
use notification_dispatch::{
    clients::{database::DatabaseClient, fallback::FallbackStore},
    models::retry::RetryConfig,
    utils::retry_with_backoff,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};

use crate::common::welcome_command;

async fn start_postgres() -> Result<(ContainerAsync<GenericImage>, PgPool)> {
    let container = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .start()
        .await?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

    // The image restarts the server once after initdb.
    let retry = RetryConfig {
        max_attempts: 10,
        initial_delay_ms: 200,
        max_delay_ms: 2_000,
        backoff_multiplier: 2,
    };
    let pool = retry_with_backoff(&retry, "postgres_connect", || {
        PgPoolOptions::new().max_connections(4).connect(&url)
    })
    .await?;

    Ok((container, pool))
}

/// Test: fallback records round-trip through PostgreSQL with the overwrite rule
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_postgres_fallback_store_upserts_by_subject() -> Result<()> {
    let (_container, pool) = start_postgres().await?;
    let database = DatabaseClient::from_pool(pool);
    database.migrate().await?;

    let command = welcome_command(501);
    let first = database.persist(&command, "broker rejected").await?;
    let second = database.persist(&command, "timed out").await?;

    assert_eq!(first.retry_count, 0);
    assert_eq!(second.retry_count, 1);
    assert_eq!(second.delivery_error_message, "timed out");

    let stored = database
        .find_undelivered(501)
        .await?
        .expect("record should exist");
    assert_eq!(stored.recipient_address, "a@example.com");
    assert_eq!(stored.payload["template_id"], "USER_WELCOME");
    assert_eq!(database.list_undelivered(10).await?.len(), 1);

    Ok(())
}

/// Test: a fallback write commits even if the caller's transaction rolls back
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_postgres_fallback_write_is_independent_of_outer_transaction() -> Result<()> {
    let (_container, pool) = start_postgres().await?;
    let database = DatabaseClient::from_pool(pool.clone());
    database.migrate().await?;

    let mut outer = pool.begin().await?;
    sqlx::query("CREATE TEMPORARY TABLE registrations (id BIGINT)")
        .execute(&mut *outer)
        .await?;

    database.persist(&welcome_command(777), "broker rejected").await?;
    outer.rollback().await?;

    assert!(database.find_undelivered(777).await?.is_some());

    Ok(())
}
