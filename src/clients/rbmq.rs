use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::FutureExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    clients::channel::{ChannelClient, PendingDelivery},
    config::Config,
    error::TransportError,
    models::delivery::{ChannelDescription, DeliveryAck},
    utils::retry_with_backoff,
};

pub const PARTITION_KEY_HEADER: &str = "partition_key";

/// RabbitMQ-backed channel client.
///
/// A channel is a durable queue reached through the default exchange. The
/// publishing AMQP channel runs in confirm mode so every publish gets a broker
/// verdict, and publishes are mandatory so an unroutable message fails instead
/// of vanishing.
pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    delivery_timeout: Duration,
    sequence: AtomicU64,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = retry_with_backoff(&config.retry_config(), "rabbitmq_connect", || {
            Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
        })
        .await
        .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        info!("RabbitMQ connection established");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        info!(
            delivery_timeout_ms = config.delivery_timeout_ms,
            "RabbitMQ publisher channel ready"
        );

        Ok(Self {
            connection,
            channel,
            delivery_timeout: config.delivery_timeout(),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.connection
            .close(200, "shutting down")
            .await
            .map_err(|e| anyhow!("Failed to close RabbitMQ connection: {}", e))?;

        info!("RabbitMQ connection closed");

        Ok(())
    }
}

#[async_trait]
impl ChannelClient for RabbitMqClient {
    async fn publish(
        &self,
        channel: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PendingDelivery, TransportError> {
        let mut headers = FieldTable::default();
        headers.insert(
            PARTITION_KEY_HEADER.into(),
            AMQPValue::LongString(partition_key.to_string().into()),
        );

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into())
            .with_headers(headers);

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        // Handing the payload over and waiting for the confirm share one
        // deadline, so a blocked connection fails like a missing confirm.
        let timeout = self.delivery_timeout;
        let deadline = Instant::now() + timeout;

        let confirm = within_deadline(
            deadline,
            timeout,
            channel,
            self.channel.basic_publish(
                "",
                channel,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                &payload,
                properties,
            ),
        )
        .await?;

        debug!(channel, partition_key, sequence, "Payload handed to broker");

        let channel = channel.to_string();
        let partition_key = partition_key.to_string();

        Ok(async move {
            let confirmation = within_deadline(deadline, timeout, &channel, confirm).await?;

            if confirmation.is_nack() {
                return Err(TransportError::Rejected { channel });
            }
            if confirmation.take_message().is_some() {
                return Err(TransportError::Unroutable { channel });
            }

            Ok(DeliveryAck {
                channel,
                partition_key,
                sequence,
            })
        }
        .boxed())
    }

    async fn describe_channel(
        &self,
        channel: &str,
    ) -> Result<Option<ChannelDescription>, TransportError> {
        // A failed passive declare closes the AMQP channel it ran on, so the
        // check never uses the publishing channel.
        let check_channel = self.connection.create_channel().await?;

        let declared = check_channel
            .queue_declare(
                channel,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await;

        match declared {
            Ok(queue) => {
                if let Err(e) = check_channel.close(200, "channel check complete").await {
                    debug!(channel, error = %e, "Failed to close channel check AMQP channel");
                }

                Ok(Some(ChannelDescription {
                    name: channel.to_string(),
                    message_count: queue.message_count(),
                    consumer_count: queue.consumer_count(),
                }))
            }
            Err(e) if is_not_found(&e) => {
                debug!(channel, "Channel not found on broker");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn within_deadline<T, E>(
    deadline: Instant,
    timeout: Duration,
    channel: &str,
    stage: impl Future<Output = Result<T, E>>,
) -> Result<T, TransportError>
where
    E: Into<TransportError>,
{
    match tokio::time::timeout_at(deadline, stage).await {
        Ok(outcome) => outcome.map_err(Into::into),
        Err(_) => Err(TransportError::Timeout {
            channel: channel.to_string(),
            timeout,
        }),
    }
}

fn is_not_found(error: &lapin::Error) -> bool {
    let message = error.to_string();
    message.contains("NOT_FOUND") || message.contains("404")
}
