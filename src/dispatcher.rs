use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures_util::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, instrument::WithSubscriber, warn};

use crate::{
    clients::{
        channel::{ChannelClient, PendingDelivery},
        fallback::FallbackStore,
    },
    config::Config,
    correlation::CorrelationAssigner,
    error::{FallbackError, StartupError, TransportError},
    models::{command::NotificationCommand, delivery::DeliveryAck},
    pool::WorkerPool,
    recording::{CriticalFailureSignal, record_delivered, record_fallback_persisted},
};

pub const SUBMIT_POOL_NAME: &str = "dispatch-submit";
pub const REACTION_POOL_NAME: &str = "dispatch-react";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub channel: String,
    pub dispatch_workers: usize,
    pub reaction_workers: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel: config.notification_channel.clone(),
            dispatch_workers: config.dispatch_workers,
            reaction_workers: config.reaction_workers,
        }
    }
}

/// Fire-and-forget publisher for notification commands.
///
/// `dispatch` hands the command to the submission pool and returns at once.
/// The broker's verdict is handled on a separate reaction pool: a delivery is
/// logged, a failure is written to the fallback store, and a failure to write
/// the fallback record raises the critical-failure signal. None of these
/// outcomes ever reaches the caller.
pub struct DispatchOrchestrator {
    shared: Arc<Shared>,
    assigner: CorrelationAssigner,
    tracker: TaskTracker,
    submit_pool: WorkerPool,
    reaction_pool: WorkerPool,
}

struct Shared {
    channel: String,
    channel_client: Arc<dyn ChannelClient>,
    fallback_store: Arc<dyn FallbackStore>,
    critical_failures: CriticalFailureSignal,
}

impl DispatchOrchestrator {
    pub fn new(
        settings: DispatchSettings,
        channel_client: Arc<dyn ChannelClient>,
        fallback_store: Arc<dyn FallbackStore>,
    ) -> Result<Self, StartupError> {
        let submit_pool = WorkerPool::new(SUBMIT_POOL_NAME, settings.dispatch_workers)?;
        let reaction_pool = WorkerPool::new(REACTION_POOL_NAME, settings.reaction_workers)?;

        info!(
            channel = %settings.channel,
            submit_pool = submit_pool.name(),
            dispatch_workers = submit_pool.workers(),
            reaction_pool = reaction_pool.name(),
            reaction_workers = reaction_pool.workers(),
            "Dispatch orchestrator ready"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                channel: settings.channel,
                channel_client,
                fallback_store,
                critical_failures: CriticalFailureSignal::new(),
            }),
            assigner: CorrelationAssigner::new(),
            tracker: TaskTracker::new(),
            submit_pool,
            reaction_pool,
        })
    }

    pub fn channel(&self) -> &str {
        &self.shared.channel
    }

    /// Queues `command` for publishing. Never blocks and never fails; the
    /// command has not necessarily been delivered when this returns.
    pub fn dispatch(&self, command: NotificationCommand) {
        // Trace context lives on the caller's thread, so the id is assigned
        // here and everything the pools need is moved into the tasks.
        let command = self.assigner.assign(command);

        let span = info_span!(
            "dispatch_notification",
            channel = %self.shared.channel,
            correlation_id = %command.correlation_id(),
            subject_entity_id = command.subject_entity_id,
        );

        debug!(
            parent: &span,
            template_id = %command.template_id,
            "Notification command handed to submission pool"
        );

        let shared = Arc::clone(&self.shared);
        let tracker = self.tracker.clone();
        let reactions = self.reaction_pool.handle().clone();

        let submission = async move {
            let submitted = shared.submit(&command).await;

            let reaction = async move {
                let outcome = match submitted {
                    Ok(pending) => await_delivery(pending).await,
                    Err(e) => Err(e),
                };
                shared.react(command, outcome).await;
            };

            tracker.spawn_on(
                reaction.in_current_span().with_current_subscriber(),
                &reactions,
            );
        };

        self.tracker.spawn_on(
            submission.instrument(span).with_current_subscriber(),
            self.submit_pool.handle(),
        );
    }

    /// Waits until every command dispatched so far has been fully handled.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Submissions and reactions that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn critical_failures(&self) -> u64 {
        self.shared.critical_failures.count()
    }
}

impl Shared {
    async fn submit(
        &self,
        command: &NotificationCommand,
    ) -> Result<PendingDelivery, TransportError> {
        let payload = command.to_payload()?;

        let publish = self
            .channel_client
            .publish(&self.channel, command.partition_key(), payload);

        match AssertUnwindSafe(publish).catch_unwind().await {
            Ok(submitted) => submitted,
            Err(panic) => Err(TransportError::Broker(format!(
                "channel client panicked during submission: {}",
                panic_message(&*panic)
            ))),
        }
    }

    async fn react(
        &self,
        command: NotificationCommand,
        outcome: Result<DeliveryAck, TransportError>,
    ) {
        match outcome {
            Ok(ack) => {
                info!(
                    channel = %ack.channel,
                    partition_key = %ack.partition_key,
                    sequence = ack.sequence,
                    correlation_id = %command.correlation_id(),
                    "Notification delivered"
                );
                record_delivered(&self.channel);
            }
            Err(transport_error) => self.persist_fallback(command, transport_error).await,
        }
    }

    async fn persist_fallback(
        &self,
        command: NotificationCommand,
        transport_error: TransportError,
    ) {
        let error_message = transport_error.to_string();

        let persisted = AssertUnwindSafe(self.fallback_store.persist(&command, &error_message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(FallbackError::Unavailable(format!(
                    "fallback store panicked: {}",
                    panic_message(&*panic)
                )))
            });

        match persisted {
            Ok(record) => {
                warn!(
                    channel = %self.channel,
                    correlation_id = %command.correlation_id(),
                    subject_entity_id = record.subject_entity_id,
                    retry_count = record.retry_count,
                    error = %transport_error,
                    "Notification dispatch failed, command saved for redelivery"
                );
                record_fallback_persisted(&self.channel);
            }
            Err(fallback_error) => {
                self.critical_failures.raise(&self.channel);

                let payload = serde_json::to_string(&command).unwrap_or_default();
                error!(
                    channel = %self.channel,
                    correlation_id = %command.correlation_id(),
                    subject_entity_id = command.subject_entity_id,
                    recipient_address = %command.recipient_address,
                    transport_error = %transport_error,
                    fallback_error = %fallback_error,
                    payload = %payload,
                    "Notification lost: dispatch and fallback persistence both failed, manual recovery required"
                );
            }
        }
    }
}

async fn await_delivery(pending: PendingDelivery) -> Result<DeliveryAck, TransportError> {
    match AssertUnwindSafe(pending).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(TransportError::Broker(format!(
            "delivery confirmation panicked: {}",
            panic_message(&*panic)
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
