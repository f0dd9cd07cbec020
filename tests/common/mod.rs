use std::{
    collections::HashSet,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::FutureExt;
use notification_dispatch::{
    clients::{
        channel::{ChannelClient, PendingDelivery},
        fallback::FallbackStore,
    },
    dispatcher::{DispatchOrchestrator, DispatchSettings},
    error::{FallbackError, TransportError},
    models::{
        command::NotificationCommand,
        delivery::{ChannelDescription, DeliveryAck},
        fallback::UndeliveredCommandRecord,
    },
};
use serde_json::{Value, json};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt};

pub const CHANNEL: &str = "notifications";

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    HangOnSubmit,
    RejectSubmission,
    PanicOnSubmit,
}

#[derive(Debug, Clone)]
pub struct Published {
    pub channel: String,
    pub partition_key: String,
    pub payload: Value,
    pub thread_name: Option<String>,
}

pub struct FakeChannelClient {
    behavior: Behavior,
    existing_channels: HashSet<String>,
    unreachable: bool,
    published: Mutex<Vec<Published>>,
    sequence: AtomicU64,
}

impl FakeChannelClient {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            existing_channels: HashSet::from([CHANNEL.to_string()]),
            unreachable: false,
            published: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_channels(mut self, channels: &[&str]) -> Self {
        self.existing_channels = channels.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelClient for FakeChannelClient {
    async fn publish(
        &self,
        channel: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PendingDelivery, TransportError> {
        self.published.lock().unwrap().push(Published {
            channel: channel.to_string(),
            partition_key: partition_key.to_string(),
            payload: serde_json::from_slice(&payload).unwrap(),
            thread_name: std::thread::current().name().map(str::to_string),
        });

        let channel = channel.to_string();
        let partition_key = partition_key.to_string();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        match self.behavior {
            Behavior::Succeed => Ok(async move {
                Ok(DeliveryAck {
                    channel,
                    partition_key,
                    sequence,
                })
            }
            .boxed()),
            Behavior::Fail => Ok(async move { Err(TransportError::Rejected { channel }) }.boxed()),
            Behavior::HangOnSubmit => std::future::pending().await,
            Behavior::RejectSubmission => {
                Err(TransportError::Broker("connection reset by peer".to_string()))
            }
            Behavior::PanicOnSubmit => panic!("simulated channel client bug"),
        }
    }

    async fn describe_channel(
        &self,
        channel: &str,
    ) -> Result<Option<ChannelDescription>, TransportError> {
        if self.unreachable {
            return Err(TransportError::Broker("connection refused".to_string()));
        }

        Ok(self
            .existing_channels
            .contains(channel)
            .then(|| ChannelDescription {
                name: channel.to_string(),
                message_count: 0,
                consumer_count: 1,
            }))
    }
}

/// Fallback store whose storage is always down.
#[derive(Default)]
pub struct FailingFallbackStore {
    calls: AtomicU32,
    thread_names: Mutex<Vec<Option<String>>>,
}

impl FailingFallbackStore {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn thread_names(&self) -> Vec<Option<String>> {
        self.thread_names.lock().unwrap().clone()
    }
}

#[async_trait]
impl FallbackStore for FailingFallbackStore {
    async fn persist(
        &self,
        _command: &NotificationCommand,
        _error_message: &str,
    ) -> Result<UndeliveredCommandRecord, FallbackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.thread_names
            .lock()
            .unwrap()
            .push(std::thread::current().name().map(str::to_string));

        Err(FallbackError::Unavailable("database is down".to_string()))
    }
}

pub fn settings() -> DispatchSettings {
    DispatchSettings {
        channel: CHANNEL.to_string(),
        dispatch_workers: 2,
        reaction_workers: 2,
    }
}

pub fn orchestrator(
    client: Arc<FakeChannelClient>,
    store: Arc<dyn FallbackStore>,
) -> DispatchOrchestrator {
    DispatchOrchestrator::new(settings(), client, store).unwrap()
}

pub fn welcome_command(subject_entity_id: i64) -> NotificationCommand {
    NotificationCommand::new("a@example.com", "USER_WELCOME", subject_entity_id)
        .with_context("first_name", json!("Ada"))
        .with_locale("en")
}

pub async fn drain(orchestrator: &DispatchOrchestrator) {
    tokio::time::timeout(Duration::from_secs(5), orchestrator.drain())
        .await
        .expect("dispatches did not finish in time");
}

/// JSON log lines written by any subscriber built from [`CapturedLogs::install`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install(&self) -> DefaultGuard {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json().with_writer(self.clone()))
            .set_default()
    }

    pub fn events(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|event| event["fields"]["message"] == message)
            .collect()
    }
}

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(Arc::clone(&self.0))
    }
}
