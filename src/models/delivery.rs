use serde::Serialize;

/// Broker confirmation for one published command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryAck {
    pub channel: String,
    pub partition_key: String,
    /// Publish sequence number local to the channel client. Plays the role of
    /// an offset when correlating logs with broker-side traces.
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelDescription {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}
