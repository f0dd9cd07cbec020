use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::{
    error::TransportError,
    models::delivery::{ChannelDescription, DeliveryAck},
};

/// Resolves once the broker has confirmed (or refused) a submitted payload.
pub type PendingDelivery = BoxFuture<'static, Result<DeliveryAck, TransportError>>;

/// Keyed publish interface to a partitioned broker.
///
/// Publishing is split in two: `publish` hands the payload to the broker
/// client and returns as soon as it has been accepted for sending, the
/// returned [`PendingDelivery`] carries the broker's verdict. Implementations
/// own their delivery timeout. It covers both stages: a `publish` or a
/// pending delivery that outlives it must fail with
/// [`TransportError::Timeout`].
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PendingDelivery, TransportError>;

    /// `Ok(None)` when the channel does not exist.
    async fn describe_channel(
        &self,
        channel: &str,
    ) -> Result<Option<ChannelDescription>, TransportError>;
}
