use std::time::Duration;

use thiserror::Error;

/// Why a command did not reach the channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker rejected delivery to channel '{channel}'")]
    Rejected { channel: String },

    #[error("delivery to channel '{channel}' was returned as unroutable")]
    Unroutable { channel: String },

    #[error("delivery to channel '{channel}' not confirmed within {timeout:?}")]
    Timeout { channel: String, timeout: Duration },

    #[error("broker communication failed: {0}")]
    Broker(String),

    #[error("failed to encode notification command: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<lapin::Error> for TransportError {
    fn from(error: lapin::Error) -> Self {
        TransportError::Broker(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("fallback storage failed: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("fallback storage unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode fallback payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Conditions that must stop the process before it takes traffic.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("required channel(s) missing on broker: {}", .0.join(", "))]
    MissingChannels(Vec<String>),

    #[error("broker unavailable while verifying channel '{channel}': {source}")]
    BrokerUnavailable {
        channel: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_channels_are_listed_in_message() {
        let error = StartupError::MissingChannels(vec!["email".into(), "sms".into()]);
        assert_eq!(
            error.to_string(),
            "required channel(s) missing on broker: email, sms"
        );
    }
}
