use tracing::{error, info, warn};

use crate::{clients::channel::ChannelClient, config::Config, error::StartupError};

/// Startup guard that refuses to let the process run without its channels.
#[derive(Debug, Clone)]
pub struct ChannelVerifier {
    enabled: bool,
    required_channels: Vec<String>,
}

impl ChannelVerifier {
    pub fn new(enabled: bool, required_channels: Vec<String>) -> Self {
        Self {
            enabled,
            required_channels,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.verify_channels_on_startup, config.required_channels())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks every declared channel. Missing channels are reported together;
    /// a broker error stops the check immediately.
    pub async fn verify(&self, client: &dyn ChannelClient) -> Result<(), StartupError> {
        if !self.enabled {
            info!("Channel verification disabled, skipping");
            return Ok(());
        }

        if self.required_channels.is_empty() {
            warn!("Channel verification enabled but no channels are declared");
            return Ok(());
        }

        let mut missing = Vec::new();

        for channel in &self.required_channels {
            match client.describe_channel(channel).await {
                Ok(Some(description)) => {
                    info!(
                        channel = %description.name,
                        messages = description.message_count,
                        consumers = description.consumer_count,
                        "Required channel present"
                    );
                }
                Ok(None) => {
                    error!(channel = %channel, "Required channel does not exist on broker");
                    missing.push(channel.clone());
                }
                Err(source) => {
                    error!(channel = %channel, error = %source, "Broker unreachable during channel verification");
                    return Err(StartupError::BrokerUnavailable {
                        channel: channel.clone(),
                        source,
                    });
                }
            }
        }

        if missing.is_empty() {
            info!(
                channels = self.required_channels.len(),
                "All required channels verified"
            );
            Ok(())
        } else {
            Err(StartupError::MissingChannels(missing))
        }
    }
}
