use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A request to render `template_id` for `recipient_address` and hand it to
/// the notification channel.
///
/// The recipient address doubles as the broker partition key, so commands for
/// the same recipient stay ordered relative to each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationCommand {
    pub recipient_address: String,
    pub template_id: String,

    #[serde(default)]
    pub template_context: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub locale: Option<String>,

    pub subject_entity_id: i64,

    #[serde(default)]
    correlation_id: String,
}

impl NotificationCommand {
    pub fn new(
        recipient_address: impl Into<String>,
        template_id: impl Into<String>,
        subject_entity_id: i64,
    ) -> Self {
        Self {
            recipient_address: recipient_address.into(),
            template_id: template_id.into(),
            template_context: HashMap::new(),
            locale: None,
            subject_entity_id,
            correlation_id: String::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.template_context.insert(key.into(), value);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Empty until the command has been through the correlation assigner.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn has_correlation_id(&self) -> bool {
        !self.correlation_id.is_empty()
    }

    /// Sets the correlation id once. Later calls are ignored.
    pub(crate) fn set_correlation_id(&mut self, correlation_id: String) {
        if self.correlation_id.is_empty() {
            self.correlation_id = correlation_id;
        }
    }

    pub fn partition_key(&self) -> &str {
        &self.recipient_address
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
