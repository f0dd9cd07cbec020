use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::command::NotificationCommand;

/// A command whose dispatch failed, kept until a redelivery sweep picks it up.
///
/// Keyed by `subject_entity_id`: at most one outstanding record per subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UndeliveredCommandRecord {
    pub subject_entity_id: i64,
    pub recipient_address: String,
    pub template_id: String,
    pub locale: Option<String>,
    pub last_attempt_correlation_id: String,
    pub payload: JsonValue,
    pub initial_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub retry_count: i32,
    pub delivery_error_message: String,
}

impl UndeliveredCommandRecord {
    pub fn first_attempt(
        command: &NotificationCommand,
        error_message: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            subject_entity_id: command.subject_entity_id,
            recipient_address: command.recipient_address.clone(),
            template_id: command.template_id.clone(),
            locale: command.locale.clone(),
            last_attempt_correlation_id: command.correlation_id().to_string(),
            payload: serde_json::to_value(command)?,
            initial_attempt_at: attempted_at,
            last_attempt_at: attempted_at,
            retry_count: 0,
            delivery_error_message: error_message.to_string(),
        })
    }

    /// Folds a later failed attempt for the same subject into this record.
    ///
    /// The original `initial_attempt_at` is kept, everything describing the
    /// latest attempt is replaced and `retry_count` goes up by one.
    pub fn record_attempt(&mut self, latest: UndeliveredCommandRecord) {
        debug_assert_eq!(self.subject_entity_id, latest.subject_entity_id);

        self.recipient_address = latest.recipient_address;
        self.template_id = latest.template_id;
        self.locale = latest.locale;
        self.last_attempt_correlation_id = latest.last_attempt_correlation_id;
        self.payload = latest.payload;
        self.last_attempt_at = latest.last_attempt_at;
        self.delivery_error_message = latest.delivery_error_message;
        self.retry_count += 1;
    }
}
