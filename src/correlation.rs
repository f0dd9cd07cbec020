//! Correlation ids for dispatched commands.
//!
//! When the calling code runs inside a span that carries a valid OpenTelemetry
//! context, the trace id is reused so broker-side logs line up with the
//! request that caused the notification. Otherwise a random v4 UUID is drawn.

use opentelemetry::trace::TraceContextExt;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

use crate::models::command::NotificationCommand;

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationAssigner;

impl CorrelationAssigner {
    pub fn new() -> Self {
        Self
    }

    /// Gives `command` a correlation id unless it already has one.
    pub fn assign(&self, mut command: NotificationCommand) -> NotificationCommand {
        if !command.has_correlation_id() {
            let correlation_id = current_trace_id().unwrap_or_else(|| Uuid::new_v4().to_string());
            command.set_correlation_id(correlation_id);
        }
        command
    }
}

/// Trace id of the current tracing span, if it is backed by a valid
/// OpenTelemetry span context.
pub fn current_trace_id() -> Option<String> {
    let context = tracing::Span::current().context();
    let span = context.span();
    let span_context = span.span_context();

    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}
