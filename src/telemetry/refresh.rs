use std::time::Instant;

use jiff::Timestamp;
use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;

/// Structured events for one token refresh exchange of one instance.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    instance: String,
    refresh_url: String,
    started: Instant,
}

impl RefreshTelemetry {
    pub fn new(instance: impl Into<String>, refresh_url: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            instance: instance.into(),
            refresh_url: refresh_url.into(),
            started: Instant::now(),
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn emit_start(&self) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            instance = %self.instance,
            url = %self.refresh_url,
            timestamp = %Timestamp::now(),
            "refresh.start"
        );
    }

    pub fn emit_success(&self) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            instance = %self.instance,
            url = %self.refresh_url,
            elapsed_ms = self.elapsed_ms(),
            timestamp = %Timestamp::now(),
            "refresh.success"
        );
    }

    /// `status` is set when the endpoint answered with a non-200 status.
    pub fn emit_failure(&self, error: &Error) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            instance = %self.instance,
            url = %self.refresh_url,
            status = error.status().map(|s| s.as_u16()),
            elapsed_ms = self.elapsed_ms(),
            timestamp = %Timestamp::now(),
            error = %error,
            "refresh.failure"
        );
    }
}
