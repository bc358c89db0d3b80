//! Issues scheduled mode changes.
//!
//! Writing the event record is the supersession point: once a new event is
//! stored for a user, every delivery still in flight for an older event is
//! ignored by the reconciler.

use std::sync::Arc;
use std::time::Duration;

use rearm_core::types::{DelayedMessage, Mode, ScheduledEvent};
use rearm_storage::{DelayQueue, EventStore};
use tracing::info;
use uuid::Uuid;

use crate::error::SchedulerError;

/// Writes scheduled events and enqueues their delayed messages.
#[derive(Clone)]
pub struct Scheduler {
    store: EventStore,
    queue: Arc<dyn DelayQueue>,
}

impl Scheduler {
    pub fn new(store: EventStore, queue: Arc<dyn DelayQueue>) -> Self {
        Self { store, queue }
    }

    /// Record a new event for the user and wake the reconciler after
    /// `delay_seconds`.
    ///
    /// `correlation_id` travels as the message body for log correlation.
    pub async fn schedule(
        &self,
        user_id: &str,
        delay_seconds: u32,
        target_mode: Mode,
        correlation_id: &str,
    ) -> Result<ScheduledEvent, SchedulerError> {
        let event = ScheduledEvent::new(target_mode, delay_seconds);
        self.store
            .put_event(user_id, &event)
            .await
            .map_err(SchedulerError::Store)?;

        let message = DelayedMessage {
            user_id: user_id.to_string(),
            event_id: event.event_id.clone(),
            mode_override: None,
            body: correlation_id.to_string(),
        };
        self.queue
            .send(&message, Duration::from_secs(delay_seconds.into()))
            .await
            .map_err(SchedulerError::Enqueue)?;

        info!(
            user_id = %user_id,
            event_id = %event.event_id,
            mode = %target_mode,
            delay_secs = delay_seconds,
            "Scheduled mode change"
        );
        Ok(event)
    }

    /// Enqueue a forced mode change that bypasses the event store.
    ///
    /// Returns the message's event id. Overrides are not superseded by later
    /// events and are not ordered against each other.
    pub async fn schedule_override(
        &self,
        user_id: &str,
        delay_seconds: u32,
        mode: Mode,
        correlation_id: &str,
    ) -> Result<String, SchedulerError> {
        let message = DelayedMessage {
            user_id: user_id.to_string(),
            event_id: Uuid::new_v4().to_string(),
            mode_override: Some(mode),
            body: correlation_id.to_string(),
        };
        self.queue
            .send(&message, Duration::from_secs(delay_seconds.into()))
            .await
            .map_err(SchedulerError::Enqueue)?;

        info!(
            user_id = %user_id,
            event_id = %message.event_id,
            mode = %mode,
            delay_secs = delay_seconds,
            "Scheduled mode override"
        );
        Ok(message.event_id)
    }

    /// Disarm now, then return to `final_mode` after `delay_seconds`.
    pub async fn disarm_and_rearm(
        &self,
        user_id: &str,
        final_mode: Mode,
        delay_seconds: u32,
        correlation_id: &str,
    ) -> Result<ScheduledEvent, SchedulerError> {
        self.schedule_override(user_id, 0, Mode::Disarmed, correlation_id)
            .await?;
        self.schedule(user_id, delay_seconds, final_mode, correlation_id)
            .await
    }
}
