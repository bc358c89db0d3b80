//! Error types for scheduling and reconciliation.

use rearm_core::error::RearmError;
use rearm_core::types::EventStatus;

use crate::retry::Retryable;

/// Errors from the external alarm device or its session.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    /// A failure the device API may recover from on its own.
    #[error("Actuator call failed: {0}")]
    Transient(String),
    #[error("Unknown raw alarm mode: {0}")]
    UnknownMode(String),
    #[error("No refresh token registered for user {0}")]
    CredentialMissing(String),
    #[error("No alarm location found for user {0}")]
    NoLocation(String),
    #[error("Storage error: {0}")]
    Storage(#[from] RearmError),
}

impl ActuatorError {
    /// Fatal errors are not worth retrying. Storage hiccups while loading or
    /// rotating a credential are retried like device failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ActuatorError::UnknownMode(_)
                | ActuatorError::CredentialMissing(_)
                | ActuatorError::NoLocation(_)
        )
    }
}

impl Retryable for ActuatorError {
    fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}

/// Errors from handling one delayed message.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("No scheduled event for user {0}")]
    EventMissing(String),
    #[error("Invalid event transition: {0} -> {1}")]
    InvalidTransition(EventStatus, EventStatus),
    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),
    #[error("Storage error: {0}")]
    Storage(#[from] RearmError),
}

/// Errors from issuing scheduled events.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Failed to record scheduled event: {0}")]
    Store(RearmError),
    #[error("Failed to enqueue delayed message: {0}")]
    Enqueue(RearmError),
}

/// Errors from linking a user to a refresh token.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Invalid refresh token: {0}")]
    InvalidToken(String),
    #[error("Storage error: {0}")]
    Storage(#[from] RearmError),
}
