//! Error types for the voice skill.

use rearm_action::error::{RegistrationError, SchedulerError};

/// Errors raised while handling a skill request. Never spoken to the user.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
    #[error("No handler for request: {0}")]
    Unhandled(String),
    #[error("Scheduling failed: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Registration failed: {0}")]
    Registration(#[from] RegistrationError),
}
