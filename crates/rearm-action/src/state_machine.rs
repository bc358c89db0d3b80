//! Scheduled event lifecycle.
//!
//! Scheduled -> Processing -> Processed. Status never moves backwards, and a
//! new decision for the user replaces the record instead of reopening it.

use rearm_core::types::EventStatus;

use crate::error::ReconcileError;

/// Validate that a status transition is allowed.
pub fn validate_transition(from: EventStatus, to: EventStatus) -> Result<(), ReconcileError> {
    let valid = matches!(
        (from, to),
        (EventStatus::Scheduled, EventStatus::Processing)
            | (EventStatus::Processing, EventStatus::Processed)
    );

    if valid {
        Ok(())
    } else {
        Err(ReconcileError::InvalidTransition(from, to))
    }
}
