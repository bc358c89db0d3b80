//! Decides what a woken delayed message still means and drives the alarm.
//!
//! Validated messages move their event `scheduled -> processing` before the
//! alarm is touched and `processing -> processed` once the apply loop is
//! done, so a duplicate delivery never re-applies a mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rearm_core::types::{DelayedMessage, EventStatus, Mode, ScheduledEvent};
use rearm_storage::EventStore;
use tracing::{debug, info, warn};

use crate::actuator::ActuatorProvider;
use crate::error::ReconcileError;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::state_machine::validate_transition;

/// Why a delivery was dropped without touching the alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event was already picked up by an earlier delivery.
    AlreadyClaimed(EventStatus),
    /// A newer event replaced the one this message was issued for.
    Superseded { current_event_id: String },
}

/// Result of handling one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    /// The alarm already reported the target mode.
    AlreadyInMode(Mode),
    Applied { mode: Mode, retry: RetryOutcome },
}

pub struct Reconciler {
    store: EventStore,
    actuators: Arc<dyn ActuatorProvider>,
    retry: RetryPolicy,
    /// Serializes the read-check-write claim per user. Users never share a
    /// lock, and an entry only lives while some delivery holds or awaits it.
    claims: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(store: EventStore, actuators: Arc<dyn ActuatorProvider>, retry: RetryPolicy) -> Self {
        Self {
            store,
            actuators,
            retry,
            claims: Mutex::new(HashMap::new()),
        }
    }

    fn claim_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Handle one delivered message.
    ///
    /// `Ok` means the message is done with and may be acknowledged, even when
    /// it was ignored or the apply loop gave up. `Err` leaves it for
    /// redelivery.
    pub async fn handle(&self, message: &DelayedMessage) -> Result<Outcome, ReconcileError> {
        debug!(
            user_id = %message.user_id,
            event_id = %message.event_id,
            correlation_id = %message.body,
            "Handling delayed message"
        );

        if let Some(mode) = message.mode_override {
            info!(user_id = %message.user_id, mode = %mode, "Applying mode override");
            return self.apply(&message.user_id, mode).await;
        }

        let mut event = match self.claim(message).await? {
            Ok(event) => event,
            Err(reason) => {
                info!(
                    user_id = %message.user_id,
                    event_id = %message.event_id,
                    reason = ?reason,
                    "Ignoring delayed message"
                );
                return Ok(Outcome::Ignored(reason));
            }
        };

        let outcome = self.apply(&message.user_id, event.target_mode).await?;

        validate_transition(event.status, EventStatus::Processed)?;
        event.status = EventStatus::Processed;
        self.store.put_event(&message.user_id, &event).await?;
        info!(
            user_id = %message.user_id,
            event_id = %event.event_id,
            outcome = ?outcome,
            "Scheduled event processed"
        );
        Ok(outcome)
    }

    /// Check the message against the stored event and mark it processing.
    ///
    /// The inner `Err` is a normal rejection; the outer one is a failure.
    async fn claim(
        &self,
        message: &DelayedMessage,
    ) -> Result<Result<ScheduledEvent, IgnoreReason>, ReconcileError> {
        let lock = self.claim_lock(&message.user_id);
        let claimed = {
            let _guard = lock.lock().await;
            self.claim_locked(message).await
        };
        self.release_claim_lock(&message.user_id, lock);
        claimed
    }

    /// Drop the user's lock from the map once no other delivery shares it.
    fn release_claim_lock(&self, user_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        let ours = claims
            .get(user_id)
            .is_some_and(|current| Arc::ptr_eq(current, &lock));
        // One reference in the map plus ours.
        if ours && Arc::strong_count(&lock) == 2 {
            claims.remove(user_id);
        }
    }

    async fn claim_locked(
        &self,
        message: &DelayedMessage,
    ) -> Result<Result<ScheduledEvent, IgnoreReason>, ReconcileError> {
        let mut event = self
            .store
            .get_event(&message.user_id)
            .await?
            .ok_or_else(|| ReconcileError::EventMissing(message.user_id.clone()))?;

        if event.status.is_claimed() {
            return Ok(Err(IgnoreReason::AlreadyClaimed(event.status)));
        }
        if event.event_id != message.event_id {
            return Ok(Err(IgnoreReason::Superseded {
                current_event_id: event.event_id,
            }));
        }

        validate_transition(event.status, EventStatus::Processing)?;
        event.status = EventStatus::Processing;
        self.store.put_event(&message.user_id, &event).await?;
        Ok(Ok(event))
    }

    /// Drive the user's alarm to `target`.
    ///
    /// Every attempt connects, reads the current mode and only changes it
    /// when it differs, so a transient connect or read failure costs one
    /// attempt rather than the delivery. Only fatal actuator errors escape.
    async fn apply(&self, user_id: &str, target: Mode) -> Result<Outcome, ReconcileError> {
        let actuators = self.actuators.as_ref();
        let found_in_target = &AtomicBool::new(false);

        let retry = self
            .retry
            .run(
                move || async move {
                    let actuator = actuators.actuator_for(user_id).await?;
                    if actuator.get_state().await? == target {
                        found_in_target.store(true, Ordering::SeqCst);
                        return Ok(());
                    }
                    actuator.apply_state(target).await
                },
                move || async move {
                    let current = match actuators.actuator_for(user_id).await {
                        Ok(actuator) => actuator.get_state().await,
                        Err(e) => Err(e),
                    };
                    match current {
                        Ok(mode) => Ok(mode == target),
                        Err(e) if e.is_fatal() => Err(e),
                        Err(e) => {
                            warn!(user_id = %user_id, error = %e, "Could not re-read alarm mode");
                            Ok(false)
                        }
                    }
                },
            )
            .await?;

        let retry = match retry {
            RetryOutcome::Succeeded { attempts: 1 } if found_in_target.load(Ordering::SeqCst) => {
                debug!(user_id = %user_id, mode = %target, "Alarm already in target mode");
                return Ok(Outcome::AlreadyInMode(target));
            }
            RetryOutcome::Succeeded { attempts } if found_in_target.load(Ordering::SeqCst) => {
                RetryOutcome::Converged { attempts }
            }
            other => other,
        };

        if let RetryOutcome::Exhausted { attempts } = retry {
            warn!(
                user_id = %user_id,
                mode = %target,
                attempts,
                "Gave up setting alarm mode"
            );
        } else {
            info!(user_id = %user_id, mode = %target, "Alarm mode set");
        }
        Ok(Outcome::Applied { mode: target, retry })
    }
}
