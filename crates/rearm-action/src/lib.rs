//! Scheduling and reconciliation engine for Rearm.
//!
//! The scheduler records a pending mode change and enqueues a delayed
//! message; the queue worker hands due messages to the reconciler, which
//! validates them against the stored event and drives the alarm through the
//! actuator adapter with bounded retries.

pub mod actuator;
pub mod error;
pub mod reconciler;
pub mod registration;
pub mod retry;
pub mod scheduler;
pub mod state_machine;
pub mod worker;

pub use actuator::{
    Actuator, ActuatorConnector, ActuatorProvider, ConnectionCache, SessionFactory,
    SimulatedAlarm, SimulatedVendor,
};
pub use error::{ActuatorError, ReconcileError, RegistrationError, SchedulerError};
pub use reconciler::{IgnoreReason, Outcome, Reconciler};
pub use registration::Registrar;
pub use retry::{RetryOutcome, RetryPolicy};
pub use scheduler::Scheduler;
pub use worker::{BatchReport, QueueWorker, WorkerSettings};
