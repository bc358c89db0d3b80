//! Background consumer of the delay queue.
//!
//! Polls for due messages and reconciles each one on its own task. A message
//! is deleted only after the reconciler returns `Ok`; on failure it stays in
//! the queue and comes back after the visibility timeout.

use std::sync::Arc;
use std::time::Duration;

use rearm_core::config::QueueConfig;
use rearm_core::error::RearmError;
use rearm_storage::{DelayQueue, Delivery};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::reconciler::Reconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_in_flight: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 10,
            max_in_flight: 16,
        }
    }
}

impl From<&QueueConfig> for WorkerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            batch_size: config.batch_size.max(1),
            max_in_flight: config.max_in_flight.max(1),
        }
    }
}

/// Counts from one poll.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub acknowledged: usize,
    pub failed: usize,
}

pub struct QueueWorker {
    queue: Arc<dyn DelayQueue>,
    reconciler: Arc<Reconciler>,
    settings: WorkerSettings,
    permits: Arc<Semaphore>,
    shutdown: Arc<Notify>,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn DelayQueue>,
        reconciler: Arc<Reconciler>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            reconciler,
            permits: Arc::new(Semaphore::new(settings.max_in_flight)),
            settings,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Receive one batch and reconcile every message in it concurrently.
    pub async fn poll_once(&self) -> Result<BatchReport, RearmError> {
        let mut tasks = JoinSet::new();
        let mut report = BatchReport {
            received: self.dispatch(&mut tasks).await?,
            ..BatchReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            if acknowledged(joined) {
                report.acknowledged += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    /// Receive as many messages as there are free slots (at most one batch)
    /// and spawn a reconcile task for each into `tasks`.
    ///
    /// Waits for a free slot before receiving, so messages are never held
    /// invisible while the worker is saturated.
    async fn dispatch(&self, tasks: &mut JoinSet<bool>) -> Result<usize, RearmError> {
        let mut reserved = Some(self.acquire_permit().await?);
        let room = (self.permits.available_permits() + 1).min(self.settings.batch_size);
        let deliveries = self.queue.receive(room).await?;
        let received = deliveries.len();
        if received > 0 {
            debug!(count = received, in_flight = tasks.len(), "Received delayed messages");
        }

        for delivery in deliveries {
            let permit = match reserved.take() {
                Some(permit) => permit,
                None => self.acquire_permit().await?,
            };
            let queue = self.queue.clone();
            let reconciler = self.reconciler.clone();
            tasks.spawn(async move {
                let acked = process(queue.as_ref(), &reconciler, delivery).await;
                drop(permit);
                acked
            });
        }
        Ok(received)
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, RearmError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RearmError::ShuttingDown)
    }

    /// Poll until [`shutdown`](Self::shutdown) is called.
    ///
    /// In-flight deliveries keep running across polls, so a user stuck in
    /// retries never delays another user's due message. Sleeps for the poll
    /// interval whenever the queue has nothing due, and finishes every
    /// in-flight delivery before returning.
    pub async fn run(&self) {
        info!(
            batch_size = self.settings.batch_size,
            max_in_flight = self.settings.max_in_flight,
            "Queue worker started"
        );
        let mut tasks = JoinSet::new();
        loop {
            let idle = match self.dispatch(&mut tasks).await {
                Ok(received) => received == 0,
                Err(e) => {
                    error!(error = %e, "Queue poll failed");
                    true
                }
            };
            while let Some(joined) = tasks.try_join_next() {
                acknowledged(joined);
            }
            let pause = if idle {
                self.settings.poll_interval
            } else {
                Duration::ZERO
            };
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight deliveries");
        }
        while let Some(joined) = tasks.join_next().await {
            acknowledged(joined);
        }
        info!("Queue worker stopped");
    }

    /// Signal the worker loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

fn acknowledged(joined: Result<bool, JoinError>) -> bool {
    joined.unwrap_or_else(|e| {
        error!(error = %e, "Reconcile task panicked");
        false
    })
}

/// Reconcile one delivery. Returns whether it was acknowledged.
async fn process(queue: &dyn DelayQueue, reconciler: &Reconciler, delivery: Delivery) -> bool {
    let user_id = delivery.message.user_id.clone();
    match reconciler.handle(&delivery.message).await {
        Ok(outcome) => {
            debug!(user_id = %user_id, outcome = ?outcome, "Delivery handled");
            match queue.delete(&delivery.receipt).await {
                Ok(true) => true,
                Ok(false) => {
                    warn!(user_id = %user_id, message_id = %delivery.message_id, "Receipt expired before delete");
                    true
                }
                Err(e) => {
                    error!(user_id = %user_id, error = %e, "Failed to delete handled message");
                    false
                }
            }
        }
        Err(e) => {
            warn!(
                user_id = %user_id,
                message_id = %delivery.message_id,
                receive_count = delivery.receive_count,
                error = %e,
                "Delivery failed, leaving for redelivery"
            );
            false
        }
    }
}
