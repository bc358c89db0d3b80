//! Delay queue with at-least-once delivery.
//!
//! A sent message becomes deliverable once its delay has elapsed. Receiving a
//! message hides it for the visibility timeout; if it is not deleted within
//! that window it becomes deliverable again. Messages received more than
//! `max_receives` times are moved to the dead-letter set instead of being
//! handed out again.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use rearm_core::config::QueueConfig;
use rearm_core::error::RearmError;
use rearm_core::types::DelayedMessage;

use crate::db::Database;

/// One handed-out copy of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    /// Handle for `delete`. Only the latest receipt of a message is honoured.
    pub receipt: String,
    pub message: DelayedMessage,
    /// 1 on first delivery.
    pub receive_count: u32,
}

/// A message that was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message_id: String,
    pub attributes: BTreeMap<String, String>,
    pub body: String,
    pub receive_count: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub visibility_timeout: Duration,
    pub max_receives: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(240),
            max_receives: 5,
        }
    }
}

impl From<&QueueConfig> for QueueSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            max_receives: config.max_receives.max(1),
        }
    }
}

#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// Enqueue `message`, deliverable no earlier than `delay` from now.
    /// Returns the message id.
    async fn send(&self, message: &DelayedMessage, delay: Duration) -> Result<String, RearmError>;

    /// Claim up to `max` deliverable messages.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, RearmError>;

    /// Acknowledge a delivery. Returns `false` when the receipt is stale
    /// (the message was redelivered or already deleted).
    async fn delete(&self, receipt: &str) -> Result<bool, RearmError>;
}

// =============================================================================
// SQLite
// =============================================================================

/// Durable queue stored next to the records in SQLite.
pub struct SqliteDelayQueue {
    db: Arc<Database>,
    settings: QueueSettings,
}

impl SqliteDelayQueue {
    pub fn new(db: Arc<Database>, settings: QueueSettings) -> Self {
        Self { db, settings }
    }

    /// Messages waiting or in flight.
    pub fn pending_count(&self) -> Result<u64, RearmError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM delayed_messages", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(|e| RearmError::Storage(e.to_string()))
        })
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, RearmError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, attributes, body, receive_count, reason
                     FROM dead_letters ORDER BY dead_at ASC",
                )
                .map_err(|e| RearmError::Storage(format!("Dead letter prepare: {}", e)))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(|e| RearmError::Storage(format!("Dead letter query: {}", e)))?;

            let mut letters = Vec::new();
            for row in rows {
                let (message_id, attributes, body, receive_count, reason) =
                    row.map_err(|e| RearmError::Storage(e.to_string()))?;
                letters.push(DeadLetter {
                    message_id,
                    attributes: serde_json::from_str(&attributes)?,
                    body,
                    receive_count: receive_count as u32,
                    reason,
                });
            }
            Ok(letters)
        })
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl DelayQueue for SqliteDelayQueue {
    async fn send(&self, message: &DelayedMessage, delay: Duration) -> Result<String, RearmError> {
        let id = Uuid::new_v4().to_string();
        let attributes = serde_json::to_string(&message.attributes())?;
        let now = now_millis();
        let visible_at = now + delay.as_millis() as i64;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO delayed_messages (id, attributes, body, visible_at, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, attributes, message.body, visible_at, now],
            )
            .map_err(|e| RearmError::Queue(format!("Enqueue failed: {}", e)))
        })?;
        debug!(
            message_id = %id,
            user_id = %message.user_id,
            delay_secs = delay.as_secs(),
            "Message enqueued"
        );
        Ok(id)
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, RearmError> {
        let settings = self.settings;
        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| RearmError::Queue(format!("Receive transaction: {}", e)))?;
            let now = now_millis();

            let due: Vec<(String, String, String, i64)> = {
                let mut stmt = tx
                    .prepare(
                        "SELECT id, attributes, body, receive_count FROM delayed_messages
                         WHERE visible_at <= ?1 ORDER BY visible_at ASC LIMIT ?2",
                    )
                    .map_err(|e| RearmError::Queue(format!("Receive prepare: {}", e)))?;
                let rows = stmt
                    .query_map(params![now, max as i64], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })
                    .map_err(|e| RearmError::Queue(format!("Receive query: {}", e)))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(|e| RearmError::Queue(e.to_string()))?
            };

            let mut deliveries = Vec::new();
            for (id, raw_attrs, body, previous) in due {
                let receive_count = previous as u32 + 1;
                let parsed = serde_json::from_str::<BTreeMap<String, String>>(&raw_attrs)
                    .map_err(RearmError::from)
                    .and_then(|attrs| DelayedMessage::from_attributes(&attrs, body.clone()));

                let reason = match &parsed {
                    Err(e) => Some(format!("unreadable message: {}", e)),
                    Ok(_) if receive_count > settings.max_receives => {
                        Some(format!("exceeded {} receives", settings.max_receives))
                    }
                    Ok(_) => None,
                };

                if let Some(reason) = reason {
                    warn!(message_id = %id, receive_count = previous, reason = %reason, "Dead-lettering message");
                    tx.execute(
                        "INSERT INTO dead_letters (id, attributes, body, receive_count, reason, dead_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![id, raw_attrs, body, previous, reason, now],
                    )
                    .map_err(|e| RearmError::Queue(format!("Dead-letter insert: {}", e)))?;
                    tx.execute("DELETE FROM delayed_messages WHERE id = ?1", params![id])
                        .map_err(|e| RearmError::Queue(format!("Dead-letter delete: {}", e)))?;
                    continue;
                }

                let Ok(message) = parsed else { continue };
                let receipt = Uuid::new_v4().to_string();
                let hidden_until = now + settings.visibility_timeout.as_millis() as i64;
                tx.execute(
                    "UPDATE delayed_messages
                     SET visible_at = ?1, receive_count = ?2, receipt = ?3
                     WHERE id = ?4",
                    params![hidden_until, receive_count as i64, receipt, id],
                )
                .map_err(|e| RearmError::Queue(format!("Claim failed: {}", e)))?;

                deliveries.push(Delivery {
                    message_id: id,
                    receipt,
                    message,
                    receive_count,
                });
            }

            tx.commit()
                .map_err(|e| RearmError::Queue(format!("Receive commit: {}", e)))?;
            Ok(deliveries)
        })
    }

    async fn delete(&self, receipt: &str) -> Result<bool, RearmError> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM delayed_messages WHERE receipt = ?1",
                params![receipt],
            )
            .map_err(|e| RearmError::Queue(format!("Delete failed: {}", e)))
        })?;
        Ok(removed > 0)
    }
}

// =============================================================================
// In-memory
// =============================================================================

struct Entry {
    id: String,
    message: DelayedMessage,
    visible_at: Instant,
    receive_count: u32,
    receipt: Option<String>,
}

/// Process-local queue driven by the tokio clock, so tests can use paused
/// time to fast-forward delays.
pub struct MemoryDelayQueue {
    entries: Mutex<Vec<Entry>>,
    dead: Mutex<Vec<DeadLetter>>,
    settings: QueueSettings,
}

impl MemoryDelayQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            dead: Mutex::new(Vec::new()),
            settings,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Snapshot of queued messages, in enqueue order.
    pub fn messages(&self) -> Vec<DelayedMessage> {
        self.entries
            .lock()
            .map(|e| e.iter().map(|entry| entry.message.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryDelayQueue {
    fn default() -> Self {
        Self::new(QueueSettings::default())
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RearmError {
    RearmError::Queue(format!("Lock poisoned: {}", e))
}

#[async_trait]
impl DelayQueue for MemoryDelayQueue {
    async fn send(&self, message: &DelayedMessage, delay: Duration) -> Result<String, RearmError> {
        let id = Uuid::new_v4().to_string();
        self.entries.lock().map_err(poisoned)?.push(Entry {
            id: id.clone(),
            message: message.clone(),
            visible_at: Instant::now() + delay,
            receive_count: 0,
            receipt: None,
        });
        Ok(id)
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, RearmError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let mut dead = self.dead.lock().map_err(poisoned)?;

        let mut deliveries = Vec::new();
        let mut index = 0;
        while index < entries.len() && deliveries.len() < max {
            if entries[index].visible_at > now {
                index += 1;
                continue;
            }
            if entries[index].receive_count >= self.settings.max_receives {
                let entry = entries.remove(index);
                warn!(message_id = %entry.id, receive_count = entry.receive_count, "Dead-lettering message");
                dead.push(DeadLetter {
                    message_id: entry.id,
                    attributes: entry.message.attributes(),
                    body: entry.message.body,
                    receive_count: entry.receive_count,
                    reason: format!("exceeded {} receives", self.settings.max_receives),
                });
                continue;
            }

            let entry = &mut entries[index];
            let receipt = Uuid::new_v4().to_string();
            entry.receive_count += 1;
            entry.visible_at = now + self.settings.visibility_timeout;
            entry.receipt = Some(receipt.clone());
            deliveries.push(Delivery {
                message_id: entry.id.clone(),
                receipt,
                message: entry.message.clone(),
                receive_count: entry.receive_count,
            });
            index += 1;
        }
        Ok(deliveries)
    }

    async fn delete(&self, receipt: &str) -> Result<bool, RearmError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|e| e.receipt.as_deref() != Some(receipt));
        Ok(entries.len() != before)
    }
}
