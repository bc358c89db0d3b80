//! Rearm storage crate - SQLite persistence and the delay queue.
//!
//! Provides a WAL-mode SQLite database with migrations, the `user_id -> value`
//! record store backing scheduled events and refresh credentials, and a
//! durable delay queue with visibility timeouts and dead-lettering. In-memory
//! implementations of both traits are included for tests and single-process
//! runs.

pub mod db;
pub mod event_store;
pub mod migrations;
pub mod queue;
pub mod records;

pub use db::Database;
pub use event_store::EventStore;
pub use queue::{DeadLetter, DelayQueue, Delivery, MemoryDelayQueue, QueueSettings, SqliteDelayQueue};
pub use records::{MemoryRecordStore, Record, RecordStore, SqliteRecordStore};
