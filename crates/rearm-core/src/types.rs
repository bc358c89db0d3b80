use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RearmError;

// =============================================================================
// Enums
// =============================================================================

/// Security mode of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Disarmed,
    Home,
    Away,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Disarmed => write!(f, "disarmed"),
            Mode::Home => write!(f, "home"),
            Mode::Away => write!(f, "away"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disarmed" => Ok(Mode::Disarmed),
            "home" => Ok(Mode::Home),
            "away" => Ok(Mode::Away),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

/// Lifecycle of a scheduled event. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Processing,
    Processed,
}

impl EventStatus {
    /// Whether a delivery arriving in this status has already been claimed.
    pub fn is_claimed(&self) -> bool {
        matches!(self, EventStatus::Processing | EventStatus::Processed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Scheduled => write!(f, "scheduled"),
            EventStatus::Processing => write!(f, "processing"),
            EventStatus::Processed => write!(f, "processed"),
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(EventStatus::Scheduled),
            "processing" => Ok(EventStatus::Processing),
            "processed" => Ok(EventStatus::Processed),
            _ => Err(format!("Unknown event status: {}", s)),
        }
    }
}

/// Which actuator session a refresh credential belongs to.
///
/// The interactive skill and the background listener each hold their own
/// session, so each rotates its own token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRole {
    Skill,
    Listener,
}

/// Logical tables of the record store. All share the `user_id -> value` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Events,
    Credentials(CredentialRole),
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Events => "events",
            Table::Credentials(CredentialRole::Skill) => "credentials_skill",
            Table::Credentials(CredentialRole::Listener) => "credentials_listener",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Records
// =============================================================================

/// The latest scheduling decision for a user.
///
/// Overwritten on every new decision; an older delivery carrying a different
/// `event_id` is stale by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub event_id: String,
    pub target_mode: Mode,
    pub delay_seconds: u32,
    pub status: EventStatus,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledEvent {
    /// A fresh `scheduled` event with a newly generated id.
    pub fn new(target_mode: Mode, delay_seconds: u32) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            target_mode,
            delay_seconds,
            status: EventStatus::Scheduled,
            updated_at: Utc::now(),
        }
    }
}

/// Refresh token for one actuator session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshCredential {
    pub token: String,
}

impl RefreshCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// A four-digit numeric token is a register code handed out while the
    /// user has not linked a real account yet.
    pub fn is_pending_registration(&self) -> bool {
        self.token.len() == 4 && self.token.bytes().all(|b| b.is_ascii_digit())
    }

    /// Returns the credential only if it is a real token.
    pub fn usable(self) -> Option<Self> {
        if self.is_pending_registration() || self.token.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

// =============================================================================
// Delayed messages
// =============================================================================

pub const ATTR_USER_ID: &str = "userId";
pub const ATTR_EVENT_ID: &str = "eventId";
pub const ATTR_MODE_OVERRIDE: &str = "modeOverride";

/// A message travelling through the delay queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedMessage {
    pub user_id: String,
    pub event_id: String,
    /// Forces this mode without consulting the event store.
    pub mode_override: Option<Mode>,
    /// Opaque correlation id of the request that produced the message.
    pub body: String,
}

impl DelayedMessage {
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        attrs.insert(ATTR_USER_ID.to_string(), self.user_id.clone());
        attrs.insert(ATTR_EVENT_ID.to_string(), self.event_id.clone());
        if let Some(mode) = self.mode_override {
            attrs.insert(ATTR_MODE_OVERRIDE.to_string(), mode.to_string());
        }
        attrs
    }

    /// Rebuild a message from wire attributes.
    ///
    /// `userId` and `eventId` are required; an unknown `modeOverride` value
    /// is rejected rather than silently dropped.
    pub fn from_attributes(
        attrs: &BTreeMap<String, String>,
        body: impl Into<String>,
    ) -> Result<Self, RearmError> {
        let required = |key: &str| {
            attrs
                .get(key)
                .cloned()
                .ok_or_else(|| RearmError::Queue(format!("missing message attribute {}", key)))
        };
        let mode_override = match attrs.get(ATTR_MODE_OVERRIDE) {
            Some(raw) => Some(raw.parse::<Mode>().map_err(RearmError::Queue)?),
            None => None,
        };
        Ok(Self {
            user_id: required(ATTR_USER_ID)?,
            event_id: required(ATTR_EVENT_ID)?,
            mode_override,
            body: body.into(),
        })
    }
}
