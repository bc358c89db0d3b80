//! Alarm device capability and the vendor client seams behind it.
//!
//! The reconciler only sees [`Actuator`]: read the mode, apply a mode. The
//! vendor client is modelled by [`SessionFactory`], [`AlarmSession`] and
//! [`AlarmLocation`], which mirror what a hosted alarm API exposes.

pub mod cache;
pub mod connector;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use rearm_core::types::{Mode, RefreshCredential};
use tracing::debug;

use crate::error::ActuatorError;

pub use cache::ConnectionCache;
pub use connector::{ActuatorConnector, ActuatorProvider};
pub use simulated::{SimulatedAlarm, SimulatedVendor};

/// Device capability driven by the reconciler.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn get_state(&self) -> Result<Mode, ActuatorError>;

    async fn apply_state(&self, target: Mode) -> Result<(), ActuatorError>;
}

/// One alarm unit as exposed by the vendor.
#[async_trait]
pub trait AlarmLocation: Send + Sync {
    fn location_id(&self) -> &str;

    /// Raw vendor mode: `all`, `some` or `none`.
    async fn alarm_mode(&self) -> Result<String, ActuatorError>;

    async fn arm_home(&self) -> Result<(), ActuatorError>;

    async fn arm_away(&self) -> Result<(), ActuatorError>;

    async fn disarm(&self) -> Result<(), ActuatorError>;
}

/// An authenticated vendor session.
#[async_trait]
pub trait AlarmSession: Send + Sync {
    async fn locations(&self) -> Result<Vec<Arc<dyn AlarmLocation>>, ActuatorError>;
}

/// Notified whenever the vendor issues a new refresh token.
///
/// The session waits for the listener before carrying on, so a token is never
/// used before it has been stored.
#[async_trait]
pub trait TokenRotationListener: Send + Sync {
    async fn token_rotated(&self, new_token: &str) -> Result<(), ActuatorError>;
}

/// Opens vendor sessions from a stored refresh token.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        user_id: &str,
        credential: &RefreshCredential,
        control_center_name: &str,
        on_rotate: Arc<dyn TokenRotationListener>,
    ) -> Result<Arc<dyn AlarmSession>, ActuatorError>;
}

/// Map a raw vendor mode onto [`Mode`].
pub fn map_raw_mode(raw: &str) -> Result<Mode, ActuatorError> {
    match raw {
        "all" => Ok(Mode::Away),
        "some" => Ok(Mode::Home),
        "none" => Ok(Mode::Disarmed),
        other => Err(ActuatorError::UnknownMode(other.to_string())),
    }
}

/// Raw vendor mode for a [`Mode`].
pub fn raw_mode(mode: Mode) -> &'static str {
    match mode {
        Mode::Away => "all",
        Mode::Home => "some",
        Mode::Disarmed => "none",
    }
}

/// [`Actuator`] backed by a single vendor location.
pub struct LocationActuator {
    location: Arc<dyn AlarmLocation>,
}

impl LocationActuator {
    pub fn new(location: Arc<dyn AlarmLocation>) -> Self {
        Self { location }
    }
}

#[async_trait]
impl Actuator for LocationActuator {
    async fn get_state(&self) -> Result<Mode, ActuatorError> {
        let raw = self.location.alarm_mode().await?;
        map_raw_mode(&raw)
    }

    async fn apply_state(&self, target: Mode) -> Result<(), ActuatorError> {
        debug!(location = %self.location.location_id(), mode = %target, "Applying alarm mode");
        match target {
            Mode::Home => self.location.arm_home().await,
            Mode::Away => self.location.arm_away().await,
            Mode::Disarmed => self.location.disarm().await,
        }
    }
}
