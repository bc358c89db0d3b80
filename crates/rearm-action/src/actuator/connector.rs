//! Builds and caches per-user actuator connections.

use std::sync::Arc;

use async_trait::async_trait;
use rearm_core::types::{CredentialRole, RefreshCredential};
use rearm_storage::EventStore;
use tracing::{debug, info};

use super::{
    Actuator, ConnectionCache, LocationActuator, SessionFactory, TokenRotationListener,
};
use crate::error::ActuatorError;

/// Source of ready-to-use actuators.
#[async_trait]
pub trait ActuatorProvider: Send + Sync {
    async fn actuator_for(&self, user_id: &str) -> Result<Arc<dyn Actuator>, ActuatorError>;

    /// Forget the user's connection so the next call rebuilds it.
    fn reset(&self, user_id: &str) -> bool;
}

/// Writes rotated refresh tokens back to the credential store.
struct CredentialWriter {
    store: EventStore,
    role: CredentialRole,
    user_id: String,
}

#[async_trait]
impl TokenRotationListener for CredentialWriter {
    async fn token_rotated(&self, new_token: &str) -> Result<(), ActuatorError> {
        self.store
            .put_credential(self.role, &self.user_id, &RefreshCredential::new(new_token))
            .await?;
        info!(user_id = %self.user_id, "Refresh token rotated");
        Ok(())
    }
}

/// Lazily opens one vendor session per user from the stored refresh token.
pub struct ActuatorConnector {
    store: EventStore,
    role: CredentialRole,
    factory: Arc<dyn SessionFactory>,
    cache: Arc<ConnectionCache>,
    control_center_name: String,
}

impl ActuatorConnector {
    pub fn new(
        store: EventStore,
        role: CredentialRole,
        factory: Arc<dyn SessionFactory>,
        cache: Arc<ConnectionCache>,
        control_center_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            role,
            factory,
            cache,
            control_center_name: control_center_name.into(),
        }
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    async fn connect(&self, user_id: &str) -> Result<Arc<dyn Actuator>, ActuatorError> {
        let credential = self
            .store
            .get_credential(self.role, user_id)
            .await?
            .ok_or_else(|| ActuatorError::CredentialMissing(user_id.to_string()))?;

        let listener = Arc::new(CredentialWriter {
            store: self.store.clone(),
            role: self.role,
            user_id: user_id.to_string(),
        });
        let session = self
            .factory
            .open(user_id, &credential, &self.control_center_name, listener)
            .await?;

        // One alarm unit per user; extra locations are ignored.
        let location = session
            .locations()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ActuatorError::NoLocation(user_id.to_string()))?;
        debug!(user_id = %user_id, location = %location.location_id(), "Actuator connected");

        Ok(Arc::new(LocationActuator::new(location)))
    }
}

#[async_trait]
impl ActuatorProvider for ActuatorConnector {
    async fn actuator_for(&self, user_id: &str) -> Result<Arc<dyn Actuator>, ActuatorError> {
        if let Some(actuator) = self.cache.get(user_id) {
            return Ok(actuator);
        }
        let actuator = self.connect(user_id).await?;
        self.cache.set(user_id, actuator.clone());
        Ok(actuator)
    }

    fn reset(&self, user_id: &str) -> bool {
        self.cache.clear(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SimulatedVendor;
    use rearm_core::types::Mode;
    use rearm_storage::MemoryRecordStore;

    struct Fixture {
        store: EventStore,
        vendor: Arc<SimulatedVendor>,
        connector: ActuatorConnector,
    }

    fn fixture() -> Fixture {
        let store = EventStore::new(Arc::new(MemoryRecordStore::new()));
        let vendor = Arc::new(SimulatedVendor::new(Mode::Away));
        let connector = ActuatorConnector::new(
            store.clone(),
            CredentialRole::Listener,
            vendor.clone(),
            Arc::new(ConnectionCache::new()),
            "Rearm Listener",
        );
        Fixture {
            store,
            vendor,
            connector,
        }
    }

    async fn register(store: &EventStore, token: &str) {
        store
            .put_credential(CredentialRole::Listener, "u1", &RefreshCredential::new(token))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let f = fixture();
        let err = f.connector.actuator_for("u1").await.err().unwrap();
        assert!(matches!(err, ActuatorError::CredentialMissing(ref u) if u == "u1"));
    }

    #[tokio::test]
    async fn test_register_code_counts_as_missing() {
        let f = fixture();
        register(&f.store, "4821").await;
        assert!(matches!(
            f.connector.actuator_for("u1").await,
            Err(ActuatorError::CredentialMissing(_))
        ));
        assert!(f.vendor.sessions_opened().is_empty());
    }

    #[tokio::test]
    async fn test_connection_is_cached() {
        let f = fixture();
        register(&f.store, "rt-1").await;

        let a = f.connector.actuator_for("u1").await.unwrap();
        let b = f.connector.actuator_for("u1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(f.vendor.sessions_opened().len(), 1);
        assert_eq!(a.get_state().await.unwrap(), Mode::Away);
    }

    #[tokio::test]
    async fn test_rotation_persists_and_rebuild_uses_new_token() {
        let f = fixture();
        register(&f.store, "rt-1").await;
        f.vendor.rotate_on_next_open("u1", "rt-2");

        f.connector.actuator_for("u1").await.unwrap();
        let stored = f
            .store
            .get_credential(CredentialRole::Listener, "u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.token, "rt-2");

        assert!(f.connector.reset("u1"));
        f.connector.actuator_for("u1").await.unwrap();

        let opened = f.vendor.sessions_opened();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[0].1, "rt-1");
        assert_eq!(opened[1].1, "rt-2");
    }

    #[tokio::test]
    async fn test_reset_without_connection() {
        let f = fixture();
        assert!(!f.connector.reset("u1"));
    }
}
