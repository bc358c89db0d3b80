//! Linking users to vendor refresh tokens.
//!
//! A user who has not linked an account gets a four-digit register code in
//! their credential slot. The code doubles as the "pending" marker: it reads
//! back as no credential until a real token replaces it.

use rand::Rng;
use rearm_core::types::{CredentialRole, RefreshCredential};
use rearm_storage::EventStore;
use tracing::info;

use crate::error::RegistrationError;

#[derive(Clone)]
pub struct Registrar {
    store: EventStore,
    role: CredentialRole,
}

impl Registrar {
    pub fn new(store: EventStore, role: CredentialRole) -> Self {
        Self { store, role }
    }

    /// Store and return a fresh register code for the user.
    ///
    /// Any token already stored is replaced.
    pub async fn begin(&self, user_id: &str) -> Result<String, RegistrationError> {
        let code = format!("{:04}", rand::rng().random_range(0..10_000u32));
        self.store
            .put_credential(self.role, user_id, &RefreshCredential::new(code.as_str()))
            .await?;
        info!(user_id = %user_id, "Registration started");
        Ok(code)
    }

    /// Store a real refresh token for the user.
    pub async fn complete(&self, user_id: &str, token: &str) -> Result<(), RegistrationError> {
        let token = token.trim();
        let credential = RefreshCredential::new(token)
            .usable()
            .ok_or_else(|| {
                RegistrationError::InvalidToken(
                    "token must not be empty or a four-digit register code".to_string(),
                )
            })?;
        self.store
            .put_credential(self.role, user_id, &credential)
            .await?;
        info!(user_id = %user_id, "Refresh token registered");
        Ok(())
    }

    /// Whether the user has a usable token.
    pub async fn is_registered(&self, user_id: &str) -> Result<bool, RegistrationError> {
        Ok(self
            .store
            .get_credential(self.role, user_id)
            .await?
            .is_some())
    }

    /// Every user with a credential record, including pending ones.
    pub async fn list_user_ids(&self) -> Result<Vec<String>, RegistrationError> {
        Ok(self.store.credential_user_ids(self.role).await?)
    }
}
