//! Typed access to scheduled events and refresh credentials.

use std::sync::Arc;

use rearm_core::error::RearmError;
use rearm_core::types::{CredentialRole, RefreshCredential, ScheduledEvent, Table};

use crate::records::RecordStore;

/// Typed facade over a [`RecordStore`].
#[derive(Clone)]
pub struct EventStore {
    records: Arc<dyn RecordStore>,
}

impl EventStore {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    /// Latest scheduled event for a user, if any.
    pub async fn get_event(&self, user_id: &str) -> Result<Option<ScheduledEvent>, RearmError> {
        match self.records.get(Table::Events, user_id).await? {
            Some(record) => Ok(Some(serde_json::from_value(record.value)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the user's event. Stamps `updated_at`.
    pub async fn put_event(&self, user_id: &str, event: &ScheduledEvent) -> Result<(), RearmError> {
        let mut event = event.clone();
        event.updated_at = chrono::Utc::now();
        self.records
            .put(Table::Events, user_id, serde_json::to_value(&event)?)
            .await
    }

    /// The user's refresh credential for `role`.
    ///
    /// A pending register code reads as `None`, same as no record at all.
    pub async fn get_credential(
        &self,
        role: CredentialRole,
        user_id: &str,
    ) -> Result<Option<RefreshCredential>, RearmError> {
        match self.records.get(Table::Credentials(role), user_id).await? {
            Some(record) => {
                let credential: RefreshCredential = serde_json::from_value(record.value)?;
                Ok(credential.usable())
            }
            None => Ok(None),
        }
    }

    pub async fn put_credential(
        &self,
        role: CredentialRole,
        user_id: &str,
        credential: &RefreshCredential,
    ) -> Result<(), RearmError> {
        self.records
            .put(
                Table::Credentials(role),
                user_id,
                serde_json::to_value(credential)?,
            )
            .await
    }

    /// Users holding any record in the credential slot for `role`.
    pub async fn credential_user_ids(&self, role: CredentialRole) -> Result<Vec<String>, RearmError> {
        self.records.keys(Table::Credentials(role)).await
    }
}
