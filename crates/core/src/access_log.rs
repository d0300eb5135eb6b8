//! Audit trail of clinical data released to other organisations.
//!
//! An entry is written by the authorization gate as the last step before data leaves the
//! service. Entries are immutable. The in-memory log announces each stored entry on a broadcast
//! channel so live views can refresh.

use crate::EhrResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

const STORED_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub patient_id: String,
    /// Organisation the data was released to.
    pub actor: String,
    /// Person asserted by the token or identity contract.
    pub user: String,
}

impl AccessAuditEntry {
    pub fn new(
        patient_id: impl Into<String>,
        actor: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            patient_id: patient_id.into(),
            actor: actor.into(),
            user: user.into(),
        }
    }
}

#[async_trait]
pub trait AccessLog: Send + Sync {
    async fn store(&self, entry: AccessAuditEntry) -> EhrResult<()>;

    async fn by_patient_id(&self, patient_id: &str) -> EhrResult<Vec<AccessAuditEntry>>;
}

#[derive(Debug)]
pub struct InMemoryAccessLog {
    entries: RwLock<Vec<AccessAuditEntry>>,
    stored: broadcast::Sender<AccessAuditEntry>,
}

impl Default for InMemoryAccessLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAccessLog {
    pub fn new() -> Self {
        let (stored, _) = broadcast::channel(STORED_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(Vec::new()),
            stored,
        }
    }

    /// Receives every entry stored after this call.
    pub fn subscribe_stored(&self) -> broadcast::Receiver<AccessAuditEntry> {
        self.stored.subscribe()
    }
}

#[async_trait]
impl AccessLog for InMemoryAccessLog {
    async fn store(&self, entry: AccessAuditEntry) -> EhrResult<()> {
        self.entries.write().await.push(entry.clone());
        // No receivers is fine; nobody is watching.
        let _ = self.stored.send(entry);
        Ok(())
    }

    async fn by_patient_id(&self, patient_id: &str) -> EhrResult<Vec<AccessAuditEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.patient_id == patient_id)
            .cloned()
            .collect())
    }
}
