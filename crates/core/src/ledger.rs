//! Local consent ledger.
//!
//! Records consent-creation jobs this organisation initiated, bridging the gap between submitting
//! a consent request and the node confirming it. Entries are never mutated; whether a job is still
//! pending is decided by the reconciler from the node's event log, not stored here.

use crate::EhrResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ehr_types::{NonEmptyText, Urn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A consent request submitted to the node and not yet known to be complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentInTransit {
    pub job_id: String,
    pub subject: Urn,
    pub actor: Urn,
    pub custodian: Urn,
    pub proof_title: NonEmptyText,
    pub created_at: DateTime<Utc>,
}

impl ConsentInTransit {
    pub fn new(
        job_id: impl Into<String>,
        subject: Urn,
        actor: Urn,
        custodian: Urn,
        proof_title: NonEmptyText,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            subject,
            actor,
            custodian,
            proof_title,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// The job id was already present; the ledger is unchanged.
    Duplicate,
}

#[async_trait]
pub trait ConsentLedger: Send + Sync {
    /// Appends an entry. A second entry with an already recorded job id is ignored.
    async fn record(&self, entry: ConsentInTransit) -> EhrResult<RecordOutcome>;

    /// All entries for `subject` held by `custodian`, in insertion order, whether or not their job
    /// has completed.
    async fn pending_for(
        &self,
        subject: &Urn,
        custodian: &Urn,
    ) -> EhrResult<Vec<ConsentInTransit>>;
}

#[derive(Debug, Default)]
pub struct InMemoryConsentLedger {
    entries: RwLock<Vec<ConsentInTransit>>,
}

impl InMemoryConsentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ConsentLedger for InMemoryConsentLedger {
    async fn record(&self, entry: ConsentInTransit) -> EhrResult<RecordOutcome> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.iter().find(|e| e.job_id == entry.job_id) {
            if existing.subject != entry.subject
                || existing.actor != entry.actor
                || existing.custodian != entry.custodian
            {
                tracing::warn!(
                    "job {} already recorded for a different triple; keeping the first entry",
                    entry.job_id
                );
            } else {
                tracing::warn!("job {} already recorded; ignoring duplicate", entry.job_id);
            }
            return Ok(RecordOutcome::Duplicate);
        }
        tracing::debug!(
            "recording consent in transit: job={} actor={}",
            entry.job_id,
            entry.actor
        );
        entries.push(entry);
        Ok(RecordOutcome::Recorded)
    }

    async fn pending_for(
        &self,
        subject: &Urn,
        custodian: &Urn,
    ) -> EhrResult<Vec<ConsentInTransit>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.subject == subject && &e.custodian == custodian)
            .cloned()
            .collect())
    }
}
