//! Reconciled consent views.
//!
//! Each view merges the node's confirmed consents with what this service knows locally:
//!
//! - **given**: consents this organisation extended to others for one patient, plus ledger entries
//!   whose job has not completed yet, annotated as pending
//! - **received**: consents other custodians extended to this organisation for one patient
//! - **inbox**: patients this organisation may access but has no local record for
//! - **transactions**: every consent-request job on the node with the organisations it involves
//!
//! Organisation lookups fan out concurrently and never fail a view; an unresolvable identifier
//! becomes a placeholder. The `try_` methods propagate top-level node failures, the plain ones log
//! them and return an empty view.

use crate::constants::UNRESOLVED_ORGANISATION_PREFIX;
use crate::ledger::{ConsentInTransit, ConsentLedger};
use crate::patients::PatientStore;
use crate::{EhrError, EhrResult};
use ehr_types::Urn;
use futures_util::future::join_all;
use node_client::{ConsentQuery, ConsentRecord, NodeCapabilities, NodeError, Organisation};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// One row of the given or received view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConsentRecord {
    pub subject: Urn,
    pub actor: Urn,
    pub custodian: Urn,
    /// The counterparty: the actor in the given view, the custodian in the received view.
    pub organisation: Organisation,
    pub pending: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    pub bsn: String,
    pub subject: Urn,
    /// Custodian that granted the consent.
    pub organisation: Organisation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub job_id: String,
    pub status: String,
    pub organisations: Vec<Organisation>,
}

/// Placeholder shown in place of an organisation the registry could not resolve.
pub fn unresolved_organisation(identifier: &str, error: &NodeError) -> Organisation {
    Organisation {
        identifier: identifier.to_string(),
        name: format!("{UNRESOLVED_ORGANISATION_PREFIX}{error}"),
    }
}

pub struct ConsentReconciler {
    node: NodeCapabilities,
    ledger: Arc<dyn ConsentLedger>,
    patients: Arc<dyn PatientStore>,
    own_urn: Urn,
}

impl ConsentReconciler {
    pub fn new(
        node: NodeCapabilities,
        ledger: Arc<dyn ConsentLedger>,
        patients: Arc<dyn PatientStore>,
        own_urn: Urn,
    ) -> Self {
        Self {
            node,
            ledger,
            patients,
            own_urn,
        }
    }

    pub fn own_urn(&self) -> &Urn {
        &self.own_urn
    }

    /// Given view for `subject`: confirmed consents first, then still-pending ledger entries.
    pub async fn try_given(&self, subject: &Urn) -> EhrResult<Vec<EffectiveConsentRecord>> {
        let confirmed = self
            .node
            .consent_store
            .query(&ConsentQuery {
                subject: Some(subject.clone()),
                actor: None,
                custodian: Some(self.own_urn.clone()),
            })
            .await?
            .results;
        let in_transit = self.ledger.pending_for(subject, &self.own_urn).await?;
        let still_pending = self.still_pending(in_transit).await;

        let actors: Vec<&str> = confirmed
            .iter()
            .map(|r| r.actor.as_str())
            .chain(still_pending.iter().map(|e| e.actor.as_str()))
            .collect();
        let organisations = self.resolve_organisations(&actors).await;

        let confirmed_rows = confirmed.into_iter().map(|record| (record, false));
        let pending_rows = still_pending.into_iter().map(|entry| {
            let record = ConsentRecord {
                subject: entry.subject,
                actor: entry.actor,
                custodian: entry.custodian,
            };
            (record, true)
        });
        Ok(confirmed_rows
            .chain(pending_rows)
            .zip(organisations)
            .map(|((record, pending), organisation)| EffectiveConsentRecord {
                subject: record.subject,
                actor: record.actor,
                custodian: record.custodian,
                organisation,
                pending,
            })
            .collect())
    }

    pub async fn given(&self, subject: &Urn) -> Vec<EffectiveConsentRecord> {
        self.try_given(subject).await.unwrap_or_else(|e| {
            tracing::error!("given consents for {subject} unavailable: {e}");
            Vec::new()
        })
    }

    /// Received view for `subject`: consents granting this organisation access.
    pub async fn try_received(&self, subject: &Urn) -> EhrResult<Vec<EffectiveConsentRecord>> {
        let records = self
            .node
            .consent_store
            .query(&ConsentQuery {
                subject: Some(subject.clone()),
                actor: Some(self.own_urn.clone()),
                custodian: None,
            })
            .await?
            .results;
        let custodians: Vec<&str> = records.iter().map(|r| r.custodian.as_str()).collect();
        let organisations = self.resolve_organisations(&custodians).await;

        Ok(records
            .into_iter()
            .zip(organisations)
            .map(|(record, organisation)| EffectiveConsentRecord {
                subject: record.subject,
                actor: record.actor,
                custodian: record.custodian,
                organisation,
                pending: false,
            })
            .collect())
    }

    pub async fn received(&self, subject: &Urn) -> Vec<EffectiveConsentRecord> {
        self.try_received(subject).await.unwrap_or_else(|e| {
            tracing::error!("received consents for {subject} unavailable: {e}");
            Vec::new()
        })
    }

    /// Subjects this organisation was granted access to that have no local patient record.
    pub async fn try_inbox(&self) -> EhrResult<Vec<InboxEntry>> {
        let records = self
            .node
            .consent_store
            .query(&ConsentQuery {
                subject: None,
                actor: Some(self.own_urn.clone()),
                custodian: None,
            })
            .await?
            .results;

        let mut unclaimed = Vec::new();
        for record in records {
            let bsn = record.subject.local_id().to_string();
            match self.patients.by_bsn(&bsn).await {
                Ok(_) => {}
                Err(EhrError::PatientNotFound(_)) => unclaimed.push((bsn, record)),
                Err(e) => tracing::warn!("skipping inbox entry for {}: {e}", record.subject),
            }
        }

        let custodians: Vec<&str> = unclaimed
            .iter()
            .map(|(_, r)| r.custodian.as_str())
            .collect();
        let organisations = self.resolve_organisations(&custodians).await;

        Ok(unclaimed
            .into_iter()
            .zip(organisations)
            .map(|((bsn, record), organisation)| InboxEntry {
                bsn,
                subject: record.subject,
                organisation,
            })
            .collect())
    }

    pub async fn inbox(&self) -> Vec<InboxEntry> {
        self.try_inbox().await.unwrap_or_else(|e| {
            tracing::error!("inbox unavailable: {e}");
            Vec::new()
        })
    }

    /// Every job on the node, with its referenced organisations resolved and de-duplicated by name.
    pub async fn try_transactions(&self) -> EhrResult<Vec<Transaction>> {
        let events = self.node.events.list().await?;
        let resolved = join_all(events.iter().map(|event| {
            let refs: Vec<&str> = event.organisation_refs.iter().map(String::as_str).collect();
            async move { self.resolve_organisations(&refs).await }
        }))
        .await;

        Ok(events
            .into_iter()
            .zip(resolved)
            .map(|(event, organisations)| {
                let mut seen = HashSet::new();
                let organisations = organisations
                    .into_iter()
                    .filter(|o| seen.insert(o.name.clone()))
                    .collect();
                Transaction {
                    job_id: event.job_id,
                    status: event.name,
                    organisations,
                }
            })
            .collect())
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.try_transactions().await.unwrap_or_else(|e| {
            tracing::error!("transactions unavailable: {e}");
            Vec::new()
        })
    }

    /// Keeps ledger entries whose job has not reached the completion sentinel.
    ///
    /// An event that cannot be fetched keeps its entry pending; the node may simply not have
    /// published it yet.
    async fn still_pending(&self, entries: Vec<ConsentInTransit>) -> Vec<ConsentInTransit> {
        let statuses = join_all(
            entries
                .iter()
                .map(|entry| self.node.events.get(&entry.job_id)),
        )
        .await;

        entries
            .into_iter()
            .zip(statuses)
            .filter_map(|(entry, status)| match status {
                Ok(event) if event.is_completed() => None,
                Ok(_) => Some(entry),
                Err(e) => {
                    tracing::warn!("status of job {} unknown, keeping it pending: {e}", entry.job_id);
                    Some(entry)
                }
            })
            .collect()
    }

    /// Resolves every identifier concurrently, one output per input, in input order.
    async fn resolve_organisations(&self, identifiers: &[&str]) -> Vec<Organisation> {
        join_all(identifiers.iter().map(|id| async move {
            match self.node.registry.organisation_by_id(id).await {
                Ok(organisation) => organisation,
                Err(e) => {
                    tracing::warn!("could not resolve organisation {id}: {e}");
                    unresolved_organisation(id, &e)
                }
            }
        }))
        .await
    }
}
