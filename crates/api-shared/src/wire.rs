//! JSON request and response bodies.
//!
//! Field names match what the browser client and other organisations already speak, so several
//! types rename fields explicitly. Conversions from the core types live next to each type.

use ehr_core::{
    AccessAuditEntry, EffectiveConsentRecord, InboxEntry, Observation, Patient, Transaction,
};
use node_client::{ConsentJob, Organisation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrganisationRes {
    pub identifier: String,
    pub name: String,
}

impl From<Organisation> for OrganisationRes {
    fn from(o: Organisation) -> Self {
        Self {
            identifier: o.identifier,
            name: o.name,
        }
    }
}

/// One row of a given or received consent view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRowRes {
    pub subject: String,
    pub actor: String,
    pub custodian: String,
    pub organisation: OrganisationRes,
    /// True while the node has not completed the consent job.
    pub pending: bool,
}

impl From<EffectiveConsentRecord> for ConsentRowRes {
    fn from(r: EffectiveConsentRecord) -> Self {
        Self {
            subject: r.subject.to_string(),
            actor: r.actor.to_string(),
            custodian: r.custodian.to_string(),
            organisation: r.organisation.into(),
            pending: r.pending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntryRes {
    pub bsn: String,
    pub subject: String,
    pub organisation: OrganisationRes,
}

impl From<InboxEntry> for InboxEntryRes {
    fn from(e: InboxEntry) -> Self {
        Self {
            bsn: e.bsn,
            subject: e.subject.to_string(),
            organisation: e.organisation.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRes {
    pub job_id: String,
    pub status: String,
    pub organisations: Vec<OrganisationRes>,
}

impl From<Transaction> for TransactionRes {
    fn from(t: Transaction) -> Self {
        Self {
            job_id: t.job_id,
            status: t.status,
            organisations: t.organisations.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientRes {
    pub id: String,
    pub bsn: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl From<Patient> for PatientRes {
    fn from(p: Patient) -> Self {
        Self {
            id: p.id,
            bsn: p.bsn,
            first_name: p.first_name,
            last_name: p.last_name,
            birth_date: p.birth_date.map(|d| d.to_string()),
            gender: p.gender,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRes {
    pub id: String,
    pub patient_id: String,
    pub code: String,
    pub display: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective: Option<String>,
}

impl From<Observation> for ObservationRes {
    fn from(o: Observation) -> Self {
        Self {
            id: o.id,
            patient_id: o.patient_id,
            code: o.code,
            display: o.display,
            value: o.value,
            unit: o.unit,
            effective: o.effective.map(|d| d.to_string()),
        }
    }
}

/// Body of `GET /external-data-endpoint`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExternalDataRes {
    pub patient: PatientRes,
    pub observations: Vec<ObservationRes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntryRes {
    pub id: String,
    /// RFC 3339.
    pub timestamp: String,
    pub patient_id: String,
    pub actor: String,
    pub user: String,
}

impl From<AccessAuditEntry> for AccessLogEntryRes {
    fn from(e: AccessAuditEntry) -> Self {
        Self {
            id: e.id.to_string(),
            timestamp: e.timestamp.to_rfc3339(),
            patient_id: e.patient_id,
            actor: e.actor,
            user: e.user,
        }
    }
}

/// Body of `PUT /api/consent/{patient_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateConsentReq {
    #[serde(rename = "organisationURN")]
    pub organisation_urn: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateConsentRes {
    pub job_id: String,
    pub result_code: String,
}

impl From<ConsentJob> for CreateConsentRes {
    fn from(job: ConsentJob) -> Self {
        Self {
            job_id: job.job_id,
            result_code: job.result_code,
        }
    }
}

/// Event delivered by the node's notification webhook.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotifyEventReq {
    /// Bus subject, e.g. `nuts.consent.bridge.consentRequest`.
    pub subject: String,
    /// Event body. Only logged; views are recomputed from the node.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub event: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotifyEventRes {
    /// Whether the subject matched and the views were recomputed.
    pub refreshed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrganisationSearchQuery {
    pub query: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogQuery {
    pub patient_id: String,
}

/// Frames a push client sends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientFrame {
    Subscribe {
        #[serde(rename = "patientId")]
        patient_id: String,
    },
    Get {
        topic: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_consent_req_uses_client_field_names() {
        let req: CreateConsentReq = serde_json::from_str(
            r#"{"organisationURN":"urn:oid:2.16.840.1.113883.2.4.6.1:00000001","reason":"treatment"}"#,
        )
        .expect("valid body");
        assert_eq!(
            req.organisation_urn,
            "urn:oid:2.16.840.1.113883.2.4.6.1:00000001"
        );
    }

    #[test]
    fn test_client_frames_are_tagged_by_action() {
        let subscribe: ClientFrame =
            serde_json::from_str(r#"{"action":"subscribe","patientId":"1"}"#).unwrap();
        assert_eq!(
            subscribe,
            ClientFrame::Subscribe {
                patient_id: "1".into()
            }
        );
        let get: ClientFrame = serde_json::from_str(r#"{"action":"get","topic":"inbox"}"#).unwrap();
        assert_eq!(get, ClientFrame::Get { topic: "inbox".into() });
        assert!(serde_json::from_str::<ClientFrame>(r#"{"action":"dance"}"#).is_err());
    }

    #[test]
    fn test_consent_row_matches_push_shape() {
        use ehr_types::Urn;
        let record = EffectiveConsentRecord {
            subject: Urn::for_bsn("999999990").unwrap(),
            actor: Urn::for_agb("00000001").unwrap(),
            custodian: Urn::for_agb("00000007").unwrap(),
            organisation: Organisation {
                identifier: "urn:oid:2.16.840.1.113883.2.4.6.1:00000001".into(),
                name: "Huisartsenpraktijk A".into(),
            },
            pending: true,
        };
        let pushed = serde_json::to_value(&record).unwrap();
        let served = serde_json::to_value(ConsentRowRes::from(record)).unwrap();
        assert_eq!(pushed, served);
    }
}
