//! Consent-request events published by the node's event store.
//!
//! The node embeds the job state in a `payload` that is either a base64 string holding JSON or,
//! when relayed through the event bus, the JSON document itself. Payloads come in three shapes
//! depending on how far the job has progressed:
//!
//! - a single `legalEntity`
//! - a list of `legalEntities`
//! - `consentRecords`, each listing the organisations involved under
//!   `metadata.organisationSecureKeys[].legalEntity`
//!
//! All three are normalised into [`ExternalConsentEvent::organisation_refs`] when the event is
//! decoded, so nothing downstream needs to know which shape arrived.

use crate::error::{NodeError, NodeResult};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Event name the node uses once a consent-request job has finished.
pub const COMPLETED_EVENT_NAME: &str = "completed";

/// A decoded consent-request event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalConsentEvent {
    pub job_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator_legal_entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Organisations referenced by this event, in payload order.
    pub organisation_refs: Vec<String>,
    pub payload: serde_json::Value,
}

impl ExternalConsentEvent {
    pub fn is_completed(&self) -> bool {
        self.name == COMPLETED_EVENT_NAME
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(alias = "uuid")]
    job_id: String,
    name: String,
    #[serde(default)]
    initiator_legal_entity: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadShape {
    ConsentRecords {
        #[serde(rename = "consentRecords")]
        consent_records: Vec<WireConsentRecord>,
    },
    LegalEntities {
        #[serde(rename = "legalEntities")]
        legal_entities: Vec<String>,
    },
    LegalEntity {
        #[serde(rename = "legalEntity")]
        legal_entity: String,
    },
    Other(serde_json::Value),
}

#[derive(Deserialize)]
struct WireConsentRecord {
    #[serde(default)]
    metadata: Option<WireRecordMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecordMetadata {
    #[serde(default)]
    organisation_secure_keys: Vec<WireSecureKey>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSecureKey {
    legal_entity: String,
}

impl PayloadShape {
    fn into_refs(self) -> Vec<String> {
        match self {
            PayloadShape::ConsentRecords { consent_records } => consent_records
                .into_iter()
                .filter_map(|r| r.metadata)
                .flat_map(|m| m.organisation_secure_keys)
                .map(|k| k.legal_entity)
                .collect(),
            PayloadShape::LegalEntities { legal_entities } => legal_entities,
            PayloadShape::LegalEntity { legal_entity } => vec![legal_entity],
            PayloadShape::Other(_) => Vec::new(),
        }
    }
}

/// Decodes one event as delivered by the event store or the event bus.
///
/// # Errors
///
/// Returns [`NodeError::Decode`] when the event lacks required fields or its payload is not valid
/// base64/JSON. Callers processing a batch should drop only the offending event.
pub fn decode_event(raw: serde_json::Value) -> NodeResult<ExternalConsentEvent> {
    let wire: WireEvent =
        serde_json::from_value(raw).map_err(|e| NodeError::Decode(format!("event: {e}")))?;

    let payload = match wire.payload {
        None | Some(serde_json::Value::Null) => serde_json::Value::Null,
        Some(serde_json::Value::String(encoded)) => decode_payload_string(&encoded)
            .map_err(|e| NodeError::Decode(format!("payload of job {}: {e}", wire.job_id)))?,
        Some(structured) => structured,
    };

    let mut organisation_refs = match &payload {
        serde_json::Value::Null => Vec::new(),
        value => serde_json::from_value::<PayloadShape>(value.clone())
            .map(PayloadShape::into_refs)
            .unwrap_or_default(),
    };
    if organisation_refs.is_empty() {
        if let Some(initiator) = &wire.initiator_legal_entity {
            organisation_refs.push(initiator.clone());
        }
    }

    Ok(ExternalConsentEvent {
        job_id: wire.job_id,
        name: wire.name,
        initiator_legal_entity: wire.initiator_legal_entity,
        error: wire.error,
        organisation_refs,
        payload,
    })
}

/// Decodes an event list, skipping events that fail to decode.
pub fn decode_event_list(raw: Vec<serde_json::Value>) -> Vec<ExternalConsentEvent> {
    raw.into_iter()
        .filter_map(|value| match decode_event(value) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("skipping undecodable consent event: {}", e);
                None
            }
        })
        .collect()
}

fn decode_payload_string(encoded: &str) -> Result<serde_json::Value, String> {
    let trimmed = encoded.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).map_err(|e| e.to_string());
    }
    let bytes = general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|e| format!("base64: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("json: {e}"))
}
