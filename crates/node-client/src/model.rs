//! Capability-level request and response shapes.
//!
//! These are the shapes the rest of the workspace works with. Where the node's wire format differs
//! (field names, status strings), the HTTP client converts at the boundary.

use ehr_types::{NonEmptyText, Urn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result code the consent logic returns for an accepted job.
pub const RESULT_CODE_OK: &str = "OK";

/// Outcome of token introspection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Introspection {
    pub active: bool,
    /// Patient the token was issued for (`sid`).
    #[serde(rename = "sid", default)]
    pub subject_id: Option<String>,
    /// Organisation the token was issued to (`sub`).
    #[serde(rename = "sub", default)]
    pub organisation_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Introspection {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Outcome of validating a signed identity contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContractValidation {
    pub valid: bool,
    pub signer_attributes: BTreeMap<String, String>,
}

impl ContractValidation {
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Human-readable name of the signer, assembled from the attributes identity schemes use.
    pub fn signer_name(&self) -> Option<String> {
        let attrs = &self.signer_attributes;
        if let Some(full) = attrs.get("name") {
            return Some(full.clone());
        }
        let parts: Vec<&str> = ["initials", "prefix", "familyname"]
            .iter()
            .filter_map(|key| {
                attrs
                    .iter()
                    .find(|(k, _)| k.to_ascii_lowercase().ends_with(key))
                    .map(|(_, v)| v.as_str())
            })
            .filter(|v| !v.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Triple filter for consent queries. `None` widens the match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConsentQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Urn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Urn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custodian: Option<Urn>,
}

impl ConsentQuery {
    /// Returns true when `record` falls inside this filter.
    pub fn matches(&self, record: &ConsentRecord) -> bool {
        self.subject.as_ref().map_or(true, |s| *s == record.subject)
            && self.actor.as_ref().map_or(true, |a| *a == record.actor)
            && self
                .custodian
                .as_ref()
                .map_or(true, |c| *c == record.custodian)
    }
}

/// A confirmed consent held by the external consent store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub subject: Urn,
    pub actor: Urn,
    pub custodian: Urn,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentQueryResult {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub results: Vec<ConsentRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentAnswer {
    Yes,
    No,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentCheck {
    pub consent_given: ConsentAnswer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limitations: Option<String>,
}

impl ConsentCheck {
    pub fn is_given(&self) -> bool {
        self.consent_given == ConsentAnswer::Yes
    }
}

/// Request to register a new consent at the consent logic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateConsent {
    pub subject: Urn,
    pub actor: Urn,
    pub custodian: Urn,
    /// Legal basis shown to people reviewing the consent.
    pub reason: NonEmptyText,
}

/// Job handle for an accepted consent request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentJob {
    pub job_id: String,
    pub result_code: String,
}

impl ConsentJob {
    pub fn is_ok(&self) -> bool {
        self.result_code == RESULT_CODE_OK
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    pub identifier: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub identifier: String,
    #[serde(default)]
    pub organization: String,
    pub endpoint_type: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urn(s: &str) -> Urn {
        Urn::parse(s).unwrap()
    }

    #[test]
    fn introspection_reads_sid_and_sub() {
        let i: Introspection = serde_json::from_str(
            r#"{"active":true,"sid":"urn:oid:2.16.840.1.113883.2.4.6.3:999999990","sub":"urn:org:A","name":"Dr. Who","iss":"x"}"#,
        )
        .unwrap();
        assert!(i.active);
        assert_eq!(i.organisation_id.as_deref(), Some("urn:org:A"));
        assert_eq!(
            i.subject_id.as_deref(),
            Some("urn:oid:2.16.840.1.113883.2.4.6.3:999999990")
        );
    }

    #[test]
    fn inactive_introspection_has_no_claims() {
        let i: Introspection = serde_json::from_str(r#"{"active":false}"#).unwrap();
        assert_eq!(i, Introspection::inactive());
    }

    #[test]
    fn unknown_consent_answer_is_not_given() {
        let c: ConsentCheck = serde_json::from_str(r#"{"consentGiven":"maybe"}"#).unwrap();
        assert_eq!(c.consent_given, ConsentAnswer::Unknown);
        assert!(!c.is_given());
        let c: ConsentCheck = serde_json::from_str(r#"{"consentGiven":"yes"}"#).unwrap();
        assert!(c.is_given());
    }

    #[test]
    fn query_omitted_fields_widen_the_match() {
        let record = ConsentRecord {
            subject: urn("urn:p:1"),
            actor: urn("urn:org:A"),
            custodian: urn("urn:org:self"),
        };
        let q = ConsentQuery {
            actor: Some(urn("urn:org:A")),
            ..Default::default()
        };
        assert!(q.matches(&record));
        let q = ConsentQuery {
            actor: Some(urn("urn:org:B")),
            ..Default::default()
        };
        assert!(!q.matches(&record));
    }

    #[test]
    fn query_serialises_only_present_fields() {
        let q = ConsentQuery {
            custodian: Some(urn("urn:org:self")),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&q).unwrap(),
            r#"{"custodian":"urn:org:self"}"#
        );
    }

    #[test]
    fn signer_name_prefers_full_name_then_parts() {
        let mut v = ContractValidation {
            valid: true,
            signer_attributes: BTreeMap::new(),
        };
        assert_eq!(v.signer_name(), None);
        v.signer_attributes
            .insert("gemeente.personalData.initials".into(), "T.".into());
        v.signer_attributes
            .insert("gemeente.personalData.familyname".into(), "Tester".into());
        assert_eq!(v.signer_name().as_deref(), Some("T. Tester"));
        v.signer_attributes.insert("name".into(), "Tess Tester".into());
        assert_eq!(v.signer_name().as_deref(), Some("Tess Tester"));
    }
}
