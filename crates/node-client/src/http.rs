//! HTTP implementation of the node capabilities.
//!
//! Every call shares one `reqwest::Client` configured with a request timeout, so a hanging node
//! surfaces as [`NodeError::Timeout`] instead of stalling the caller.

use crate::error::{NodeError, NodeResult};
use crate::events::{decode_event, decode_event_list, ExternalConsentEvent};
use crate::model::{
    ConsentCheck, ConsentJob, ConsentQuery, ConsentQueryResult, ContractValidation, CreateConsent,
    Endpoint, Introspection, Organisation,
};
use crate::{AuthApi, ConsentLogicApi, ConsentStoreApi, EventStoreApi, RegistryApi};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ehr_types::Urn;
use reqwest::{header::ACCEPT, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const INTROSPECT_PATH: &str = "/auth/accesstoken/introspect";
const VALIDATE_CONTRACT_PATH: &str = "/auth/contract/validate";
const CONSENT_QUERY_PATH: &str = "/consent/query";
const CONSENT_CHECK_PATH: &str = "/consent/check";
const CONSENT_CREATE_PATH: &str = "/api/consent";
const EVENTS_PATH: &str = "/events";
const ORGANISATION_PATH: &str = "/api/organization";
const ORGANISATIONS_PATH: &str = "/api/organizations";
const ENDPOINTS_PATH: &str = "/api/endpoints";

/// Data class attached to every consent this application requests.
pub const MEDICAL_DATA_CLASS: &str = "urn:oid:1.3.6.1.4.1.54851.1:MEDICAL";

/// Contract format sent along with identity contracts.
const CONTRACT_FORMAT: &str = "irma";

#[derive(Clone, Debug)]
pub struct NodeClient {
    http: reqwest::Client,
    base_url: String,
}

impl NodeClient {
    /// Creates a client for the node at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Config`] if the URL is empty or the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> NodeResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(NodeError::Config("node base URL cannot be empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Config(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `path` followed by `id` as one percent-encoded segment.
    fn url_with_id(&self, path: &str, id: &str) -> NodeResult<Url> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| NodeError::Config(format!("invalid node URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| NodeError::Config(format!("node URL cannot take a path: {}", self.base_url)))?
            .push(id);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> NodeResult<T> {
        let response = request.header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(NodeError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireContractRequest<'a> {
    contract_format: &'static str,
    contract_string: &'a str,
}

#[derive(Deserialize)]
struct WireContractResponse {
    validation_result: String,
    #[serde(default)]
    signer_attributes: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct WireConsentCheck<'a> {
    subject: &'a Urn,
    actor: &'a Urn,
    custodian: &'a Urn,
    #[serde(rename = "dataClass")]
    data_class: &'static str,
}

#[derive(Serialize)]
struct WireConsentRequest<'a> {
    custodian: &'a Urn,
    actor: &'a Urn,
    subject: &'a Urn,
    records: Vec<WireConsentProofRecord<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireConsentProofRecord<'a> {
    period: WirePeriod,
    consent_proof: WireConsentProof<'a>,
    data_class: Vec<&'static str>,
}

#[derive(Serialize)]
struct WirePeriod {
    start: DateTime<Utc>,
}

#[derive(Serialize)]
struct WireConsentProof<'a> {
    #[serde(rename = "ID")]
    id: String,
    title: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireEventList {
    Wrapped {
        #[serde(default)]
        events: Vec<serde_json::Value>,
    },
    Bare(Vec<serde_json::Value>),
}

#[async_trait]
impl AuthApi for NodeClient {
    async fn introspect(&self, token: &str) -> NodeResult<Introspection> {
        let request = self
            .http
            .post(self.url(INTROSPECT_PATH))
            .form(&[("token", token)]);
        match self.send_json::<Introspection>(request).await {
            Ok(introspection) => Ok(introspection),
            Err(NodeError::Status { status, .. }) => {
                tracing::debug!("introspection rejected with status {}", status);
                Ok(Introspection::inactive())
            }
            Err(NodeError::NotFound(_)) => Ok(Introspection::inactive()),
            Err(e) => Err(e),
        }
    }

    async fn validate_identity_contract(&self, contract: &str) -> NodeResult<ContractValidation> {
        let request = self
            .http
            .post(self.url(VALIDATE_CONTRACT_PATH))
            .json(&WireContractRequest {
                contract_format: CONTRACT_FORMAT,
                contract_string: contract,
            });
        match self.send_json::<WireContractResponse>(request).await {
            Ok(wire) => Ok(ContractValidation {
                valid: wire.validation_result.eq_ignore_ascii_case("valid"),
                signer_attributes: wire.signer_attributes,
            }),
            Err(NodeError::Status { status, .. }) => {
                tracing::debug!("contract validation rejected with status {}", status);
                Ok(ContractValidation::invalid())
            }
            Err(NodeError::NotFound(_)) => Ok(ContractValidation::invalid()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ConsentStoreApi for NodeClient {
    async fn query(&self, query: &ConsentQuery) -> NodeResult<ConsentQueryResult> {
        let request = self.http.post(self.url(CONSENT_QUERY_PATH)).json(query);
        self.send_json(request).await
    }

    async fn check(
        &self,
        subject: &Urn,
        actor: &Urn,
        custodian: &Urn,
    ) -> NodeResult<ConsentCheck> {
        let request = self
            .http
            .post(self.url(CONSENT_CHECK_PATH))
            .json(&WireConsentCheck {
                subject,
                actor,
                custodian,
                data_class: MEDICAL_DATA_CLASS,
            });
        self.send_json(request).await
    }
}

#[async_trait]
impl ConsentLogicApi for NodeClient {
    async fn create(&self, request: &CreateConsent) -> NodeResult<ConsentJob> {
        let body = WireConsentRequest {
            custodian: &request.custodian,
            actor: &request.actor,
            subject: &request.subject,
            records: vec![WireConsentProofRecord {
                period: WirePeriod { start: Utc::now() },
                consent_proof: WireConsentProof {
                    id: uuid::Uuid::new_v4().to_string(),
                    title: request.reason.as_str(),
                },
                data_class: vec![MEDICAL_DATA_CLASS],
            }],
        };
        let job: ConsentJob = self
            .send_json(self.http.post(self.url(CONSENT_CREATE_PATH)).json(&body))
            .await?;
        if !job.is_ok() {
            return Err(NodeError::ConsentCreate {
                result_code: job.result_code,
            });
        }
        Ok(job)
    }
}

#[async_trait]
impl EventStoreApi for NodeClient {
    async fn list(&self) -> NodeResult<Vec<ExternalConsentEvent>> {
        let wire: WireEventList = self.send_json(self.http.get(self.url(EVENTS_PATH))).await?;
        let raw = match wire {
            WireEventList::Wrapped { events } => events,
            WireEventList::Bare(events) => events,
        };
        Ok(decode_event_list(raw))
    }

    async fn get(&self, job_id: &str) -> NodeResult<ExternalConsentEvent> {
        let url = self.url_with_id(EVENTS_PATH, job_id)?;
        let raw: serde_json::Value = self.send_json(self.http.get(url)).await?;
        decode_event(raw)
    }
}

#[async_trait]
impl RegistryApi for NodeClient {
    async fn organisation_by_id(&self, id: &str) -> NodeResult<Organisation> {
        let url = self.url_with_id(ORGANISATION_PATH, id)?;
        match self.send_json(self.http.get(url)).await {
            Err(NodeError::NotFound(_)) => Err(NodeError::NotFound(format!("organisation {id}"))),
            other => other,
        }
    }

    async fn search_organisations(&self, query: &str) -> NodeResult<Vec<Organisation>> {
        let request = self
            .http
            .get(self.url(ORGANISATIONS_PATH))
            .query(&[("query", query)]);
        let mut organisations: Vec<Organisation> = self.send_json(request).await?;
        organisations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(organisations)
    }

    async fn endpoints_by_organisation_id(
        &self,
        id: &str,
        endpoint_type: &str,
    ) -> NodeResult<Vec<Endpoint>> {
        let request = self
            .http
            .get(self.url(ENDPOINTS_PATH))
            .query(&[("orgIds", id), ("type", endpoint_type)]);
        self.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConsentAnswer;
    use axum::{
        extract::Path,
        http::StatusCode as AxumStatus,
        routing::{get, post},
        Json, Router,
    };
    use ehr_types::NonEmptyText;
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test node");
        });
        format!("http://{addr}")
    }

    fn client(base: &str) -> NodeClient {
        NodeClient::new(base, Duration::from_millis(500)).expect("client should build")
    }

    fn urn(s: &str) -> Urn {
        Urn::parse(s).unwrap()
    }

    #[test]
    fn new_rejects_empty_base_url() {
        let err = NodeClient::new("  ", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn new_strips_trailing_slash() {
        let c = NodeClient::new("http://node:1323/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.base_url(), "http://node:1323");
    }

    #[tokio::test]
    async fn introspection_rejection_is_inactive_not_error() {
        let app = Router::new().route(
            INTROSPECT_PATH,
            post(|| async { (AxumStatus::UNAUTHORIZED, "nope") }),
        );
        let base = serve(app).await;
        let result = client(&base).introspect("token").await.unwrap();
        assert!(!result.active);
    }

    #[tokio::test]
    async fn introspection_returns_claims() {
        let app = Router::new().route(
            INTROSPECT_PATH,
            post(|| async {
                Json(json!({"active": true, "sub": "urn:org:A", "sid": "urn:p:1", "name": "Dr. A"}))
            }),
        );
        let base = serve(app).await;
        let result = client(&base).introspect("token").await.unwrap();
        assert!(result.active);
        assert_eq!(result.organisation_id.as_deref(), Some("urn:org:A"));
        assert_eq!(result.name.as_deref(), Some("Dr. A"));
    }

    #[tokio::test]
    async fn slow_node_times_out() {
        let app = Router::new().route(
            CONSENT_CHECK_PATH,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"consentGiven": "yes"}))
            }),
        );
        let base = serve(app).await;
        let c = NodeClient::new(base, Duration::from_millis(50)).unwrap();
        let err = c
            .check(&urn("urn:p:1"), &urn("urn:org:A"), &urn("urn:org:self"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn consent_check_parses_answer() {
        let app = Router::new().route(
            CONSENT_CHECK_PATH,
            post(|| async { Json(json!({"consentGiven": "no"})) }),
        );
        let base = serve(app).await;
        let check = client(&base)
            .check(&urn("urn:p:1"), &urn("urn:org:A"), &urn("urn:org:self"))
            .await
            .unwrap();
        assert_eq!(check.consent_given, ConsentAnswer::No);
    }

    #[tokio::test]
    async fn consent_create_requires_ok_result_code() {
        let app = Router::new().route(
            CONSENT_CREATE_PATH,
            post(|| async { Json(json!({"jobId": "job-9", "resultCode": "DUPLICATE"})) }),
        );
        let base = serve(app).await;
        let err = client(&base)
            .create(&CreateConsent {
                subject: urn("urn:p:1"),
                actor: urn("urn:org:A"),
                custodian: urn("urn:org:self"),
                reason: NonEmptyText::new("treatment").unwrap(),
            })
            .await
            .unwrap_err();
        assert!(
            matches!(err, NodeError::ConsentCreate { ref result_code } if result_code == "DUPLICATE")
        );
    }

    #[tokio::test]
    async fn missing_organisation_is_not_found() {
        let app = Router::new().route(
            "/api/organization/:id",
            get(|Path(_id): Path<String>| async { AxumStatus::NOT_FOUND }),
        );
        let base = serve(app).await;
        let err = client(&base)
            .organisation_by_id("urn:org:missing")
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::NotFound(_)));
    }

    #[tokio::test]
    async fn ids_are_sent_as_single_path_segments() {
        let app = Router::new()
            .route(
                "/api/organization/:id",
                get(|Path(id): Path<String>| async move {
                    Json(json!({"identifier": id, "name": "Zorg B.V."}))
                }),
            )
            .route(
                "/events/:id",
                get(|Path(id): Path<String>| async move {
                    Json(json!({"uuid": id, "name": "requested", "payload": {}}))
                }),
            );
        let base = serve(app).await;

        let organisation = client(&base).organisation_by_id("org/1?x#y").await.unwrap();
        assert_eq!(organisation.identifier, "org/1?x#y");

        let event = client(&base).get("job/7?status=completed").await.unwrap();
        assert_eq!(event.job_id, "job/7?status=completed");
    }

    #[test]
    fn url_with_id_percent_encodes_reserved_characters() {
        let url = client("http://node:1323").url_with_id(EVENTS_PATH, "a/b?c#d").unwrap();
        assert_eq!(url.as_str(), "http://node:1323/events/a%2Fb%3Fc%23d");
    }

    #[tokio::test]
    async fn event_list_accepts_wrapped_form_and_skips_bad_events() {
        let app = Router::new().route(
            EVENTS_PATH,
            get(|| async {
                Json(json!({"events": [
                    {"uuid": "job-1", "name": "requested", "payload": {"legalEntity": "urn:org:A"}},
                    {"name": "no id"}
                ]}))
            }),
        );
        let base = serve(app).await;
        let events = client(&base).list().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].organisation_refs, ["urn:org:A"]);
    }

    #[tokio::test]
    async fn organisation_search_is_sorted_by_name() {
        let app = Router::new().route(
            ORGANISATIONS_PATH,
            get(|| async {
                Json(json!([
                    {"identifier": "urn:org:2", "name": "Zorg B.V."},
                    {"identifier": "urn:org:1", "name": "Apotheek"}
                ]))
            }),
        );
        let base = serve(app).await;
        let found = client(&base).search_organisations("a").await.unwrap();
        let names: Vec<&str> = found.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["Apotheek", "Zorg B.V."]);
    }
}
