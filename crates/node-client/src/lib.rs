//! # Node Client
//!
//! Typed capability wrappers over the consent node's HTTP API.
//!
//! The node bundles five concerns that the rest of the workspace depends on separately:
//! - [`AuthApi`]: access-token introspection and identity-contract validation
//! - [`ConsentStoreApi`]: confirmed-consent queries and point checks
//! - [`ConsentLogicApi`]: consent creation (asynchronous, returns a job)
//! - [`EventStoreApi`]: the consent-request job log
//! - [`RegistryApi`]: the organisation directory
//!
//! [`NodeClient`] implements all five over HTTP. Callers hold the traits so tests and alternative
//! transports can stand in for the node.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod events;
pub mod http;
pub mod model;

use async_trait::async_trait;
use ehr_types::Urn;
use std::sync::Arc;

pub use error::{NodeError, NodeResult};
pub use events::{decode_event, ExternalConsentEvent, COMPLETED_EVENT_NAME};
pub use http::NodeClient;
pub use model::{
    ConsentAnswer, ConsentCheck, ConsentJob, ConsentQuery, ConsentQueryResult, ConsentRecord,
    ContractValidation, CreateConsent, Endpoint, Introspection, Organisation,
};

/// Identity-proof capabilities.
///
/// A non-2xx answer from the node is reported as an inactive token / invalid contract rather than
/// an error; only transport failures and timeouts are errors.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn introspect(&self, token: &str) -> NodeResult<Introspection>;

    async fn validate_identity_contract(&self, contract: &str) -> NodeResult<ContractValidation>;
}

#[async_trait]
pub trait ConsentStoreApi: Send + Sync {
    async fn query(&self, query: &ConsentQuery) -> NodeResult<ConsentQueryResult>;

    async fn check(
        &self,
        subject: &Urn,
        actor: &Urn,
        custodian: &Urn,
    ) -> NodeResult<ConsentCheck>;
}

#[async_trait]
pub trait ConsentLogicApi: Send + Sync {
    /// Submits a consent request.
    ///
    /// # Errors
    ///
    /// [`NodeError::ConsentCreate`] when the node answers with a result code other than `OK`.
    async fn create(&self, request: &CreateConsent) -> NodeResult<ConsentJob>;
}

#[async_trait]
pub trait EventStoreApi: Send + Sync {
    async fn list(&self) -> NodeResult<Vec<ExternalConsentEvent>>;

    async fn get(&self, job_id: &str) -> NodeResult<ExternalConsentEvent>;
}

#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// # Errors
    ///
    /// [`NodeError::NotFound`] when the registry does not know `id`.
    async fn organisation_by_id(&self, id: &str) -> NodeResult<Organisation>;

    async fn search_organisations(&self, query: &str) -> NodeResult<Vec<Organisation>>;

    async fn endpoints_by_organisation_id(
        &self,
        id: &str,
        endpoint_type: &str,
    ) -> NodeResult<Vec<Endpoint>>;
}

/// The five node capabilities, shareable across services.
#[derive(Clone)]
pub struct NodeCapabilities {
    pub auth: Arc<dyn AuthApi>,
    pub consent_store: Arc<dyn ConsentStoreApi>,
    pub consent_logic: Arc<dyn ConsentLogicApi>,
    pub events: Arc<dyn EventStoreApi>,
    pub registry: Arc<dyn RegistryApi>,
}

impl NodeCapabilities {
    /// Uses one HTTP client for every capability.
    pub fn from_client(client: NodeClient) -> Self {
        let client = Arc::new(client);
        Self {
            auth: client.clone(),
            consent_store: client.clone(),
            consent_logic: client.clone(),
            events: client.clone(),
            registry: client,
        }
    }
}
