//! In-memory stand-ins for the node, for tests in this crate and in the API crates.
//!
//! [`FakeNode`] implements all five node capabilities over plain collections, counts every call,
//! and can be told to fail individual capabilities.

use crate::access_log::{AccessAuditEntry, AccessLog};
use crate::{EhrError, EhrResult};
use async_trait::async_trait;
use ehr_types::Urn;
use node_client::{
    AuthApi, ConsentAnswer, ConsentCheck, ConsentJob, ConsentLogicApi, ConsentQuery,
    ConsentQueryResult, ConsentRecord, ConsentStoreApi, ContractValidation, CreateConsent,
    Endpoint, EventStoreApi, ExternalConsentEvent, Introspection, NodeCapabilities, NodeError,
    NodeResult, Organisation, RegistryApi,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of calls made to each capability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub introspect: usize,
    pub validate_contract: usize,
    pub consent_query: usize,
    pub consent_check: usize,
    pub consent_create: usize,
    pub events_list: usize,
    pub events_get: usize,
    pub organisation_lookup: usize,
}

#[derive(Default)]
struct Failures {
    introspection: bool,
    contract_validation: bool,
    consent_query: bool,
    consent_check: bool,
    consent_create: bool,
    events: bool,
    organisations: HashSet<String>,
}

#[derive(Default)]
struct FakeState {
    tokens: HashMap<String, Introspection>,
    contracts: HashMap<String, ContractValidation>,
    consents: Vec<ConsentRecord>,
    events: Vec<ExternalConsentEvent>,
    organisations: BTreeMap<String, Organisation>,
    created: Vec<CreateConsent>,
    failures: Failures,
    calls: CallCounts,
    next_job: u64,
}

#[derive(Default)]
pub struct FakeNode {
    state: Mutex<FakeState>,
}

fn unavailable() -> NodeError {
    NodeError::Status {
        status: 503,
        body: "node unavailable".into(),
    }
}

/// Builds a decoded event directly, bypassing payload decoding.
pub fn event(job_id: &str, name: &str, organisation_refs: &[&str]) -> ExternalConsentEvent {
    ExternalConsentEvent {
        job_id: job_id.into(),
        name: name.into(),
        initiator_legal_entity: None,
        error: None,
        organisation_refs: organisation_refs.iter().map(|s| s.to_string()).collect(),
        payload: serde_json::Value::Null,
    }
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All five capabilities backed by this fake.
    pub fn capabilities(self: &Arc<Self>) -> NodeCapabilities {
        NodeCapabilities {
            auth: self.clone(),
            consent_store: self.clone(),
            consent_logic: self.clone(),
            events: self.clone(),
            registry: self.clone(),
        }
    }

    pub fn add_organisation(&self, identifier: &str, name: &str) {
        self.state().organisations.insert(
            identifier.into(),
            Organisation {
                identifier: identifier.into(),
                name: name.into(),
            },
        );
    }

    /// Registers an active token issued to `organisation` for `subject`.
    pub fn add_token(&self, token: &str, subject: &str, organisation: &str, name: &str) {
        self.state().tokens.insert(
            token.into(),
            Introspection {
                active: true,
                subject_id: Some(subject.into()),
                organisation_id: Some(organisation.into()),
                name: Some(name.into()),
            },
        );
    }

    pub fn add_inactive_token(&self, token: &str) {
        self.state()
            .tokens
            .insert(token.into(), Introspection::inactive());
    }

    pub fn add_contract(&self, contract: &str, valid: bool, signer_name: &str) {
        let mut signer_attributes = BTreeMap::new();
        signer_attributes.insert("name".to_string(), signer_name.to_string());
        self.state().contracts.insert(
            contract.into(),
            ContractValidation {
                valid,
                signer_attributes,
            },
        );
    }

    pub fn add_consent(&self, subject: &str, actor: &str, custodian: &str) {
        let record = ConsentRecord {
            subject: Urn::parse(subject).unwrap_or_else(|e| panic!("bad subject URN: {e}")),
            actor: Urn::parse(actor).unwrap_or_else(|e| panic!("bad actor URN: {e}")),
            custodian: Urn::parse(custodian).unwrap_or_else(|e| panic!("bad custodian URN: {e}")),
        };
        self.state().consents.push(record);
    }

    /// Inserts an event or replaces the status of an existing one.
    pub fn set_event(&self, job_id: &str, name: &str, organisation_refs: &[&str]) {
        let mut state = self.state();
        let new_event = event(job_id, name, organisation_refs);
        match state.events.iter_mut().find(|e| e.job_id == job_id) {
            Some(existing) => *existing = new_event,
            None => state.events.push(new_event),
        }
    }

    pub fn fail_introspection(&self, fail: bool) {
        self.state().failures.introspection = fail;
    }

    pub fn fail_contract_validation(&self, fail: bool) {
        self.state().failures.contract_validation = fail;
    }

    pub fn fail_consent_query(&self, fail: bool) {
        self.state().failures.consent_query = fail;
    }

    pub fn fail_consent_check(&self, fail: bool) {
        self.state().failures.consent_check = fail;
    }

    pub fn fail_consent_create(&self, fail: bool) {
        self.state().failures.consent_create = fail;
    }

    pub fn fail_events(&self, fail: bool) {
        self.state().failures.events = fail;
    }

    pub fn fail_organisation(&self, identifier: &str) {
        self.state()
            .failures
            .organisations
            .insert(identifier.into());
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn created(&self) -> Vec<CreateConsent> {
        self.state().created.clone()
    }
}

#[async_trait]
impl AuthApi for FakeNode {
    async fn introspect(&self, token: &str) -> NodeResult<Introspection> {
        let mut state = self.state();
        state.calls.introspect += 1;
        if state.failures.introspection {
            return Err(NodeError::Timeout);
        }
        Ok(state
            .tokens
            .get(token)
            .cloned()
            .unwrap_or_else(Introspection::inactive))
    }

    async fn validate_identity_contract(&self, contract: &str) -> NodeResult<ContractValidation> {
        let mut state = self.state();
        state.calls.validate_contract += 1;
        if state.failures.contract_validation {
            return Err(NodeError::Timeout);
        }
        Ok(state
            .contracts
            .get(contract)
            .cloned()
            .unwrap_or_else(ContractValidation::invalid))
    }
}

#[async_trait]
impl ConsentStoreApi for FakeNode {
    async fn query(&self, query: &ConsentQuery) -> NodeResult<ConsentQueryResult> {
        let mut state = self.state();
        state.calls.consent_query += 1;
        if state.failures.consent_query {
            return Err(unavailable());
        }
        let results: Vec<ConsentRecord> = state
            .consents
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        Ok(ConsentQueryResult {
            total_results: results.len() as u64,
            results,
        })
    }

    async fn check(
        &self,
        subject: &Urn,
        actor: &Urn,
        custodian: &Urn,
    ) -> NodeResult<ConsentCheck> {
        let mut state = self.state();
        state.calls.consent_check += 1;
        if state.failures.consent_check {
            return Err(unavailable());
        }
        let given = state
            .consents
            .iter()
            .any(|r| &r.subject == subject && &r.actor == actor && &r.custodian == custodian);
        Ok(ConsentCheck {
            consent_given: if given {
                ConsentAnswer::Yes
            } else {
                ConsentAnswer::No
            },
            limitations: None,
        })
    }
}

#[async_trait]
impl ConsentLogicApi for FakeNode {
    async fn create(&self, request: &CreateConsent) -> NodeResult<ConsentJob> {
        let mut state = self.state();
        state.calls.consent_create += 1;
        if state.failures.consent_create {
            return Err(NodeError::ConsentCreate {
                result_code: "FAILED".into(),
            });
        }
        state.next_job += 1;
        let job_id = format!("job-{}", state.next_job);
        state.created.push(request.clone());
        Ok(ConsentJob {
            job_id,
            result_code: "OK".into(),
        })
    }
}

#[async_trait]
impl EventStoreApi for FakeNode {
    async fn list(&self) -> NodeResult<Vec<ExternalConsentEvent>> {
        let mut state = self.state();
        state.calls.events_list += 1;
        if state.failures.events {
            return Err(unavailable());
        }
        Ok(state.events.clone())
    }

    async fn get(&self, job_id: &str) -> NodeResult<ExternalConsentEvent> {
        let mut state = self.state();
        state.calls.events_get += 1;
        if state.failures.events {
            return Err(unavailable());
        }
        state
            .events
            .iter()
            .find(|e| e.job_id == job_id)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("event {job_id}")))
    }
}

#[async_trait]
impl RegistryApi for FakeNode {
    async fn organisation_by_id(&self, id: &str) -> NodeResult<Organisation> {
        let mut state = self.state();
        state.calls.organisation_lookup += 1;
        if state.failures.organisations.contains(id) {
            return Err(unavailable());
        }
        state
            .organisations
            .get(id)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("organisation {id}")))
    }

    async fn search_organisations(&self, query: &str) -> NodeResult<Vec<Organisation>> {
        let needle = query.to_lowercase();
        let mut found: Vec<Organisation> = self
            .state()
            .organisations
            .values()
            .filter(|o| o.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn endpoints_by_organisation_id(
        &self,
        _id: &str,
        _endpoint_type: &str,
    ) -> NodeResult<Vec<Endpoint>> {
        Ok(Vec::new())
    }
}

/// Access log whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingAccessLog;

#[async_trait]
impl AccessLog for FailingAccessLog {
    async fn store(&self, _entry: AccessAuditEntry) -> EhrResult<()> {
        Err(EhrError::AccessLog("audit storage unavailable".into()))
    }

    async fn by_patient_id(&self, _patient_id: &str) -> EhrResult<Vec<AccessAuditEntry>> {
        Ok(Vec::new())
    }
}
