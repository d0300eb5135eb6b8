//! Authorization gate for clinical data released to other organisations.
//!
//! [`AuthorizationGate::authorize`] runs a fixed chain and stops at the first failure:
//!
//! 1. introspect the bearer token
//! 2. check consent for (token subject, token organisation, own organisation)
//! 3. validate the identity contract, when presented or required
//! 4. locate the patient by the BSN in the token subject
//! 5. write the access audit entry
//!
//! Every failure is a [`Denial`]. Callers must not expose the variant to the requester; it exists
//! for logging only.

use crate::access_log::{AccessAuditEntry, AccessLog};
use crate::patients::{Patient, PatientStore};
use crate::EhrError;
use ehr_types::{Urn, UrnError};
use node_client::{AuthApi, ConsentStoreApi, NodeError};
use std::sync::Arc;

/// Whether requests must carry a signed identity contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdentityContractPolicy {
    /// A contract is validated when presented; the token alone suffices otherwise.
    #[default]
    Optional,
    Required,
}

/// Credentials extracted from an incoming request.
#[derive(Clone, Debug, Default)]
pub struct AccessRequest {
    pub bearer_token: Option<String>,
    pub identity_contract: Option<String>,
    /// Organisation the requester claims to act for, sent alongside the contract.
    pub requesting_organisation: Option<String>,
}

/// Outcome of a fully passed gate, handed to the data handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub subject: Urn,
    pub actor: Urn,
    pub user: String,
    pub patient: Patient,
}

#[derive(Debug, thiserror::Error)]
pub enum Denial {
    #[error("no bearer token")]
    MissingToken,
    #[error("token introspection failed: {0}")]
    IntrospectionFailed(#[source] NodeError),
    #[error("token is not active")]
    InactiveToken,
    #[error("token has no {0} claim")]
    MissingClaim(&'static str),
    #[error("token claim is not a valid identifier: {0}")]
    InvalidClaim(#[from] UrnError),
    #[error("consent check failed: {0}")]
    ConsentCheckFailed(#[source] NodeError),
    #[error("no consent for actor {actor} on subject {subject}")]
    NoConsent { subject: Urn, actor: Urn },
    #[error("identity contract required but not presented")]
    MissingContract,
    #[error("requesting organisation {claimed} does not match token organisation {actor}")]
    OrganisationMismatch { claimed: String, actor: Urn },
    #[error("identity contract validation failed: {0}")]
    ContractValidationFailed(#[source] NodeError),
    #[error("identity contract is not valid")]
    InvalidContract,
    #[error("patient lookup failed: {0}")]
    PatientNotFound(#[source] EhrError),
    #[error("access audit write failed: {0}")]
    AuditFailed(#[source] EhrError),
}

pub struct AuthorizationGate {
    auth: Arc<dyn AuthApi>,
    consent_store: Arc<dyn ConsentStoreApi>,
    patients: Arc<dyn PatientStore>,
    access_log: Arc<dyn AccessLog>,
    custodian: Urn,
    contract_policy: IdentityContractPolicy,
}

impl AuthorizationGate {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        consent_store: Arc<dyn ConsentStoreApi>,
        patients: Arc<dyn PatientStore>,
        access_log: Arc<dyn AccessLog>,
        custodian: Urn,
        contract_policy: IdentityContractPolicy,
    ) -> Self {
        Self {
            auth,
            consent_store,
            patients,
            access_log,
            custodian,
            contract_policy,
        }
    }

    /// Runs the full chain. The denial reason is logged here at `warn`.
    pub async fn authorize(&self, request: &AccessRequest) -> Result<RequestContext, Denial> {
        match self.run_chain(request).await {
            Ok(context) => {
                tracing::info!(
                    "released data for patient {} to {} ({})",
                    context.patient.id,
                    context.actor,
                    context.user
                );
                Ok(context)
            }
            Err(denial) => {
                tracing::warn!("access denied: {denial}");
                Err(denial)
            }
        }
    }

    async fn run_chain(&self, request: &AccessRequest) -> Result<RequestContext, Denial> {
        let token = request
            .bearer_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(Denial::MissingToken)?;

        let introspection = self
            .auth
            .introspect(token)
            .await
            .map_err(Denial::IntrospectionFailed)?;
        if !introspection.active {
            return Err(Denial::InactiveToken);
        }
        let subject = Urn::parse(
            introspection
                .subject_id
                .as_deref()
                .ok_or(Denial::MissingClaim("sid"))?,
        )?;
        let actor = Urn::parse(
            introspection
                .organisation_id
                .as_deref()
                .ok_or(Denial::MissingClaim("sub"))?,
        )?;

        let consent = self
            .consent_store
            .check(&subject, &actor, &self.custodian)
            .await
            .map_err(Denial::ConsentCheckFailed)?;
        if !consent.is_given() {
            return Err(Denial::NoConsent { subject, actor });
        }

        let token_user = introspection
            .name
            .clone()
            .unwrap_or_else(|| actor.to_string());
        let user = match (&request.identity_contract, self.contract_policy) {
            (Some(contract), _) => {
                if let Some(claimed) = &request.requesting_organisation {
                    if claimed != actor.as_str() {
                        return Err(Denial::OrganisationMismatch {
                            claimed: claimed.clone(),
                            actor,
                        });
                    }
                }
                let validation = self
                    .auth
                    .validate_identity_contract(contract)
                    .await
                    .map_err(Denial::ContractValidationFailed)?;
                if !validation.valid {
                    return Err(Denial::InvalidContract);
                }
                validation.signer_name().unwrap_or(token_user)
            }
            (None, IdentityContractPolicy::Required) => return Err(Denial::MissingContract),
            (None, IdentityContractPolicy::Optional) => token_user,
        };

        let bsn = subject.bsn()?;
        let patient = self
            .patients
            .by_bsn(bsn)
            .await
            .map_err(Denial::PatientNotFound)?;

        self.access_log
            .store(AccessAuditEntry::new(
                patient.id.clone(),
                actor.as_str(),
                user.clone(),
            ))
            .await
            .map_err(Denial::AuditFailed)?;

        Ok(RequestContext {
            subject,
            actor,
            user,
            patient,
        })
    }
}
