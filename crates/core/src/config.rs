//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the services. Nothing in the
//! request path reads environment variables.

use crate::constants::{
    DEFAULT_EVENT_POLL_SECS, DEFAULT_NODE_TIMEOUT_MS, DEFAULT_NODE_URL, DEFAULT_ORGANISATION_NAME,
};
use crate::gate::IdentityContractPolicy;
use crate::{EhrError, EhrResult};
use ehr_types::{NonEmptyText, Urn};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    organisation_name: NonEmptyText,
    organisation_urn: Urn,
    node_url: String,
    node_timeout: Duration,
    event_poll_interval: Option<Duration>,
    seed_file: Option<PathBuf>,
    identity_contract: IdentityContractPolicy,
}

impl ServiceConfig {
    /// Create a new `ServiceConfig`.
    ///
    /// # Errors
    ///
    /// Returns `EhrError` if the AGB code or name is empty, the node URL is empty, or the node
    /// timeout is zero.
    pub fn new(
        organisation_agb: &str,
        organisation_name: &str,
        node_url: String,
        node_timeout: Duration,
        event_poll_interval: Option<Duration>,
        seed_file: Option<PathBuf>,
        identity_contract: IdentityContractPolicy,
    ) -> EhrResult<Self> {
        let organisation_urn = Urn::for_agb(organisation_agb)?;
        let organisation_name = NonEmptyText::new(organisation_name)?;

        if node_url.trim().is_empty() {
            return Err(EhrError::InvalidInput("node URL cannot be empty".into()));
        }
        if node_timeout.is_zero() {
            return Err(EhrError::InvalidInput(
                "node timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            organisation_name,
            organisation_urn,
            node_url,
            node_timeout,
            event_poll_interval,
            seed_file,
            identity_contract,
        })
    }

    /// Resolves the configuration from the process environment.
    ///
    /// Reads `EHR_ORGANISATION_AGB` (required), `EHR_ORGANISATION_NAME`, `NUTS_NODE_URL`,
    /// `NUTS_NODE_TIMEOUT_MS`, `EHR_EVENT_POLL_SECS`, `EHR_SEED_FILE` and
    /// `EHR_REQUIRE_IDENTITY_CONTRACT`.
    ///
    /// # Errors
    ///
    /// Returns `EhrError` if the AGB code is missing or any value fails to parse or validate.
    pub fn from_env() -> EhrResult<Self> {
        let var = |name: &str| std::env::var(name).ok();

        let agb = non_blank(var("EHR_ORGANISATION_AGB"))
            .ok_or_else(|| EhrError::InvalidInput("EHR_ORGANISATION_AGB must be set".into()))?;
        let name = non_blank(var("EHR_ORGANISATION_NAME"))
            .unwrap_or_else(|| DEFAULT_ORGANISATION_NAME.into());
        let node_url = non_blank(var("NUTS_NODE_URL")).unwrap_or_else(|| DEFAULT_NODE_URL.into());

        Self::new(
            &agb,
            &name,
            node_url,
            node_timeout_from_env_value(var("NUTS_NODE_TIMEOUT_MS"))?,
            poll_interval_from_env_value(var("EHR_EVENT_POLL_SECS"))?,
            non_blank(var("EHR_SEED_FILE")).map(PathBuf::from),
            identity_contract_policy_from_env_value(var("EHR_REQUIRE_IDENTITY_CONTRACT"))?,
        )
    }

    pub fn organisation_name(&self) -> &NonEmptyText {
        &self.organisation_name
    }

    /// Own organisation URN, used as custodian in every consent this service grants.
    pub fn organisation_urn(&self) -> &Urn {
        &self.organisation_urn
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    pub fn node_timeout(&self) -> Duration {
        self.node_timeout
    }

    /// `None` disables event polling.
    pub fn event_poll_interval(&self) -> Option<Duration> {
        self.event_poll_interval
    }

    pub fn seed_file(&self) -> Option<&Path> {
        self.seed_file.as_deref()
    }

    pub fn identity_contract(&self) -> IdentityContractPolicy {
        self.identity_contract
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the node timeout (milliseconds) from an optional string value.
pub fn node_timeout_from_env_value(value: Option<String>) -> EhrResult<Duration> {
    let millis = match non_blank(value) {
        Some(v) => v
            .parse::<u64>()
            .map_err(|e| EhrError::InvalidInput(format!("invalid node timeout '{v}': {e}")))?,
        None => DEFAULT_NODE_TIMEOUT_MS,
    };
    Ok(Duration::from_millis(millis))
}

/// Parse the event poll interval (seconds). `0` disables polling.
pub fn poll_interval_from_env_value(value: Option<String>) -> EhrResult<Option<Duration>> {
    let secs = match non_blank(value) {
        Some(v) => v
            .parse::<u64>()
            .map_err(|e| EhrError::InvalidInput(format!("invalid poll interval '{v}': {e}")))?,
        None => DEFAULT_EVENT_POLL_SECS,
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

/// Parse the identity-contract policy from a boolean-ish value.
pub fn identity_contract_policy_from_env_value(
    value: Option<String>,
) -> EhrResult<IdentityContractPolicy> {
    match non_blank(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("false") | Some("0") | Some("no") => Ok(IdentityContractPolicy::Optional),
        Some("true") | Some("1") | Some("yes") => Ok(IdentityContractPolicy::Required),
        Some(other) => Err(EhrError::InvalidInput(format!(
            "invalid identity contract flag '{other}'"
        ))),
    }
}
