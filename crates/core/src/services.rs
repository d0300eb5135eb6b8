//! Wiring of the core services around one node connection.

use crate::access_log::InMemoryAccessLog;
use crate::config::ServiceConfig;
use crate::consent::ConsentRequester;
use crate::gate::AuthorizationGate;
use crate::ledger::InMemoryConsentLedger;
use crate::patients::{InMemoryRecords, SeedData};
use crate::poller::EventPoller;
use crate::reconcile::ConsentReconciler;
use crate::relay::NotificationRelay;
use crate::EhrResult;
use node_client::NodeCapabilities;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Every core service, sharing the same stores.
#[derive(Clone)]
pub struct EhrServices {
    pub config: Arc<ServiceConfig>,
    pub node: NodeCapabilities,
    pub records: Arc<InMemoryRecords>,
    pub ledger: Arc<InMemoryConsentLedger>,
    pub access_log: Arc<InMemoryAccessLog>,
    pub reconciler: Arc<ConsentReconciler>,
    pub relay: Arc<NotificationRelay>,
    pub gate: Arc<AuthorizationGate>,
    pub requester: Arc<ConsentRequester>,
}

impl EhrServices {
    /// Builds the services, seeding patients from the configured file or the demo data.
    ///
    /// # Errors
    ///
    /// Returns `EhrError` if the seed file cannot be loaded.
    pub fn build(config: ServiceConfig, node: NodeCapabilities) -> EhrResult<Self> {
        let seed = match config.seed_file() {
            Some(path) => {
                tracing::info!("loading patients from {}", path.display());
                SeedData::load(path)?
            }
            None => SeedData::demo(),
        };
        Ok(Self::with_seed(config, node, seed))
    }

    pub fn with_seed(config: ServiceConfig, node: NodeCapabilities, seed: SeedData) -> Self {
        let own_urn = config.organisation_urn().clone();
        let records = Arc::new(InMemoryRecords::new(seed));
        let ledger = Arc::new(InMemoryConsentLedger::new());
        let access_log = Arc::new(InMemoryAccessLog::new());

        let reconciler = Arc::new(ConsentReconciler::new(
            node.clone(),
            ledger.clone(),
            records.clone(),
            own_urn.clone(),
        ));
        let relay = Arc::new(NotificationRelay::new(
            reconciler.clone(),
            records.clone(),
            access_log.clone(),
        ));
        let gate = Arc::new(AuthorizationGate::new(
            node.auth.clone(),
            node.consent_store.clone(),
            records.clone(),
            access_log.clone(),
            own_urn.clone(),
            config.identity_contract(),
        ));
        let requester = Arc::new(ConsentRequester::new(
            node.consent_logic.clone(),
            ledger.clone(),
            records.clone(),
            own_urn,
        ));

        Self {
            config: Arc::new(config),
            node,
            records,
            ledger,
            access_log,
            reconciler,
            relay,
            gate,
            requester,
        }
    }

    /// Starts the access-log listener and, when configured, the event poller.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = vec![self
            .relay
            .clone()
            .spawn_access_log_listener(self.access_log.subscribe_stored())];
        match self.config.event_poll_interval() {
            Some(interval) => {
                tracing::info!("polling node events every {}s", interval.as_secs());
                let poller = EventPoller::new(self.node.events.clone(), self.relay.clone(), interval);
                handles.push(poller.spawn());
            }
            None => tracing::info!("event polling disabled"),
        }
        handles
    }
}
