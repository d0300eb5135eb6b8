//! Polls the node's event list and refreshes the relay when it changes.
//!
//! The poller is the fallback event source for deployments where the node cannot call the
//! webhook. A change is any difference in the set of `(job id, status)` pairs.

use crate::relay::NotificationRelay;
use node_client::{EventStoreApi, ExternalConsentEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

type Fingerprint = Vec<(String, String)>;

fn fingerprint(events: &[ExternalConsentEvent]) -> Fingerprint {
    let mut pairs: Fingerprint = events
        .iter()
        .map(|e| (e.job_id.clone(), e.name.clone()))
        .collect();
    pairs.sort();
    pairs
}

pub struct EventPoller {
    events: Arc<dyn EventStoreApi>,
    relay: Arc<NotificationRelay>,
    interval: Duration,
    last: Option<Fingerprint>,
}

impl EventPoller {
    pub fn new(
        events: Arc<dyn EventStoreApi>,
        relay: Arc<NotificationRelay>,
        interval: Duration,
    ) -> Self {
        Self {
            events,
            relay,
            interval,
            last: None,
        }
    }

    /// One poll. Returns true when it triggered a refresh.
    ///
    /// The first successful poll only records a baseline. A failed list call leaves the baseline
    /// as it was.
    pub async fn poll_once(&mut self) -> bool {
        let events = match self.events.list().await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("event poll failed: {e}");
                return false;
            }
        };
        let current = fingerprint(&events);
        let changed = matches!(&self.last, Some(previous) if *previous != current);
        self.last = Some(current);
        if !changed {
            return false;
        }

        tracing::info!("event list changed, refreshing views");
        if let Err(e) = self.relay.refresh_all().await {
            tracing::error!("refresh after event poll failed: {e}");
        }
        true
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::InMemoryAccessLog;
    use crate::ledger::InMemoryConsentLedger;
    use crate::patients::{InMemoryRecords, SeedData};
    use crate::reconcile::ConsentReconciler;
    use crate::relay::Topic;
    use crate::testing::FakeNode;
    use ehr_types::Urn;

    fn poller(node: &Arc<FakeNode>) -> (EventPoller, Arc<NotificationRelay>) {
        let records = Arc::new(InMemoryRecords::new(SeedData::demo()));
        let reconciler = Arc::new(ConsentReconciler::new(
            node.capabilities(),
            Arc::new(InMemoryConsentLedger::new()),
            records.clone(),
            Urn::parse("urn:oid:2.16.840.1.113883.2.4.6.1:00000007").unwrap(),
        ));
        let relay = Arc::new(NotificationRelay::new(
            reconciler,
            records,
            Arc::new(InMemoryAccessLog::new()),
        ));
        (
            EventPoller::new(node.clone(), relay.clone(), Duration::from_secs(1)),
            relay,
        )
    }

    #[tokio::test]
    async fn first_poll_sets_baseline_only() {
        let node = FakeNode::new();
        node.set_event("job-1", "requested", &[]);
        let (mut poller, relay) = poller(&node);

        assert!(!poller.poll_once().await);
        assert!(relay.get(Topic::Transactions).await.is_none());
        assert!(!poller.poll_once().await);
    }

    #[tokio::test]
    async fn status_change_triggers_refresh() {
        let node = FakeNode::new();
        node.set_event("job-1", "requested", &[]);
        let (mut poller, relay) = poller(&node);
        poller.poll_once().await;

        node.set_event("job-1", "completed", &[]);
        assert!(poller.poll_once().await);
        let transactions = relay.get(Topic::Transactions).await.unwrap();
        assert!(transactions.payload.contains("completed"));
    }

    #[tokio::test]
    async fn failed_poll_keeps_baseline() {
        let node = FakeNode::new();
        node.set_event("job-1", "requested", &[]);
        let (mut poller, _relay) = poller(&node);
        poller.poll_once().await;

        node.fail_events(true);
        assert!(!poller.poll_once().await);
        node.fail_events(false);
        assert!(!poller.poll_once().await);
    }
}
