//! Push fan-out of reconciled views to connected clients.
//!
//! Each connection gets an unbounded channel of [`PushMessage`]s and may watch one patient at a
//! time. Global topics (`inbox`, `transactions`) go to every connection and keep their last value
//! for on-demand `get`. Per-patient topics (`givenConsents`, `receivedConsents`, `logs`) only go to
//! connections watching that patient.
//!
//! A matching consent-request event triggers a full recompute. Recomputes are serialised, and
//! within one recompute messages go out in the order inbox, transactions, per-patient views.

use crate::access_log::{AccessAuditEntry, AccessLog};
use crate::constants::CONSENT_REQUEST_SUBJECT_PATTERN;
use crate::patients::PatientStore;
use crate::reconcile::ConsentReconciler;
use crate::{EhrError, EhrResult};
use ehr_types::Urn;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type ConnectionId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Topic {
    Inbox,
    Transactions,
    GivenConsents,
    ReceivedConsents,
    Logs,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Inbox => "inbox",
            Topic::Transactions => "transactions",
            Topic::GivenConsents => "givenConsents",
            Topic::ReceivedConsents => "receivedConsents",
            Topic::Logs => "logs",
        }
    }

    /// Global topics are shared by all connections and keep a last-known value.
    pub fn is_global(self) -> bool {
        matches!(self, Topic::Inbox | Topic::Transactions)
    }
}

impl std::str::FromStr for Topic {
    type Err = EhrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Topic::Inbox,
            Topic::Transactions,
            Topic::GivenConsents,
            Topic::ReceivedConsents,
            Topic::Logs,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| EhrError::InvalidInput(format!("unknown topic '{s}'")))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A topic with its payload already serialised, so one recompute is encoded once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushMessage {
    pub topic: Topic,
    pub payload: Arc<str>,
}

impl PushMessage {
    pub fn new<T: Serialize>(topic: Topic, value: &T) -> EhrResult<Self> {
        let payload = serde_json::to_string(value).map_err(EhrError::Serialization)?;
        Ok(Self {
            topic,
            payload: payload.into(),
        })
    }

    /// `{"topic":...,"payload":...}` as sent over the push channel.
    pub fn to_frame(&self) -> EhrResult<String> {
        let payload: &RawValue =
            serde_json::from_str(&self.payload).map_err(EhrError::Serialization)?;
        serde_json::to_string(&Frame {
            topic: self.topic,
            payload,
        })
        .map_err(EhrError::Serialization)
    }
}

#[derive(Serialize)]
struct Frame<'a> {
    topic: Topic,
    payload: &'a RawValue,
}

/// Returns true when `subject` matches `pattern`, where a `*` segment matches any one segment.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_parts = pattern.split('.');
    let mut subject_parts = subject.split('.');
    loop {
        match (pattern_parts.next(), subject_parts.next()) {
            (None, None) => return true,
            (Some("*"), Some(s)) if !s.is_empty() => {}
            (Some(p), Some(s)) if p == s => {}
            _ => return false,
        }
    }
}

struct Connection {
    sender: mpsc::UnboundedSender<PushMessage>,
    watched_patient: Option<String>,
}

/// Live connections and the patient each one watches.
#[derive(Default)]
pub struct SubscriptionRegistry {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl SubscriptionRegistry {
    pub async fn add(&self, sender: mpsc::UnboundedSender<PushMessage>) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.lock().await.insert(
            id,
            Connection {
                sender,
                watched_patient: None,
            },
        );
        id
    }

    pub async fn remove(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.remove(&id).is_some()
    }

    /// Replaces the connection's watched patient. Returns false for an unknown connection.
    pub async fn set_watch(&self, id: ConnectionId, patient_id: &str) -> bool {
        match self.connections.lock().await.get_mut(&id) {
            Some(connection) => {
                connection.watched_patient = Some(patient_id.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn watched_by(&self, id: ConnectionId) -> Option<String> {
        self.connections
            .lock()
            .await
            .get(&id)
            .and_then(|c| c.watched_patient.clone())
    }

    /// Distinct watched patient ids, sorted.
    pub async fn watched_patients(&self) -> Vec<String> {
        self.connections
            .lock()
            .await
            .values()
            .filter_map(|c| c.watched_patient.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sends to one connection regardless of what it watches.
    pub async fn send_to(&self, id: ConnectionId, message: PushMessage) -> bool {
        match self.connections.lock().await.get(&id) {
            Some(c) => c.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Sends only if `id` still watches `patient_id`.
    pub async fn send_if_watching(
        &self,
        id: ConnectionId,
        patient_id: &str,
        message: PushMessage,
    ) -> bool {
        let connections = self.connections.lock().await;
        match connections.get(&id) {
            Some(c) if c.watched_patient.as_deref() == Some(patient_id) => {
                c.sender.send(message).is_ok()
            }
            _ => false,
        }
    }

    /// Sends to every connection watching `patient_id`; returns how many received it.
    pub async fn send_to_watchers(&self, patient_id: &str, message: &PushMessage) -> usize {
        let mut connections = self.connections.lock().await;
        let mut delivered = 0;
        connections.retain(|_, c| {
            if c.watched_patient.as_deref() != Some(patient_id) {
                return true;
            }
            let open = c.sender.send(message.clone()).is_ok();
            delivered += usize::from(open);
            open
        });
        delivered
    }

    /// Sends to every connection, dropping those whose receiver is gone.
    pub async fn broadcast(&self, message: &PushMessage) -> usize {
        let mut connections = self.connections.lock().await;
        connections.retain(|_, c| c.sender.send(message.clone()).is_ok());
        connections.len()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

pub struct NotificationRelay {
    reconciler: Arc<ConsentReconciler>,
    patients: Arc<dyn PatientStore>,
    access_log: Arc<dyn AccessLog>,
    registry: SubscriptionRegistry,
    last_values: RwLock<HashMap<Topic, PushMessage>>,
    refresh_lock: Mutex<()>,
}

impl NotificationRelay {
    pub fn new(
        reconciler: Arc<ConsentReconciler>,
        patients: Arc<dyn PatientStore>,
        access_log: Arc<dyn AccessLog>,
    ) -> Self {
        Self {
            reconciler,
            patients,
            access_log,
            registry: SubscriptionRegistry::default(),
            last_values: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<PushMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.registry.add(tx).await;
        tracing::debug!("push connection {id} opened");
        (id, rx)
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        if self.registry.remove(id).await {
            tracing::debug!("push connection {id} closed");
        }
    }

    /// Watches `patient_id` on this connection, replacing any earlier watch, and pushes the
    /// patient's current views straight away.
    ///
    /// Runs under the refresh lock, so a recompute started meanwhile pushes after these views.
    ///
    /// # Errors
    ///
    /// `EhrError::PatientNotFound` for an unknown patient, in which case the previous watch stays.
    pub async fn subscribe(&self, id: ConnectionId, patient_id: &str) -> EhrResult<()> {
        let _serialised = self.refresh_lock.lock().await;

        let patient = self.patients.by_id(patient_id).await?;
        let subject = patient.subject_urn()?;
        if !self.registry.set_watch(id, patient_id).await {
            return Err(EhrError::InvalidInput(format!("unknown connection {id}")));
        }
        tracing::debug!("connection {id} watches patient {patient_id}");

        for message in self.patient_messages(patient_id, &subject).await? {
            self.registry.send_if_watching(id, patient_id, message).await;
        }
        Ok(())
    }

    /// Last published value of a global topic. Per-patient topics have none.
    pub async fn get(&self, topic: Topic) -> Option<PushMessage> {
        if !topic.is_global() {
            return None;
        }
        self.last_values.read().await.get(&topic).cloned()
    }

    /// Sends the last value of `topic` to one connection. Nothing is sent when there is none.
    pub async fn reply_with_last(&self, id: ConnectionId, topic: Topic) -> bool {
        match self.get(topic).await {
            Some(message) => self.registry.send_to(id, message).await,
            None => false,
        }
    }

    /// Stores and broadcasts a global message.
    pub async fn publish(&self, message: PushMessage) -> EhrResult<()> {
        if !message.topic.is_global() {
            return Err(EhrError::InvalidInput(format!(
                "{} is a per-patient topic",
                message.topic
            )));
        }
        self.last_values
            .write()
            .await
            .insert(message.topic, message.clone());
        self.registry.broadcast(&message).await;
        Ok(())
    }

    /// Full recompute: inbox, then transactions, then every watched patient's views.
    ///
    /// A patient whose views cannot be built is logged and skipped; the others still get theirs.
    pub async fn refresh_all(&self) -> EhrResult<()> {
        let _serialised = self.refresh_lock.lock().await;

        let inbox = self.reconciler.inbox().await;
        self.publish(PushMessage::new(Topic::Inbox, &inbox)?).await?;
        let transactions = self.reconciler.transactions().await;
        self.publish(PushMessage::new(Topic::Transactions, &transactions)?)
            .await?;

        for patient_id in self.registry.watched_patients().await {
            let subject = match self.patients.by_id(&patient_id).await {
                Ok(patient) => match patient.subject_urn() {
                    Ok(subject) => subject,
                    Err(e) => {
                        tracing::warn!("watched patient {patient_id} has an unusable BSN: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    tracing::warn!("watched patient {patient_id} no longer resolvable: {e}");
                    continue;
                }
            };
            let messages = match self.patient_messages(&patient_id, &subject).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!("views for watched patient {patient_id} unavailable: {e}");
                    continue;
                }
            };
            for message in messages {
                self.registry.send_to_watchers(&patient_id, &message).await;
            }
        }
        Ok(())
    }

    /// Recomputes when `subject` is a consent-request event. Returns whether it did.
    pub async fn handle_event(&self, subject: &str) -> EhrResult<bool> {
        if !subject_matches(CONSENT_REQUEST_SUBJECT_PATTERN, subject) {
            tracing::debug!("ignoring event on {subject}");
            return Ok(false);
        }
        tracing::info!("consent event on {subject}, refreshing views");
        self.refresh_all().await?;
        Ok(true)
    }

    /// Pushes the refreshed access log to connections watching the entry's patient.
    pub async fn notify_access_logged(&self, patient_id: &str) -> EhrResult<()> {
        let logs = self.access_log.by_patient_id(patient_id).await?;
        let message = PushMessage::new(Topic::Logs, &logs)?;
        self.registry.send_to_watchers(patient_id, &message).await;
        Ok(())
    }

    /// Forwards every stored access entry to [`Self::notify_access_logged`] until the log closes.
    pub fn spawn_access_log_listener(
        self: Arc<Self>,
        mut stored: broadcast::Receiver<AccessAuditEntry>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match stored.recv().await {
                    Ok(entry) => {
                        if let Err(e) = self.notify_access_logged(&entry.patient_id).await {
                            tracing::warn!("could not push access log: {e}");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("access log listener skipped {skipped} entries");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn patient_messages(
        &self,
        patient_id: &str,
        subject: &Urn,
    ) -> EhrResult<Vec<PushMessage>> {
        let given = self.reconciler.given(subject).await;
        let received = self.reconciler.received(subject).await;
        let logs = self.access_log.by_patient_id(patient_id).await?;
        Ok(vec![
            PushMessage::new(Topic::GivenConsents, &given)?,
            PushMessage::new(Topic::ReceivedConsents, &received)?,
            PushMessage::new(Topic::Logs, &logs)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::InMemoryAccessLog;
    use crate::ledger::{ConsentInTransit, ConsentLedger, InMemoryConsentLedger};
    use crate::patients::{InMemoryRecords, SeedData};
    use crate::testing::FakeNode;
    use async_trait::async_trait;
    use ehr_types::NonEmptyText;
    use node_client::{
        ConsentCheck, ConsentQuery, ConsentQueryResult, ConsentStoreApi, NodeCapabilities,
        NodeResult,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    const SELF_URN: &str = "urn:oid:2.16.840.1.113883.2.4.6.1:00000007";
    const ORG_A: &str = "urn:oid:2.16.840.1.113883.2.4.6.1:00000001";
    const FRED: &str = "urn:oid:2.16.840.1.113883.2.4.6.3:999999990";
    const INGRID: &str = "urn:oid:2.16.840.1.113883.2.4.6.3:999999011";

    struct Fixture {
        node: Arc<FakeNode>,
        log: Arc<InMemoryAccessLog>,
        relay: Arc<NotificationRelay>,
    }

    fn relay_over(
        node: NodeCapabilities,
        ledger: Arc<InMemoryConsentLedger>,
        log: Arc<dyn AccessLog>,
    ) -> Arc<NotificationRelay> {
        let records = Arc::new(InMemoryRecords::new(SeedData::demo()));
        let reconciler = Arc::new(ConsentReconciler::new(
            node,
            ledger,
            records.clone(),
            Urn::parse(SELF_URN).unwrap(),
        ));
        Arc::new(NotificationRelay::new(reconciler, records, log))
    }

    fn fixture() -> Fixture {
        let node = FakeNode::new();
        node.add_organisation(ORG_A, "Huisartsenpraktijk A");
        let log = Arc::new(InMemoryAccessLog::new());
        let relay = relay_over(
            node.capabilities(),
            Arc::new(InMemoryConsentLedger::new()),
            log.clone(),
        );
        Fixture { node, log, relay }
    }

    /// Holds the first query open after it has read the node, until `resume` is notified.
    struct StallingConsentStore {
        inner: Arc<dyn ConsentStoreApi>,
        stalled: AtomicBool,
        reached: Notify,
        resume: Notify,
    }

    #[async_trait]
    impl ConsentStoreApi for StallingConsentStore {
        async fn query(&self, query: &ConsentQuery) -> NodeResult<ConsentQueryResult> {
            let result = self.inner.query(query).await;
            if !self.stalled.swap(true, Ordering::SeqCst) {
                self.reached.notify_one();
                self.resume.notified().await;
            }
            result
        }

        async fn check(
            &self,
            subject: &Urn,
            actor: &Urn,
            custodian: &Urn,
        ) -> NodeResult<ConsentCheck> {
            self.inner.check(subject, actor, custodian).await
        }
    }

    /// Access log whose reads fail for one patient.
    struct UnreadableFor {
        inner: InMemoryAccessLog,
        patient_id: &'static str,
    }

    #[async_trait]
    impl AccessLog for UnreadableFor {
        async fn store(&self, entry: AccessAuditEntry) -> EhrResult<()> {
            self.inner.store(entry).await
        }

        async fn by_patient_id(&self, patient_id: &str) -> EhrResult<Vec<AccessAuditEntry>> {
            if patient_id == self.patient_id {
                return Err(EhrError::AccessLog("storage unavailable".into()));
            }
            self.inner.by_patient_id(patient_id).await
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PushMessage>) -> Vec<PushMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn topics(messages: &[PushMessage]) -> Vec<Topic> {
        messages.iter().map(|m| m.topic).collect()
    }

    #[test]
    fn subject_wildcards_match_single_segments() {
        assert!(subject_matches("*.*.*.consentRequest", "nuts.consent.bridge.consentRequest"));
        assert!(!subject_matches("*.*.*.consentRequest", "nuts.consent.consentRequest"));
        assert!(!subject_matches("*.*.*.consentRequest", "a.b.c.consentRequest.extra"));
        assert!(!subject_matches("*.*.*.consentRequest", "a..c.consentRequest"));
        assert!(!subject_matches("*.*.*.consentRequest", "a.b.c.other"));
    }

    #[test]
    fn topics_parse_from_wire_names() {
        assert_eq!("givenConsents".parse::<Topic>().unwrap(), Topic::GivenConsents);
        assert!("GivenConsents".parse::<Topic>().is_err());
    }

    #[test]
    fn frame_embeds_payload_as_json() {
        let message = PushMessage::new(Topic::Inbox, &Vec::<u8>::new()).unwrap();
        let frame: serde_json::Value =
            serde_json::from_str(&message.to_frame().unwrap()).unwrap();
        assert_eq!(frame["topic"], "inbox");
        assert!(frame["payload"].as_array().unwrap().is_empty());
    }

    #[test]
    fn frame_keeps_payload_strings_intact() {
        let message =
            PushMessage::new(Topic::GivenConsents, &json!({"name": "Zorg \"B\"\n"})).unwrap();
        let frame: serde_json::Value =
            serde_json::from_str(&message.to_frame().unwrap()).unwrap();
        assert_eq!(frame["topic"], "givenConsents");
        assert_eq!(frame["payload"]["name"], "Zorg \"B\"\n");
    }

    #[tokio::test]
    async fn subscribe_pushes_current_patient_views() {
        let fx = fixture();
        fx.node.add_consent(FRED, ORG_A, SELF_URN);
        let (id, mut rx) = fx.relay.connect().await;

        fx.relay.subscribe(id, "1").await.unwrap();
        let messages = drain(&mut rx);
        assert_eq!(
            topics(&messages),
            [Topic::GivenConsents, Topic::ReceivedConsents, Topic::Logs]
        );
        assert!(messages[0].payload.contains("Huisartsenpraktijk A"));
    }

    #[tokio::test]
    async fn unknown_patient_keeps_previous_watch() {
        let fx = fixture();
        let (id, _rx) = fx.relay.connect().await;
        fx.relay.subscribe(id, "1").await.unwrap();
        assert!(matches!(
            fx.relay.subscribe(id, "404").await,
            Err(EhrError::PatientNotFound(_))
        ));
        assert_eq!(fx.relay.registry().watched_by(id).await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn resubscribe_moves_pushes_to_new_patient() {
        let fx = fixture();
        fx.node.add_consent(FRED, ORG_A, SELF_URN);
        fx.node.add_consent(INGRID, ORG_A, SELF_URN);
        let (id, mut rx) = fx.relay.connect().await;

        fx.relay.subscribe(id, "1").await.unwrap();
        fx.relay.subscribe(id, "2").await.unwrap();
        drain(&mut rx);

        fx.relay.refresh_all().await.unwrap();
        fx.relay.notify_access_logged("1").await.unwrap();
        let messages = drain(&mut rx);
        assert_eq!(
            topics(&messages),
            [
                Topic::Inbox,
                Topic::Transactions,
                Topic::GivenConsents,
                Topic::ReceivedConsents,
                Topic::Logs
            ]
        );
        assert!(messages[2].payload.contains(INGRID));
        assert!(messages.iter().all(|m| !m.payload.contains(FRED)));
    }

    #[tokio::test]
    async fn refresh_during_subscribe_is_pushed_last() {
        let node = FakeNode::new();
        node.add_organisation(ORG_A, "Huisartsenpraktijk A");
        node.set_event("job-1", "requested", &[ORG_A]);
        let ledger = Arc::new(InMemoryConsentLedger::new());
        ledger
            .record(ConsentInTransit::new(
                "job-1",
                Urn::parse(FRED).unwrap(),
                Urn::parse(ORG_A).unwrap(),
                Urn::parse(SELF_URN).unwrap(),
                NonEmptyText::new("treatment").unwrap(),
            ))
            .await
            .unwrap();
        let store = Arc::new(StallingConsentStore {
            inner: node.capabilities().consent_store,
            stalled: AtomicBool::new(false),
            reached: Notify::new(),
            resume: Notify::new(),
        });
        let mut capabilities = node.capabilities();
        capabilities.consent_store = store.clone();
        let relay = relay_over(capabilities, ledger, Arc::new(InMemoryAccessLog::new()));
        let (id, mut rx) = relay.connect().await;

        let subscribing = tokio::spawn({
            let relay = relay.clone();
            async move { relay.subscribe(id, "1").await }
        });
        store.reached.notified().await;

        node.set_event("job-1", "completed", &[ORG_A]);
        node.add_consent(FRED, ORG_A, SELF_URN);
        let refreshing = tokio::spawn({
            let relay = relay.clone();
            async move { relay.handle_event("a.b.c.consentRequest").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.resume.notify_one();

        subscribing.await.unwrap().unwrap();
        assert!(refreshing.await.unwrap().unwrap());

        let last_given = drain(&mut rx)
            .into_iter()
            .filter(|m| m.topic == Topic::GivenConsents)
            .last()
            .expect("given view pushed");
        let rows: serde_json::Value = serde_json::from_str(&last_given.payload).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["pending"], false);
    }

    #[tokio::test]
    async fn one_failing_patient_does_not_starve_other_watchers() {
        let node = FakeNode::new();
        let log = Arc::new(UnreadableFor {
            inner: InMemoryAccessLog::new(),
            patient_id: "1",
        });
        let relay = relay_over(
            node.capabilities(),
            Arc::new(InMemoryConsentLedger::new()),
            log,
        );
        let (first, mut rx1) = relay.connect().await;
        let (second, mut rx2) = relay.connect().await;
        assert!(relay.registry().set_watch(first, "1").await);
        assert!(relay.registry().set_watch(second, "2").await);

        relay.refresh_all().await.unwrap();

        assert_eq!(topics(&drain(&mut rx1)), [Topic::Inbox, Topic::Transactions]);
        assert_eq!(
            topics(&drain(&mut rx2)),
            [
                Topic::Inbox,
                Topic::Transactions,
                Topic::GivenConsents,
                Topic::ReceivedConsents,
                Topic::Logs
            ]
        );
    }

    #[tokio::test]
    async fn get_returns_last_global_value_only() {
        let fx = fixture();
        assert!(fx.relay.get(Topic::Inbox).await.is_none());

        fx.node.set_event("job-1", "requested", &[ORG_A]);
        fx.relay.refresh_all().await.unwrap();

        let transactions = fx.relay.get(Topic::Transactions).await.unwrap();
        assert!(transactions.payload.contains("job-1"));
        assert!(fx.relay.get(Topic::GivenConsents).await.is_none());

        let (id, mut rx) = fx.relay.connect().await;
        assert!(fx.relay.reply_with_last(id, Topic::Transactions).await);
        assert!(!fx.relay.reply_with_last(id, Topic::Logs).await);
        assert_eq!(topics(&drain(&mut rx)), [Topic::Transactions]);
    }

    #[tokio::test]
    async fn republishing_same_state_is_byte_identical() {
        let fx = fixture();
        fx.node.set_event("job-1", "requested", &[ORG_A]);
        fx.relay.refresh_all().await.unwrap();
        let first = fx.relay.get(Topic::Transactions).await.unwrap();
        fx.relay.refresh_all().await.unwrap();
        let second = fx.relay.get(Topic::Transactions).await.unwrap();
        assert_eq!(first.payload, second.payload);
    }

    #[tokio::test]
    async fn only_consent_request_events_trigger_refresh() {
        let fx = fixture();
        assert!(!fx.relay.handle_event("nuts.registry.update").await.unwrap());
        assert_eq!(fx.node.calls().events_list, 0);

        assert!(fx
            .relay
            .handle_event("nuts.consent.bridge.consentRequest")
            .await
            .unwrap());
        assert_eq!(fx.node.calls().events_list, 1);
    }

    #[tokio::test]
    async fn disconnected_connections_stop_receiving() {
        let fx = fixture();
        let (first, _rx1) = fx.relay.connect().await;
        let (_second, mut rx2) = fx.relay.connect().await;
        fx.relay.disconnect(first).await;

        fx.relay.refresh_all().await.unwrap();
        assert_eq!(fx.relay.registry().len().await, 1);
        assert_eq!(topics(&drain(&mut rx2)), [Topic::Inbox, Topic::Transactions]);
    }

    #[tokio::test]
    async fn stored_access_entries_reach_watchers() {
        let fx = fixture();
        let listener = fx
            .relay
            .clone()
            .spawn_access_log_listener(fx.log.subscribe_stored());
        let (id, mut rx) = fx.relay.connect().await;
        fx.relay.subscribe(id, "1").await.unwrap();
        drain(&mut rx);

        fx.log
            .store(AccessAuditEntry::new("1", ORG_A, "Dr. Visser"))
            .await
            .unwrap();
        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("push should arrive")
            .expect("channel open");
        assert_eq!(message.topic, Topic::Logs);
        assert!(message.payload.contains("Dr. Visser"));
        listener.abort();
    }
}
