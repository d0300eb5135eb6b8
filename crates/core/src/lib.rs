//! # EHR Core
//!
//! Consent lifecycle and cross-organisation access control for the EHR service.
//!
//! - [`ledger`]: consent requests this organisation submitted and has not seen complete
//! - [`reconcile`]: given, received, inbox and transactions views
//! - [`relay`]: push fan-out of those views to connected clients
//! - [`gate`]: the authorization chain in front of clinical data
//! - [`patients`] and [`access_log`]: local stores
//!
//! **No transport concerns**: HTTP routing, WebSocket framing and header parsing belong in
//! `api-rest` and `api-shared`. Node access goes through the `node-client` capability traits.

pub mod access_log;
pub mod config;
pub mod consent;
pub mod constants;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod patients;
pub mod poller;
pub mod reconcile;
pub mod relay;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use access_log::{AccessAuditEntry, AccessLog, InMemoryAccessLog};
pub use config::ServiceConfig;
pub use consent::ConsentRequester;
pub use error::{EhrError, EhrResult};
pub use gate::{AccessRequest, AuthorizationGate, Denial, IdentityContractPolicy, RequestContext};
pub use ledger::{ConsentInTransit, ConsentLedger, InMemoryConsentLedger, RecordOutcome};
pub use patients::{InMemoryRecords, Observation, ObservationStore, Patient, PatientStore, SeedData};
pub use reconcile::{ConsentReconciler, EffectiveConsentRecord, InboxEntry, Transaction};
pub use relay::{ConnectionId, NotificationRelay, PushMessage, Topic};
pub use services::EhrServices;
