//! Constants used throughout the EHR core crate.

/// Default REST bind address.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Default node base URL.
pub const DEFAULT_NODE_URL: &str = "http://localhost:1323";

/// Default per-call timeout for node requests, in milliseconds.
pub const DEFAULT_NODE_TIMEOUT_MS: u64 = 5_000;

/// Default interval between event-list polls, in seconds.
pub const DEFAULT_EVENT_POLL_SECS: u64 = 10;

/// Default display name of this organisation.
pub const DEFAULT_ORGANISATION_NAME: &str = "Demo EHR";

/// Event-bus subject pattern for consent-request job updates.
pub const CONSENT_REQUEST_SUBJECT_PATTERN: &str = "*.*.*.consentRequest";

/// Prefix of the placeholder name used when an organisation cannot be resolved.
pub const UNRESOLVED_ORGANISATION_PREFIX: &str = "Could not find organisation: ";
