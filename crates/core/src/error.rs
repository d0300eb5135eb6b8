use ehr_types::{TextError, UrnError};
use node_client::NodeError;

#[derive(Debug, thiserror::Error)]
pub enum EhrError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("patient not found: {0}")]
    PatientNotFound(String),
    #[error("invalid identifier: {0}")]
    Urn(#[from] UrnError),
    #[error("invalid text: {0}")]
    Text(#[from] TextError),
    #[error("node call failed: {0}")]
    Node(#[from] NodeError),
    #[error("consent ledger unavailable: {0}")]
    Ledger(String),
    #[error("access log unavailable: {0}")]
    AccessLog(String),
    #[error("failed to serialize push payload: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to read seed file: {0}")]
    SeedRead(std::io::Error),
    #[error("failed to parse seed file: {0}")]
    SeedParse(serde_yaml::Error),
}

pub type EhrResult<T> = std::result::Result<T, EhrError>;
