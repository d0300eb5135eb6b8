/// Failures of a call to the consent node.
///
/// Every variant means "capability unavailable" to the caller; which one occurred only matters for
/// logging.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node transport error: {0}")]
    Transport(reqwest::Error),
    #[error("node call timed out")]
    Timeout,
    #[error("node responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode node response: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("consent creation was not accepted, result code: {result_code}")]
    ConsentCreate { result_code: String },
    #[error("invalid node configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NodeError::Timeout
        } else if e.is_decode() {
            NodeError::Decode(e.to_string())
        } else {
            NodeError::Transport(e)
        }
    }
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;
