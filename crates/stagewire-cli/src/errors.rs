use stagewire_client::ClientError;
use stagewire_server::{PipelineError, ServerError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to encode record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("terminal io failed: {0}")]
    Io(#[from] std::io::Error),
    /// The stream ended with an error event.
    #[error("pipeline reported: {0}")]
    Remote(String),
}
