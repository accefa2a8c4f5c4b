/// Errors raised by a pipeline engine, either before its event stream exists
/// or while feeding it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// The engine refused to start a run.
    #[error("failed to start pipeline: {0}")]
    Start(String),
    /// The event feed broke mid-run.
    #[error("pipeline event feed failed: {0}")]
    Feed(String),
    /// A replay script could not be read or parsed.
    #[error("invalid pipeline script at line {line}: {message}")]
    Script { line: usize, message: String },
}

impl PipelineError {
    pub fn start(message: impl Into<String>) -> Self {
        Self::Start(message.into())
    }

    pub fn feed(message: impl Into<String>) -> Self {
        Self::Feed(message.into())
    }
}

/// Errors of the HTTP surface and its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config error: {0}")]
    Config(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
