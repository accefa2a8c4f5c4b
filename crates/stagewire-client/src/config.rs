use std::time::Duration;

use crate::errors::ClientError;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";
const DEFAULT_ENDPOINT: &str = "/api/pipeline";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for [`crate::PipelineClient`].
///
/// There is no whole-request deadline: a response lasts as long as the
/// pipeline keeps streaming, and only the caller's abort ends it early.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub endpoint: String,
    /// Bound on establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Optional idle bound between two body reads.
    pub read_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: None,
        }
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ClientError> {
    raw.trim()
        .parse()
        .map(Duration::from_secs)
        .map_err(|e| ClientError::Config(format!("invalid {key} {raw:?}: {e}")))
}

impl ClientConfig {
    /// Reads `STAGEWIRE_SERVER_URL`, `STAGEWIRE_CLIENT_CONNECT_TIMEOUT_SECS`
    /// and `STAGEWIRE_CLIENT_READ_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(url) = lookup("STAGEWIRE_SERVER_URL") {
            config = config.base_url(url);
        }
        let connect_key = "STAGEWIRE_CLIENT_CONNECT_TIMEOUT_SECS";
        if let Some(raw) = lookup(connect_key) {
            config = config.connect_timeout(parse_secs(connect_key, &raw)?);
        }
        let read_key = "STAGEWIRE_CLIENT_READ_TIMEOUT_SECS";
        if let Some(raw) = lookup(read_key) {
            config = config.read_timeout(parse_secs(read_key, &raw)?);
        }
        config.validated()
    }

    /// Overrides the server base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn validated(self) -> Result<Self, ClientError> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base url must be http(s), got {:?}",
                self.base_url
            )));
        }
        if self.connect_timeout.is_zero() || self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ClientError::Config("timeouts must be greater than zero".into()));
        }
        Ok(self)
    }

    pub fn pipeline_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim().trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}
