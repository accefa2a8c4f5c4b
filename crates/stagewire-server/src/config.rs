use std::net::SocketAddr;

use crate::errors::ServerError;

const DEFAULT_BIND: &str = "127.0.0.1:8787";
const DEFAULT_MAX_STEPS: u32 = 20;
const DEFAULT_STREAM_BUFFER: usize = 128;

/// HTTP server settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Step ceiling handed to the engine for every run.
    pub max_steps: u32,
    /// Capacity of the channel between the demultiplexer and the response body.
    pub stream_buffer_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            max_steps: DEFAULT_MAX_STEPS,
            stream_buffer_capacity: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Reads `STAGEWIRE_BIND` and `STAGEWIRE_MAX_STEPS`, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let bind_raw = lookup("STAGEWIRE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind_raw.trim().parse().map_err(|e| {
            ServerError::Config(format!("invalid STAGEWIRE_BIND {bind_raw:?}: {e}"))
        })?;
        let max_steps = match lookup("STAGEWIRE_MAX_STEPS") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                ServerError::Config(format!("invalid STAGEWIRE_MAX_STEPS {raw:?}: {e}"))
            })?,
            None => DEFAULT_MAX_STEPS,
        };
        Self::default()
            .bind_addr(bind_addr)
            .max_steps(max_steps)
            .validated()
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub fn validated(self) -> Result<Self, ServerError> {
        if self.stream_buffer_capacity == 0 {
            return Err(ServerError::Config(
                "stream_buffer_capacity must be greater than zero".into(),
            ));
        }
        if self.max_steps == 0 {
            return Err(ServerError::Config("max_steps must be greater than zero".into()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND);
    }

    #[test]
    fn env_overrides_are_parsed() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("STAGEWIRE_BIND", "0.0.0.0:9000"),
            ("STAGEWIRE_MAX_STEPS", " 5 "),
        ]))
        .expect("config");
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_steps, 5);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = ServerConfig::from_lookup(lookup(&[("STAGEWIRE_BIND", "nowhere")]))
            .expect_err("bad bind");
        assert!(err.to_string().contains("STAGEWIRE_BIND"));

        let err = ServerConfig::default()
            .stream_buffer_capacity(0)
            .validated()
            .expect_err("zero buffer");
        assert!(matches!(err, ServerError::Config(_)));
    }
}
