use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INSTALLED: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "stagewire.logs.jsonl";

/// Which side of the stream a process runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Long-running server; may log JSON lines to a file.
    Server,
    /// Terminal client; stderr only, and quiet unless something goes wrong.
    Client,
}

impl Role {
    fn default_directives(self) -> &'static str {
        match self {
            Self::Server => "warn,stagewire_core=info,stagewire_server=info,stagewire_cli=info",
            Self::Client => "error,stagewire_client=warn,stagewire_cli=warn",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    /// Compact human-readable lines; stdout stays free for rendered output.
    Stderr,
    JsonFile(PathBuf),
}

/// Resolved logging settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    /// `EnvFilter` directives, already checked to parse.
    pub directives: String,
    pub sink: LogSink,
}

impl ObservabilityConfig {
    /// Reads the logging environment for `role`:
    ///
    /// - `STAGEWIRE_OBSERVABILITY_ENABLED`: `0`/`false`/`no`/`off` disables logging.
    /// - `STAGEWIRE_LOG_LEVEL`, then `RUST_LOG`: filter directives. Directives
    ///   that do not parse are skipped; the role's per-crate defaults apply last.
    /// - `STAGEWIRE_JSON_LOG_PATH`: JSON-lines log file. Honored for
    ///   [`Role::Server`] only.
    pub fn from_env(role: Role) -> Self {
        Self::from_lookup(role, |key| std::env::var(key).ok())
    }

    fn from_lookup(role: Role, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("STAGEWIRE_OBSERVABILITY_ENABLED").is_none_or(|raw| {
            !matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off" | "disabled"
            )
        });
        let directives = ["STAGEWIRE_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(|key| lookup(key))
            .find(|directives| EnvFilter::try_new(directives).is_ok())
            .unwrap_or_else(|| role.default_directives().to_string());
        let sink = match (role, lookup("STAGEWIRE_JSON_LOG_PATH")) {
            (Role::Server, Some(path)) if !path.trim().is_empty() => {
                LogSink::JsonFile(PathBuf::from(path.trim()))
            }
            _ => LogSink::Stderr,
        };
        Self {
            enabled,
            directives,
            sink,
        }
    }
}

/// Installs the global subscriber once per process; later calls are no-ops.
pub fn install(config: &ObservabilityConfig) {
    INSTALLED.get_or_init(|| {
        if !config.enabled {
            return;
        }
        let filter =
            EnvFilter::try_new(&config.directives).unwrap_or_else(|_| EnvFilter::new("warn"));
        let (json_layer, console_layer) = match &config.sink {
            LogSink::JsonFile(path) => (
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_writer(file_appender(path)),
                ),
                None,
            ),
            LogSink::Stderr => (
                None,
                Some(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                ),
            ),
        };
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(console_layer)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(
                event = "observability.installed",
                domain = "observability",
                sink = ?config.sink,
                directives = %config.directives,
                "logging installed"
            );
        }
    });
}

/// Resolves the environment for `role` and installs it.
pub fn init_observability(role: Role) {
    install(&ObservabilityConfig::from_env(role));
}

fn file_appender(path: &Path) -> RollingFileAppender {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let _ = std::fs::create_dir_all(dir);
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    tracing_appender::rolling::never(dir, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn roles_get_their_own_default_directives() {
        let server = ObservabilityConfig::from_lookup(Role::Server, lookup(&[]));
        assert!(server.enabled);
        assert!(server.directives.contains("stagewire_server=info"));
        assert_eq!(server.sink, LogSink::Stderr);

        let client = ObservabilityConfig::from_lookup(Role::Client, lookup(&[]));
        assert!(client.directives.contains("stagewire_client=warn"));
    }

    #[test]
    fn json_file_is_for_servers_only() {
        let env = [("STAGEWIRE_JSON_LOG_PATH", "logs/serve.jsonl")];
        assert_eq!(
            ObservabilityConfig::from_lookup(Role::Server, lookup(&env)).sink,
            LogSink::JsonFile(PathBuf::from("logs/serve.jsonl"))
        );
        assert_eq!(
            ObservabilityConfig::from_lookup(Role::Client, lookup(&env)).sink,
            LogSink::Stderr
        );
    }

    #[test]
    fn level_override_falls_through_unparseable_directives() {
        let config = ObservabilityConfig::from_lookup(
            Role::Server,
            lookup(&[("STAGEWIRE_LOG_LEVEL", "stagewire_server=loud"), ("RUST_LOG", "debug")]),
        );
        assert_eq!(config.directives, "debug");

        let config = ObservabilityConfig::from_lookup(
            Role::Client,
            lookup(&[("STAGEWIRE_LOG_LEVEL", "trace"), ("RUST_LOG", "debug")]),
        );
        assert_eq!(config.directives, "trace");
    }

    #[test]
    fn disable_flag_is_read() {
        for raw in [" Off ", "0", "false"] {
            let config = ObservabilityConfig::from_lookup(
                Role::Server,
                lookup(&[("STAGEWIRE_OBSERVABILITY_ENABLED", raw)]),
            );
            assert!(!config.enabled, "{raw}");
        }
        let config = ObservabilityConfig::from_lookup(
            Role::Server,
            lookup(&[("STAGEWIRE_OBSERVABILITY_ENABLED", "yes")]),
        );
        assert!(config.enabled);
    }

    #[test]
    fn install_is_idempotent() {
        let config = ObservabilityConfig {
            enabled: false,
            directives: "warn".to_string(),
            sink: LogSink::Stderr,
        };
        install(&config);
        install(&config);
    }
}
