//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the starting control port.
pub const PORT_ENV_VAR: &str = "DRAWBRIDGE_PORT";

/// Top-level Drawbridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub planner: Option<PlannerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Starting control port. The data port is always `port - 1`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Highest control port the negotiator may try before giving up.
    #[serde(default = "default_max_port")]
    pub max_port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    3056
}

fn default_max_port() -> u16 {
    3076
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<ProviderConfig>>,

    /// Maximum remote-planner rounds per chat turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,

    /// Per-invocation relay deadline in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_timeout_secs: Option<u64>,
}

/// Configuration for a single remote completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "drawbridge_relay=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::DrawbridgeError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::DrawbridgeError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Starting control port: `DRAWBRIDGE_PORT` wins over the config file.
    pub fn start_port(&self) -> u16 {
        if let Ok(val) = std::env::var(PORT_ENV_VAR) {
            if let Ok(port) = val.parse() {
                return port;
            }
        }
        self.server.as_ref().map(|s| s.port).unwrap_or_else(default_port)
    }

    /// Highest control port the negotiator may try.
    pub fn max_port(&self) -> u16 {
        self.server
            .as_ref()
            .map(|s| s.max_port)
            .unwrap_or_else(default_max_port)
            .max(self.start_port())
    }

    pub fn bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    /// Maximum remote-planner rounds per chat turn.
    pub fn max_rounds(&self) -> u32 {
        self.planner
            .as_ref()
            .and_then(|p| p.max_rounds)
            .unwrap_or(8)
    }

    /// Per-invocation relay deadline.
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(
            self.planner
                .as_ref()
                .and_then(|p| p.dispatch_timeout_secs)
                .unwrap_or(30),
        )
    }

    /// Find a provider config by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.planner
            .as_ref()
            .and_then(|p| p.providers.as_ref())
            .and_then(|p| p.iter().find(|pc| pc.id == id))
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(providers) = self.planner.as_ref().and_then(|p| p.providers.as_ref()) {
            for p in providers {
                if p.id != "local" && p.resolve_api_key().is_none() {
                    warnings.push(format!("Provider '{}' has no API key configured", p.id));
                }
            }
        }

        if let Some(server) = &self.server {
            if server.port <= 1 {
                errors.push("Server port must leave room for the data port below it".to_string());
            }
            if server.max_port < server.port {
                errors.push(format!(
                    "max_port {} is below the starting port {}",
                    server.max_port, server.port
                ));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Drawbridge data: `~/.drawbridge/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".drawbridge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_DB_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_DB_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_DB_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_DB_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#)); // empty string
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.start_port(), 3056);
        assert_eq!(config.max_port(), 3076);
        assert_eq!(config.bind(), "127.0.0.1");
        assert_eq!(config.max_rounds(), 8);
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_provider_resolve_api_key() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_DB_API_KEY", "from-env") };
        let provider = ProviderConfig {
            id: "openai".into(),
            api_key_env: Some("TEST_DB_API_KEY".into()),
            api_key: None,
            base_url: None,
            default_model: None,
        };
        assert_eq!(provider.resolve_api_key(), Some("from-env".into()));

        let provider2 = ProviderConfig {
            id: "openai".into(),
            api_key_env: Some("TEST_DB_API_KEY".into()),
            api_key: Some("direct-key".into()),
            base_url: None,
            default_model: None,
        };
        // Direct key takes priority
        assert_eq!(provider2.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_DB_API_KEY") };
    }

    #[test]
    fn test_config_json5_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                server: { port: 4100, max_port: 4120 },
                planner: { max_rounds: 4 },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.as_ref().unwrap().port, 4100);
        assert_eq!(config.max_rounds(), 4);
    }

    #[test]
    fn test_validate_missing_api_key_warns() {
        let config = Config {
            planner: Some(PlannerConfig {
                providers: Some(vec![ProviderConfig {
                    id: "openai".into(),
                    api_key: None,
                    api_key_env: None,
                    base_url: None,
                    default_model: None,
                }]),
                max_rounds: None,
                dispatch_timeout_secs: None,
            }),
            ..Config::default()
        };
        let (warnings, _errors) = config.validate();
        assert!(
            warnings.iter().any(|w| w.contains("openai") && w.to_lowercase().contains("key")),
            "Expected a warning about missing API key for openai, got: {warnings:?}"
        );
    }

    #[test]
    fn test_logging_config_defaults_and_deser() {
        let config: Config = json5::from_str(r#"{ "logging": {} }"#).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert!(logging.filters.is_empty());

        let config: Config = json5::from_str(
            r#"{ "logging": { "format": "json", "level": "debug", "filters": ["drawbridge_relay=trace"] } }"#,
        )
        .unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "json");
        assert_eq!(logging.level.as_deref(), Some("debug"));
        assert_eq!(logging.filters[0], "drawbridge_relay=trace");
    }

    #[test]
    fn test_validate_inverted_port_range_errors() {
        let config = Config {
            server: Some(ServerConfig {
                port: 4000,
                max_port: 3990,
                bind: None,
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(
            errors.iter().any(|e| e.contains("max_port")),
            "Expected an error about inverted port range, got: {errors:?}"
        );
    }
}
