//! Configuration loading.
//!
//! Order of precedence, lowest first: built-in defaults, the configuration
//! file, environment variables.

use crate::config::GatewayConfig;
use crate::error::ConfigError;
use secrecy::SecretString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "config/gateway.yaml",
    "config/gateway.yml",
    "config/gateway.toml",
];

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds a [`GatewayConfig`] from a file and the environment
#[derive(Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: EnvLookup,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader reading the process environment
    #[must_use]
    pub fn new() -> Self {
        Self {
            file: None,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Load this file instead of discovering one
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the environment lookup
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Load, apply overrides, and validate
    pub async fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let path = self
            .file
            .clone()
            .or_else(|| self.var(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(discover_config_file);

        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                read_config_file(&path).await?
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                GatewayConfig::default()
            }
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_config()?;

        debug!(
            providers = config.providers.len(),
            port = config.server.port,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Apply environment overrides and resolve API keys
    pub fn apply_env_overrides(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        if let Some(port) = self.parse("PORT")? {
            config.server.port = port;
        }
        if let Some(host) = self.var("GATEWAY_HOST") {
            config.server.host = host;
        }
        if let Some(environment) = self.var("ENVIRONMENT") {
            config.server.environment = environment;
        }
        if let Some(level) = self.var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = self.parse("LOG_FORMAT")? {
            config.logging.format = format;
        }

        if let Some(max) = self.parse("MAX_MESSAGE_LENGTH")? {
            config.limits.max_message_length = max;
        }
        if let Some(min) = self.parse("MIN_MESSAGE_LENGTH")? {
            config.limits.min_message_length = min;
        }
        if let Some(max) = self.parse("MAX_MESSAGES_IN_CONTEXT")? {
            config.limits.max_messages = max;
        }

        if let Some(window_ms) = self.parse::<u64>("RATE_LIMIT_WINDOW_MS")? {
            config.rate_limit.window = Duration::from_millis(window_ms);
        }
        if let Some(max) = self.parse("RATE_LIMIT_MAX_REQUESTS")? {
            config.rate_limit.max_requests = max;
        }

        for provider in &mut config.providers {
            let prefix = provider.env_prefix();

            if let Some(model) = self.var(&format!("{prefix}_MODEL_DEFAULT")) {
                provider.default_model = model;
            }
            if let Some(model) = self.var(&format!("{prefix}_MODEL_FALLBACK")) {
                provider.fallback_model = model;
            }
            if let Some(temperature) = self.parse(&format!("{prefix}_TEMPERATURE"))? {
                provider.temperature = temperature;
            }
            if let Some(max_tokens) = self.parse(&format!("{prefix}_MAX_TOKENS"))? {
                provider.max_tokens = max_tokens;
            }
            if let Some(enabled) = self.parse_bool(&format!("{prefix}_ENABLED"))? {
                provider.enabled = enabled;
            }
            if let Some(limit) = self.parse(&format!("{prefix}_RATE_LIMIT"))? {
                provider.rate_limit = Some(limit);
            }

            if provider.api_key.is_none() {
                if let Some(key) = provider.api_key_env.as_deref().and_then(|name| self.var(name)) {
                    provider.api_key = Some(SecretString::new(key));
                }
            }
        }

        Ok(())
    }

    /// Non-empty value of an environment variable
    fn var(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|value| !value.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        self.var(name)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv {
                        name: name.to_string(),
                        value,
                    })
            })
            .transpose()
    }

    fn parse_bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        self.var(name)
            .map(|value| match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidEnv {
                    name: name.to_string(),
                    value,
                }),
            })
            .transpose()
    }
}

/// Load the configuration from the process environment
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    ConfigLoader::new().load().await
}

fn discover_config_file() -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

async fn read_config_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let parsed = match extension.as_deref() {
        Some("yaml" | "yml") => GatewayConfig::from_yaml_str(&content),
        Some("toml") => GatewayConfig::from_toml_str(&content),
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };

    parsed.map_err(|error| match error {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.display().to_string(),
            message,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_global_overrides() {
        let loader = ConfigLoader::new().with_env(env(&[
            ("PORT", "9000"),
            ("LOG_FORMAT", "json"),
            ("MAX_MESSAGE_LENGTH", "100"),
            ("MAX_MESSAGES_IN_CONTEXT", "5"),
            ("RATE_LIMIT_WINDOW_MS", "60000"),
            ("RATE_LIMIT_MAX_REQUESTS", "60"),
        ]));
        let mut config = GatewayConfig::default();
        loader.apply_env_overrides(&mut config).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.limits.max_message_length, 100);
        assert_eq!(config.limits.max_messages, 5);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.rate_limit.max_requests, 60);
    }

    #[test]
    fn test_provider_overrides_and_keys() {
        let loader = ConfigLoader::new().with_env(env(&[
            ("OPENAI_API_KEY", "sk-live"),
            ("OPENAI_MODEL_DEFAULT", "gpt-4.1"),
            ("OPENAI_TEMPERATURE", "0.9"),
            ("GROQ_ENABLED", "true"),
            ("GEMINI_RATE_LIMIT", "10"),
            ("ANTHROPIC_API_KEY", ""),
        ]));
        let mut config = GatewayConfig::default();
        loader.apply_env_overrides(&mut config).unwrap();

        let gpt = config.provider("gpt").unwrap();
        assert_eq!(gpt.default_model, "gpt-4.1");
        assert_eq!(gpt.fallback_model, "gpt-4o-mini");
        assert!((gpt.temperature - 0.9).abs() < f32::EPSILON);
        assert_eq!(gpt.api_key.as_ref().unwrap().expose_secret(), "sk-live");

        assert!(config.provider("groq").unwrap().enabled);
        assert_eq!(config.provider_budgets()["gemini"], 10);
        assert!(!config.provider("claude").unwrap().has_credential());
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let loader = ConfigLoader::new().with_env(env(&[("PORT", "eighty")]));
        let mut config = GatewayConfig::default();
        let err = loader.apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "PORT"));
    }

    #[test]
    fn test_inline_key_wins_over_env() {
        let loader = ConfigLoader::new().with_env(env(&[("OPENAI_API_KEY", "from-env")]));
        let mut config = GatewayConfig::default();
        config.providers[0].api_key = Some(SecretString::new("inline".to_string()));
        loader.apply_env_overrides(&mut config).unwrap();
        assert_eq!(
            config.providers[0].api_key.as_ref().unwrap().expose_secret(),
            "inline"
        );
    }
}
