//! Configuration management for chatrelay
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Provider descriptors are fixed for the lifetime of the process; the runtime
//! ordering of providers lives in the priority store, not here.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for any single provider call (5 minutes)
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;

/// Upper bound for per-provider attempts
pub const MAX_ATTEMPTS_PER_PROVIDER: usize = 10;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub availability: AvailabilityConfig,
    #[serde(default)]
    pub priority_store: PriorityStoreConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    pub providers: Vec<ProviderDescriptor>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Wire format spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ProviderApi {
    /// OpenAI-compatible `POST {base_url}/chat/completions` (Groq, OpenRouter, ...)
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini `POST {base_url}/models/{model}:generateContent`
    #[serde(rename = "gemini")]
    Gemini,
}

impl ProviderApi {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

/// Static description of one external AI provider
///
/// All fields are private to enforce invariants. Descriptors are loaded via
/// deserialization and validated via `Config::validate()`. The `model` here is
/// only the default: the priority store entry's model wins at request time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderDescriptor {
    id: String,
    display_name: String,
    api: ProviderApi,
    base_url: String,
    credential_env: String,
    #[serde(default)]
    credential_prefix: String,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    model: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f64,
    /// Upper bound for caller-supplied temperature overrides
    #[serde(default = "default_max_temperature")]
    max_temperature: f64,
}

impl ProviderDescriptor {
    /// Unique provider identifier (e.g. "groq")
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name reported in responses (e.g. "Groq")
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn api(&self) -> ProviderApi {
        self.api
    }

    /// Base URL without trailing slash (e.g. "https://api.groq.com/openai/v1")
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Name of the credential key read from the credential source
    pub fn credential_env(&self) -> &str {
        &self.credential_env
    }

    /// Prefix every well-formed credential for this provider starts with
    pub fn credential_prefix(&self) -> &str {
        &self.credential_prefix
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    /// Per-call timeout for this provider
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Default model (used when seeding a fresh priority store)
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Default and maximum completion length
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Default sampling temperature
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_temperature(&self) -> f64 {
        self.max_temperature
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_temperature() -> f64 {
    2.0
}

/// Retry and backoff policy applied per provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackConfig {
    /// Attempts against one provider before falling through to the next
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_provider: usize,
    /// Base backoff in milliseconds (doubles each retry)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Extra multiplier applied when the provider reported a temporary outage
    #[serde(default = "default_unavailable_multiplier")]
    pub unavailable_backoff_multiplier: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_provider: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            unavailable_backoff_multiplier: default_unavailable_multiplier(),
        }
    }
}

fn default_max_attempts() -> usize {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_unavailable_multiplier() -> u32 {
    3
}

/// Credential gate settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AvailabilityConfig {
    /// How long an availability verdict is reused before re-validating
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Credentials this short or shorter are treated as placeholders
    #[serde(default = "default_min_credential_length")]
    pub min_credential_length: usize,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            min_credential_length: default_min_credential_length(),
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    5_000
}

fn default_min_credential_length() -> usize {
    10
}

/// Location of the persisted provider ordering
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriorityStoreConfig {
    #[serde(default = "default_priority_store_path")]
    pub path: PathBuf,
}

impl Default for PriorityStoreConfig {
    fn default() -> Self {
        Self {
            path: default_priority_store_path(),
        }
    }
}

fn default_priority_store_path() -> PathBuf {
    PathBuf::from("priorities.json")
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            crate::error::AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self = toml::from_str(&content).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| crate::error::AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Look up a provider descriptor by id
    pub fn provider(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()` and `from_str()`, but can
    /// also be called explicitly when a config is built via `toml::from_str`.
    pub fn validate(&self) -> crate::error::AppResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "Configuration error: server.host cannot be empty.\n\n\
                Example fix - in config.toml:\n\
                [server]\n\
                host = \"127.0.0.1\""
                    .to_string(),
            ));
        }

        if self.providers.is_empty() {
            return Err(crate::error::AppError::Config(
                "Configuration error: no [[providers]] configured. \
                At least one provider is required.\n\n\
                Example fix - add to config.toml:\n\
                [[providers]]\n\
                id = \"groq\"\n\
                display_name = \"Groq\"\n\
                api = \"openai\"\n\
                base_url = \"https://api.groq.com/openai/v1\"\n\
                credential_env = \"GROQ_API_KEY\"\n\
                credential_prefix = \"gsk_\"\n\
                model = \"llama-3.3-70b-versatile\""
                    .to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(crate::error::AppError::Config(
                    "Configuration error: provider id cannot be empty".to_string(),
                ));
            }

            if !seen.insert(provider.id.as_str()) {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: duplicate provider id '{}'. Provider ids must be unique.",
                    provider.id
                )));
            }

            if provider.credential_env.trim().is_empty() {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: provider '{}' has an empty credential_env.",
                    provider.id
                )));
            }

            if provider.model.trim().is_empty() {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: provider '{}' has an empty default model.",
                    provider.id
                )));
            }

            if !provider.base_url.starts_with("http://")
                && !provider.base_url.starts_with("https://")
            {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: provider '{}' has invalid base_url '{}'. \
                    base_url must start with 'http://' or 'https://'.",
                    provider.id, provider.base_url
                )));
            }

            if provider.request_timeout_ms == 0 {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: provider '{}' request_timeout_ms must be greater than 0",
                    provider.id
                )));
            }
            // Upper bound also rejects u64::MAX and friends before they reach Duration math
            if provider.request_timeout_ms > MAX_REQUEST_TIMEOUT_MS {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: provider '{}' request_timeout_ms cannot exceed {} (5 minutes), got {}",
                    provider.id, MAX_REQUEST_TIMEOUT_MS, provider.request_timeout_ms
                )));
            }

            if provider.max_tokens == 0 {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: provider '{}' has max_tokens=0. \
                    max_tokens must be greater than 0.",
                    provider.id
                )));
            }

            if !provider.max_temperature.is_finite()
                || provider.max_temperature <= 0.0
                || provider.max_temperature > 2.0
            {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: provider '{}' has invalid max_temperature {}. \
                    max_temperature must be in (0.0, 2.0].",
                    provider.id, provider.max_temperature
                )));
            }

            if !provider.temperature.is_finite()
                || provider.temperature < 0.0
                || provider.temperature > provider.max_temperature
            {
                return Err(crate::error::AppError::Config(format!(
                    "Configuration error: provider '{}' has invalid temperature {}. \
                    temperature must be a finite number between 0.0 and {}.",
                    provider.id, provider.temperature, provider.max_temperature
                )));
            }
        }

        if self.fallback.max_attempts_per_provider == 0
            || self.fallback.max_attempts_per_provider > MAX_ATTEMPTS_PER_PROVIDER
        {
            return Err(crate::error::AppError::Config(format!(
                "Configuration error: fallback.max_attempts_per_provider must be between 1 and {}, got {}",
                MAX_ATTEMPTS_PER_PROVIDER, self.fallback.max_attempts_per_provider
            )));
        }

        if self.fallback.unavailable_backoff_multiplier == 0 {
            return Err(crate::error::AppError::Config(
                "Configuration error: fallback.unavailable_backoff_multiplier must be at least 1"
                    .to_string(),
            ));
        }

        if self.priority_store.path.as_os_str().is_empty() {
            return Err(crate::error::AppError::Config(
                "Configuration error: priority_store.path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = crate::error::AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(toml_str).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            }
        })?;

        config.validate()?;
        Ok(config)
    }
}
