//! Credential-based availability gate
//!
//! Decides locally, without any network call, whether a provider is worth
//! attempting: its credential must be present, carry the provider's expected
//! prefix, and be longer than a minimum length so empty-but-present
//! placeholders ("changeme", "xxx") are rejected.
//!
//! Verdicts are cached per provider for a short TTL. Staleness is bounded by
//! the TTL; `invalidate()` drops the cache immediately.

use crate::config::{AvailabilityConfig, ProviderDescriptor};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read-only key/value source of provider credentials
///
/// The process environment in production; a static map in tests or when
/// credentials come from a secret manager.
pub trait CredentialSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads credentials from process environment variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory credential map
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one credential
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticCredentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Why a credential was rejected (never includes the credential itself)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRejection {
    Missing,
    WrongPrefix,
    TooShort,
}

impl CredentialRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::WrongPrefix => "wrong_prefix",
            Self::TooShort => "too_short",
        }
    }
}

/// Validate the shape of a credential value
///
/// The value is trimmed first. Length is counted in characters and must be
/// strictly greater than `min_length`.
pub fn check_credential(
    value: Option<&str>,
    prefix: &str,
    min_length: usize,
) -> Result<(), CredentialRejection> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(CredentialRejection::Missing);
    }
    if !value.starts_with(prefix) {
        return Err(CredentialRejection::WrongPrefix);
    }
    if value.chars().count() <= min_length {
        return Err(CredentialRejection::TooShort);
    }
    Ok(())
}

/// Derived availability for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityResult {
    pub provider_id: String,
    pub available: bool,
}

#[derive(Debug, Clone, Copy)]
struct CachedVerdict {
    available: bool,
    checked_at: Instant,
}

/// Per-provider credential presence/shape check with a short-lived cache
pub struct AvailabilityGate {
    credentials: Arc<dyn CredentialSource>,
    min_length: usize,
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedVerdict>>,
}

impl AvailabilityGate {
    pub fn new(credentials: Arc<dyn CredentialSource>, config: &AvailabilityConfig) -> Self {
        Self {
            credentials,
            min_length: config.min_credential_length,
            ttl: Duration::from_millis(config.cache_ttl_ms),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call to this provider should be attempted at all
    pub fn is_available(&self, descriptor: &ProviderDescriptor) -> bool {
        if let Some(verdict) = self.cached(descriptor.id()) {
            return verdict;
        }

        let available = self.validate(descriptor).is_ok();
        if !self.ttl.is_zero() {
            self.cache.lock().insert(
                descriptor.id().to_string(),
                CachedVerdict {
                    available,
                    checked_at: Instant::now(),
                },
            );
        }
        available
    }

    /// Same as `is_available`, packaged for reporting
    pub fn check(&self, descriptor: &ProviderDescriptor) -> AvailabilityResult {
        AvailabilityResult {
            provider_id: descriptor.id().to_string(),
            available: self.is_available(descriptor),
        }
    }

    /// Fetch the credential for a provider, bypassing the cache
    ///
    /// Returns the error reason when the credential fails validation.
    pub fn credential(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<String, CredentialRejection> {
        let value = self.credentials.get(descriptor.credential_env());
        check_credential(
            value.as_deref(),
            descriptor.credential_prefix(),
            self.min_length,
        )?;
        // check_credential guarantees Some
        Ok(value.unwrap_or_default().trim().to_string())
    }

    /// Drop every cached verdict
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    fn cached(&self, provider_id: &str) -> Option<bool> {
        let cache = self.cache.lock();
        cache
            .get(provider_id)
            .filter(|v| v.checked_at.elapsed() < self.ttl)
            .map(|v| v.available)
    }

    fn validate(&self, descriptor: &ProviderDescriptor) -> Result<(), CredentialRejection> {
        let result = self.credential(descriptor).map(|_| ());
        if let Err(reason) = result {
            tracing::debug!(
                provider_id = %descriptor.id(),
                credential_env = %descriptor.credential_env(),
                reason = reason.as_str(),
                "Provider credential rejected"
            );
        }
        result
    }
}

impl std::fmt::Debug for AvailabilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityGate")
            .field("min_length", &self.min_length)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn groq_descriptor() -> ProviderDescriptor {
        let config = Config::from_str(
            r#"
[server]
host = "127.0.0.1"
port = 3000

[[providers]]
id = "groq"
display_name = "Groq"
api = "openai"
base_url = "https://api.groq.com/openai/v1"
credential_env = "GROQ_API_KEY"
credential_prefix = "gsk_"
model = "llama-3.3-70b-versatile"
"#,
        )
        .unwrap();
        config.providers[0].clone()
    }

    /// Counts lookups so cache hits can be observed
    struct CountingSource {
        inner: StaticCredentials,
        lookups: AtomicUsize,
    }

    impl CredentialSource for CountingSource {
        fn get(&self, key: &str) -> Option<String> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }
    }

    fn gate_with(credentials: StaticCredentials, ttl_ms: u64) -> AvailabilityGate {
        AvailabilityGate::new(
            Arc::new(credentials),
            &AvailabilityConfig {
                cache_ttl_ms: ttl_ms,
                min_credential_length: 10,
            },
        )
    }

    #[test]
    fn test_check_credential_accepts_well_formed_value() {
        assert_eq!(check_credential(Some("gsk_abcdef123456"), "gsk_", 10), Ok(()));
    }

    #[test]
    fn test_check_credential_rejects_missing_and_blank() {
        assert_eq!(
            check_credential(None, "gsk_", 10),
            Err(CredentialRejection::Missing)
        );
        assert_eq!(
            check_credential(Some("   "), "gsk_", 10),
            Err(CredentialRejection::Missing)
        );
    }

    #[test]
    fn test_check_credential_rejects_wrong_prefix() {
        assert_eq!(
            check_credential(Some("sk-abcdef1234567890"), "gsk_", 10),
            Err(CredentialRejection::WrongPrefix)
        );
    }

    #[test]
    fn test_check_credential_length_is_strict() {
        // exactly 10 chars is still a placeholder
        assert_eq!(
            check_credential(Some("gsk_123456"), "gsk_", 10),
            Err(CredentialRejection::TooShort)
        );
        assert_eq!(check_credential(Some("gsk_1234567"), "gsk_", 10), Ok(()));
    }

    #[test]
    fn test_check_credential_trims_whitespace() {
        assert_eq!(
            check_credential(Some("  gsk_abcdef123456\n"), "gsk_", 10),
            Ok(())
        );
    }

    #[test]
    fn test_empty_prefix_accepts_any_long_value() {
        assert_eq!(check_credential(Some("hf_abcdefghijk"), "", 10), Ok(()));
    }

    #[test]
    fn test_gate_reports_available_provider() {
        let gate = gate_with(
            StaticCredentials::new().with("GROQ_API_KEY", "gsk_live_0123456789"),
            0,
        );
        let descriptor = groq_descriptor();
        assert!(gate.is_available(&descriptor));
        assert_eq!(
            gate.check(&descriptor),
            AvailabilityResult {
                provider_id: "groq".to_string(),
                available: true
            }
        );
        assert_eq!(
            gate.credential(&descriptor).unwrap(),
            "gsk_live_0123456789"
        );
    }

    #[test]
    fn test_gate_rejects_placeholder() {
        let gate = gate_with(StaticCredentials::new().with("GROQ_API_KEY", "gsk_"), 0);
        assert!(!gate.is_available(&groq_descriptor()));
        assert_eq!(
            gate.credential(&groq_descriptor()),
            Err(CredentialRejection::TooShort)
        );
    }

    #[test]
    fn test_gate_caches_within_ttl() {
        let source = Arc::new(CountingSource {
            inner: StaticCredentials::new().with("GROQ_API_KEY", "gsk_live_0123456789"),
            lookups: AtomicUsize::new(0),
        });
        let gate = AvailabilityGate::new(
            source.clone(),
            &AvailabilityConfig {
                cache_ttl_ms: 60_000,
                min_credential_length: 10,
            },
        );
        let descriptor = groq_descriptor();

        assert!(gate.is_available(&descriptor));
        assert!(gate.is_available(&descriptor));
        assert!(gate.is_available(&descriptor));
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);

        gate.invalidate();
        assert!(gate.is_available(&descriptor));
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_gate_zero_ttl_disables_cache() {
        let source = Arc::new(CountingSource {
            inner: StaticCredentials::new(),
            lookups: AtomicUsize::new(0),
        });
        let gate = AvailabilityGate::new(
            source.clone(),
            &AvailabilityConfig {
                cache_ttl_ms: 0,
                min_credential_length: 10,
            },
        );
        let descriptor = groq_descriptor();

        assert!(!gate.is_available(&descriptor));
        assert!(!gate.is_available(&descriptor));
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_static_credentials_from_iter() {
        let creds: StaticCredentials = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(creds.get("A").as_deref(), Some("1"));
        assert_eq!(creds.get("C"), None);
    }
}
