//! Lazily initialized adapter handles
//!
//! One slot per configured provider, owned by the long-lived application
//! state. A slot is filled on first use and never replaced, so every request
//! after the first reuses the same client (and its connection pool).
//! Rotated credentials take effect on restart.

use super::{AdapterFactory, ProviderAdapter};
use crate::config::ProviderDescriptor;
use crate::error::{AppError, AppResult};
use crate::models::AvailabilityGate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct ProviderRegistry {
    gate: Arc<AvailabilityGate>,
    factory: Arc<dyn AdapterFactory>,
    slots: HashMap<String, OnceCell<Arc<dyn ProviderAdapter>>>,
}

impl ProviderRegistry {
    pub fn new(
        descriptors: &[ProviderDescriptor],
        gate: Arc<AvailabilityGate>,
        factory: Arc<dyn AdapterFactory>,
    ) -> Self {
        let slots = descriptors
            .iter()
            .map(|d| (d.id().to_string(), OnceCell::new()))
            .collect();

        Self {
            gate,
            factory,
            slots,
        }
    }

    /// Get the adapter for a provider, building it on first use
    ///
    /// Idempotent. Fails with `ServiceUnavailable` when the provider is not
    /// configured, its credential does not pass the availability gate, or the
    /// client cannot be constructed.
    pub async fn initialize(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> AppResult<Arc<dyn ProviderAdapter>> {
        let slot = self
            .slots
            .get(descriptor.id())
            .ok_or_else(|| AppError::ServiceUnavailable {
                provider_id: descriptor.id().to_string(),
                reason: "provider is not configured".to_string(),
            })?;

        if !self.gate.is_available(descriptor) {
            return Err(AppError::ServiceUnavailable {
                provider_id: descriptor.id().to_string(),
                reason: "credential missing or malformed".to_string(),
            });
        }

        let adapter = slot
            .get_or_try_init(|| async {
                let credential = self.gate.credential(descriptor).map_err(|reason| {
                    AppError::ServiceUnavailable {
                        provider_id: descriptor.id().to_string(),
                        reason: format!("credential {}", reason.as_str()),
                    }
                })?;

                let adapter = self.factory.build(descriptor, credential).map_err(|reason| {
                    AppError::ServiceUnavailable {
                        provider_id: descriptor.id().to_string(),
                        reason,
                    }
                })?;

                tracing::info!(
                    provider_id = %descriptor.id(),
                    api = descriptor.api().as_str(),
                    "Provider client initialized"
                );
                Ok::<_, AppError>(adapter)
            })
            .await?;

        Ok(adapter.clone())
    }

    /// Whether the provider's client has been built
    pub fn is_initialized(&self, provider_id: &str) -> bool {
        self.slots
            .get(provider_id)
            .is_some_and(|slot| slot.initialized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AvailabilityConfig, Config};
    use crate::error::ProviderError;
    use crate::models::StaticCredentials;
    use crate::providers::{Completion, SendOptions, Usage};
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoAdapter(String);

    #[async_trait]
    impl ProviderAdapter for EchoAdapter {
        fn provider_id(&self) -> &str {
            &self.0
        }

        async fn send(&self, message: &str, _: &SendOptions) -> Result<Completion, ProviderError> {
            Ok(Completion {
                content: message.to_string(),
                usage: Usage::default(),
            })
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        builds: AtomicUsize,
    }

    impl AdapterFactory for CountingFactory {
        fn build(
            &self,
            descriptor: &ProviderDescriptor,
            _credential: String,
        ) -> Result<Arc<dyn ProviderAdapter>, String> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoAdapter(descriptor.id().to_string())))
        }
    }

    fn config() -> Config {
        Config::from_str(
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

[[providers]]
id = "gemini"
display_name = "Google Gemini"
api = "gemini"
base_url = "https://generativelanguage.googleapis.com/v1beta"
credential_env = "GEMINI_API_KEY"
credential_prefix = "AIza"
model = "gemini-1.5-flash"
"#,
        )
        .unwrap()
    }

    fn registry(factory: Arc<CountingFactory>) -> (Config, ProviderRegistry) {
        let config = config();
        let gate = Arc::new(AvailabilityGate::new(
            Arc::new(StaticCredentials::new().with("GROQ_API_KEY", "gsk_live_0123456789")),
            &AvailabilityConfig::default(),
        ));
        let registry = ProviderRegistry::new(&config.providers, gate, factory);
        (config, registry)
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let factory = Arc::new(CountingFactory::default());
        let (config, registry) = registry(factory.clone());
        let groq = config.provider("groq").unwrap();

        assert!(!registry.is_initialized("groq"));
        let first = registry.initialize(groq).await.unwrap();
        let second = registry.initialize(groq).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert!(registry.is_initialized("groq"));
    }

    #[tokio::test]
    async fn test_initialize_fails_without_credential() {
        let factory = Arc::new(CountingFactory::default());
        let (config, registry) = registry(factory.clone());

        let err = registry
            .initialize(config.provider("gemini").unwrap())
            .await
            .err()
            .expect("gemini has no credential");
        assert!(matches!(
            err,
            AppError::ServiceUnavailable { ref provider_id, .. } if provider_id == "gemini"
        ));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 0);
        assert!(!registry.is_initialized("gemini"));
    }
}
