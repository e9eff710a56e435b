//! HTTP request handlers for the chatrelay API

use crate::config::{Config, ServerConfig};
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::models::{AvailabilityGate, CredentialSource, EnvCredentials, PriorityStore};
use crate::providers::{AdapterFactory, HttpAdapterFactory, ProviderRegistry};
use crate::router::{FallbackOrchestrator, RetryPolicy};
use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod health;
pub mod metrics;
pub mod priorities;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<PriorityStore>,
    gate: Arc<AvailabilityGate>,
    registry: Arc<ProviderRegistry>,
    orchestrator: Arc<FallbackOrchestrator>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create the production state: credentials from the environment, HTTP adapters
    ///
    /// The priority store must already be loaded; a missing store file is an
    /// operator error (see the `init-priorities` subcommand).
    pub fn new(config: Arc<Config>, store: Arc<PriorityStore>) -> AppResult<Self> {
        Self::with_parts(
            config,
            store,
            Arc::new(EnvCredentials),
            Arc::new(HttpAdapterFactory),
        )
    }

    /// Create state with injected credentials and adapters
    pub fn with_parts(
        config: Arc<Config>,
        store: Arc<PriorityStore>,
        credentials: Arc<dyn CredentialSource>,
        factory: Arc<dyn AdapterFactory>,
    ) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("failed to register Prometheus metrics: {}", e))
        })?);
        let policy = RetryPolicy::from_config(&config.fallback)?;
        let gate = Arc::new(AvailabilityGate::new(credentials, &config.availability));
        let registry = Arc::new(ProviderRegistry::new(
            &config.providers,
            gate.clone(),
            factory,
        ));
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            config.clone(),
            store.clone(),
            gate.clone(),
            registry.clone(),
            policy,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            store,
            gate,
            registry,
            orchestrator,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &PriorityStore {
        &self.store
    }

    pub fn gate(&self) -> &AvailabilityGate {
        &self.gate
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    /// Owned handle for work that outlives a handler future
    pub fn shared_orchestrator(&self) -> Arc<FallbackOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Bind the listener to the configured host and port
///
/// The host is resolved as written (`localhost`, an IP, or a DNS name). An
/// address that cannot be resolved is an error, never a wider bind.
pub async fn bind(server: &ServerConfig) -> std::io::Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((server.host.as_str(), server.port)).await
}

/// Build the HTTP router with all routes and middleware
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .route("/admin/priorities", get(priorities::list))
        .route("/admin/priorities/reload", post(priorities::reload))
        .route("/admin/priorities/{id}", put(priorities::update))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::StaticCredentials;
    use crate::models::priority::default_entries;
    use std::str::FromStr;

    pub const CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[[providers]]
id = "groq"
display_name = "Groq"
api = "openai"
base_url = "http://127.0.0.1:9/openai/v1"
credential_env = "GROQ_API_KEY"
credential_prefix = "gsk_"
model = "llama-3.3-70b-versatile"

[[providers]]
id = "gemini"
display_name = "Google Gemini"
api = "gemini"
base_url = "http://127.0.0.1:9/v1beta"
credential_env = "GEMINI_API_KEY"
credential_prefix = "AIza"
model = "gemini-1.5-flash"
"#;

    /// State over a temp store file; only groq has a credential
    pub async fn state(dir: &tempfile::TempDir) -> AppState {
        let config = Arc::new(Config::from_str(CONFIG).expect("test config should parse"));
        let path = dir.path().join("priorities.json");
        let store = PriorityStore::create_default(&path, &config.providers, false)
            .await
            .expect("store should be created");
        assert_eq!(store.entries().await, default_entries(&config.providers));

        AppState::with_parts(
            config,
            Arc::new(store),
            Arc::new(StaticCredentials::new().with("GROQ_API_KEY", "gsk_test_0123456789")),
            Arc::new(HttpAdapterFactory),
        )
        .expect("state should build")
    }
}
