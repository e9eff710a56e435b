//! Shared fixtures: scripted adapters, temp priority stores and configs
#![allow(dead_code)]

use async_trait::async_trait;
use chatrelay::config::{Config, ProviderDescriptor};
use chatrelay::error::{ErrorKind, ProviderError};
use chatrelay::models::{AvailabilityGate, PriorityStore, StaticCredentials};
use chatrelay::providers::{
    AdapterFactory, Completion, ProviderAdapter, ProviderRegistry, SendOptions, Usage,
};
use chatrelay::router::{FallbackOrchestrator, RecordingSink, RetryPolicy};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// What a scripted adapter does on one call
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(ErrorKind, Option<u16>),
    /// Sleep before replying (exercises the per-call timeout)
    Stall(Duration),
    /// Sleep, then fail with the given kind
    SlowFail(Duration, ErrorKind),
}

impl Step {
    pub fn reply(text: &str) -> Self {
        Step::Reply(text.to_string())
    }

    pub fn fail(kind: ErrorKind) -> Self {
        let status = match kind {
            ErrorKind::Auth => Some(401),
            ErrorKind::RateLimit => Some(429),
            ErrorKind::Unavailable => Some(503),
            ErrorKind::Timeout => None,
            ErrorKind::Unknown => Some(500),
        };
        Step::Fail(kind, status)
    }
}

/// Adapter that plays back a script; once exhausted it repeats `fallback`
pub struct ScriptedAdapter {
    id: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Step>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    seen: Mutex<Vec<SendOptions>>,
}

impl ScriptedAdapter {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Step::Reply(format!("reply from {id}"))),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran to the end rather than being dropped mid-flight
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SendOptions> {
        self.seen.lock().clone()
    }

    fn failure(&self, kind: ErrorKind, status: Option<u16>) -> ProviderError {
        let err = ProviderError::new(&self.id, kind, format!("scripted {}", kind));
        match status {
            Some(code) => err.with_status(code),
            None => err,
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn send(
        &self,
        message: &str,
        options: &SendOptions,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(options.clone());

        let step = {
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| self.fallback.lock().clone())
        };

        let outcome = match step {
            Step::Reply(text) => Ok(Completion {
                content: text,
                usage: Usage::new(message.len() as u32, 3, None),
            }),
            Step::Fail(kind, status) => Err(self.failure(kind, status)),
            Step::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Completion {
                    content: "late".to_string(),
                    usage: Usage::default(),
                })
            }
            Step::SlowFail(delay, kind) => {
                tokio::time::sleep(delay).await;
                Err(self.failure(kind, None))
            }
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

/// Hands out one shared [`ScriptedAdapter`] per provider id
#[derive(Default)]
pub struct ScriptedFactory {
    adapters: Mutex<HashMap<String, Arc<ScriptedAdapter>>>,
    broken: Mutex<HashSet<String>>,
    builds: AtomicUsize,
}

impl ScriptedFactory {
    pub fn adapter(&self, id: &str) -> Arc<ScriptedAdapter> {
        self.adapters
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(ScriptedAdapter::new(id)))
            .clone()
    }

    /// Queue steps for a provider, played before its fallback behaviour
    pub fn script(&self, id: &str, steps: impl IntoIterator<Item = Step>) {
        self.adapter(id).script.lock().extend(steps);
    }

    /// Behaviour once the queued script is used up
    pub fn always(&self, id: &str, step: Step) {
        *self.adapter(id).fallback.lock() = step;
    }

    /// Make construction fail for a provider
    pub fn break_provider(&self, id: &str) {
        self.broken.lock().insert(id.to_string());
    }

    pub fn calls(&self, id: &str) -> usize {
        self.adapters.lock().get(id).map_or(0, |a| a.calls())
    }

    pub fn total_calls(&self) -> usize {
        self.adapters.lock().values().map(|a| a.calls()).sum()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl AdapterFactory for ScriptedFactory {
    fn build(
        &self,
        descriptor: &ProviderDescriptor,
        _credential: String,
    ) -> Result<Arc<dyn ProviderAdapter>, String> {
        if self.broken.lock().contains(descriptor.id()) {
            return Err("scripted construction failure".to_string());
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.adapter(descriptor.id()))
    }
}

pub fn credential_env(id: &str) -> String {
    format!("{}_API_KEY", id.to_uppercase().replace('-', "_"))
}

/// Config with one OpenAI-style provider per id, in the given order
pub fn config_toml(ids: &[&str], request_timeout_ms: u64) -> String {
    let mut toml = String::from(
        r#"
[server]
host = "127.0.0.1"
port = 3000

[availability]
cache_ttl_ms = 0
"#,
    );
    for id in ids {
        toml.push_str(&format!(
            r#"
[[providers]]
id = "{id}"
display_name = "{id} display"
api = "openai"
base_url = "http://127.0.0.1:9/{id}/v1"
credential_env = "{env}"
model = "{id}-default-model"
request_timeout_ms = {request_timeout_ms}
max_tokens = 512
temperature = 0.5
max_temperature = 1.0
"#,
            env = credential_env(id),
        ));
    }
    toml
}

pub fn config(ids: &[&str]) -> Config {
    Config::from_str(&config_toml(ids, 30_000)).expect("test config should be valid")
}

/// Credentials for exactly the given providers
pub fn credentials_for(ids: &[&str]) -> StaticCredentials {
    ids.iter()
        .map(|id| (credential_env(id), format!("key-{id}-0123456789")))
        .collect()
}

/// Everything needed to drive one orchestrator in a test
pub struct Harness {
    pub config: Arc<Config>,
    pub store: Arc<PriorityStore>,
    pub factory: Arc<ScriptedFactory>,
    pub sink: Arc<RecordingSink>,
    pub orchestrator: FallbackOrchestrator,
    pub dir: TempDir,
}

impl Harness {
    /// Providers in `ids` order (priority 1..N, all enabled); only `credentialed` are available
    pub async fn new(ids: &[&str], credentialed: &[&str], policy: RetryPolicy) -> Self {
        Self::with_config(config(ids), credentialed, policy).await
    }

    pub async fn with_config(config: Config, credentialed: &[&str], policy: RetryPolicy) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PriorityStore::create_default(
            dir.path().join("priorities.json"),
            &config.providers,
            false,
        )
        .await
        .expect("default store");
        Self::assemble(Arc::new(config), Arc::new(store), credentialed, policy, dir)
    }

    pub fn assemble(
        config: Arc<Config>,
        store: Arc<PriorityStore>,
        credentialed: &[&str],
        policy: RetryPolicy,
        dir: TempDir,
    ) -> Self {
        let gate = Arc::new(AvailabilityGate::new(
            Arc::new(credentials_for(credentialed)),
            &config.availability,
        ));
        let factory = Arc::new(ScriptedFactory::default());
        let registry = Arc::new(ProviderRegistry::new(
            &config.providers,
            gate.clone(),
            factory.clone(),
        ));
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = FallbackOrchestrator::new(
            config.clone(),
            store.clone(),
            gate,
            registry,
            policy,
            sink.clone(),
        );

        Self {
            config,
            store,
            factory,
            sink,
            orchestrator,
            dir,
        }
    }
}

/// K attempts, no backoff delay
pub fn fast_policy(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::new(max_attempts, 0, 3).expect("valid policy")
}
