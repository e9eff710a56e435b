//! Priority-ordered provider fallback with bounded per-provider retry

use super::events::{EventSink, FallbackEvent, SkipReason};
use super::normalize::normalize;
use super::retry::RetryPolicy;
use super::{AttemptResult, FallbackState, GenerationHints, GenerationResult};
use crate::config::{Config, ProviderDescriptor};
use crate::error::{AppError, AppResult, ErrorKind, ProviderError};
use crate::middleware::RequestId;
use crate::models::{AvailabilityGate, PriorityStore};
use crate::providers::{ProviderRegistry, SendOptions};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// A provider that passed selection, with its index in the enabled list
#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    position: usize,
    descriptor: &'a ProviderDescriptor,
}

/// Walks the enabled providers in priority order until one answers
///
/// Each request takes one snapshot of the priority ordering, then tries each
/// available candidate up to [`RetryPolicy::max_attempts`] times. There is no
/// outer retry loop: when every candidate fails the last error is returned.
pub struct FallbackOrchestrator {
    config: Arc<Config>,
    store: Arc<PriorityStore>,
    gate: Arc<AvailabilityGate>,
    registry: Arc<ProviderRegistry>,
    policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
}

impl FallbackOrchestrator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<PriorityStore>,
        gate: Arc<AvailabilityGate>,
        registry: Arc<ProviderRegistry>,
        policy: RetryPolicy,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            store,
            gate,
            registry,
            policy,
            sink,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate a reply, with a fresh request id and no cancellation
    pub async fn generate_response(
        &self,
        message: &str,
        hints: &GenerationHints,
    ) -> AppResult<GenerationResult> {
        self.generate(message, hints, RequestId::new(), &CancellationToken::new())
            .await
    }

    /// Generate a reply from the highest-priority provider that succeeds
    ///
    /// `cancel` is checked before every attempt and while sleeping between
    /// retries. An in-flight provider call is never interrupted by it.
    pub async fn generate(
        &self,
        message: &str,
        hints: &GenerationHints,
        request_id: RequestId,
        cancel: &CancellationToken,
    ) -> AppResult<GenerationResult> {
        let started = Instant::now();

        tracing::debug!(
            request_id = %request_id,
            state = FallbackState::Selecting.as_str(),
            "Selecting provider candidates"
        );

        let enabled = self.store.ordered_enabled_provider_ids().await;
        let candidates = self.select(&enabled, request_id);

        if candidates.is_empty() {
            tracing::error!(
                request_id = %request_id,
                state = FallbackState::Exhausted.as_str(),
                enabled_providers = enabled.len(),
                "No provider available: every enabled provider is unconfigured or lacks a usable credential"
            );
            self.sink.record(&FallbackEvent::Exhausted {
                total_attempts: 0,
                last_kind: None,
                elapsed: started.elapsed(),
            });
            return Err(AppError::NoProviderAvailable {
                enabled: enabled.len(),
            });
        }

        let mut attempts: Vec<AttemptResult> = Vec::new();
        let mut last_error: Option<ProviderError> = None;

        for candidate in candidates {
            let descriptor = candidate.descriptor;
            let provider_id = descriptor.id();

            if cancel.is_cancelled() {
                return Err(self.cancelled(request_id, attempts.len()));
            }

            let adapter = match self.registry.initialize(descriptor).await {
                Ok(adapter) => adapter,
                Err(e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        provider_id = %provider_id,
                        error = %e,
                        "Provider client could not be initialized, skipping"
                    );
                    self.sink.record(&FallbackEvent::Skipped {
                        provider_id: provider_id.to_string(),
                        reason: SkipReason::InitFailed,
                    });
                    continue;
                }
            };

            // The id may have been dropped by a reload since selection
            let model = match self.store.model_for(provider_id).await {
                Ok(model) => model,
                Err(_) => descriptor.model().to_string(),
            };
            let options = SendOptions::resolve(descriptor, model, hints);

            for attempt in 1..=self.policy.max_attempts() {
                if attempt > 1 {
                    let kind = last_error.as_ref().map_or(ErrorKind::Unknown, |e| e.kind);
                    let delay = self.policy.backoff(attempt - 1, kind);
                    tracing::debug!(
                        request_id = %request_id,
                        provider_id = %provider_id,
                        attempt = attempt,
                        backoff_ms = delay.as_millis() as u64,
                        "Backing off before retry"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(self.cancelled(request_id, attempts.len()));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }

                if cancel.is_cancelled() {
                    return Err(self.cancelled(request_id, attempts.len()));
                }

                tracing::debug!(
                    request_id = %request_id,
                    state = FallbackState::Attempting.as_str(),
                    provider_id = %provider_id,
                    model = %options.model,
                    attempt = attempt,
                    max_attempts = self.policy.max_attempts(),
                    "Attempting provider"
                );
                self.sink.record(&FallbackEvent::Attempted {
                    provider_id: provider_id.to_string(),
                    attempt,
                });

                let send = adapter.send(message, &options);
                let outcome = match tokio::time::timeout(descriptor.request_timeout(), send).await {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => Err(ProviderError::new(
                        provider_id,
                        ErrorKind::Timeout,
                        format!("no response within {} ms", descriptor.request_timeout_ms()),
                    )),
                };

                match outcome {
                    Ok(completion) => {
                        attempts.push(AttemptResult {
                            provider_id: provider_id.to_string(),
                            attempt,
                            success: true,
                            content: Some(completion.content.clone()),
                            usage: Some(completion.usage),
                            error_kind: None,
                            http_status: None,
                        });

                        let result = normalize(
                            descriptor,
                            &options.model,
                            completion,
                            candidate.position,
                            attempts,
                        );

                        tracing::info!(
                            request_id = %request_id,
                            state = FallbackState::Succeeded.as_str(),
                            provider_id = %provider_id,
                            attempt = attempt,
                            total_attempts = result.total_attempts,
                            fallback_used = result.fallback_used,
                            response_length = result.response.len(),
                            "Provider answered"
                        );
                        self.sink.record(&FallbackEvent::Succeeded {
                            provider_id: provider_id.to_string(),
                            total_attempts: result.total_attempts,
                            fallback_used: result.fallback_used,
                            elapsed: started.elapsed(),
                        });
                        return Ok(result);
                    }
                    Err(e) => {
                        tracing::warn!(
                            request_id = %request_id,
                            provider_id = %provider_id,
                            attempt = attempt,
                            max_attempts = self.policy.max_attempts(),
                            error_kind = e.kind.as_str(),
                            http_status = e.http_status,
                            error = %e,
                            "Provider attempt failed"
                        );
                        attempts.push(AttemptResult {
                            provider_id: provider_id.to_string(),
                            attempt,
                            success: false,
                            content: None,
                            usage: None,
                            error_kind: Some(e.kind),
                            http_status: e.http_status,
                        });
                        self.sink.record(&FallbackEvent::Failed {
                            provider_id: provider_id.to_string(),
                            attempt,
                            kind: e.kind,
                        });

                        let retryable = e.kind.is_retryable();
                        last_error = Some(e);
                        if !retryable {
                            tracing::info!(
                                request_id = %request_id,
                                provider_id = %provider_id,
                                "Credentials rejected, moving to next provider without retry"
                            );
                            break;
                        }
                    }
                }
            }
        }

        let total_attempts = attempts.len();

        // Every candidate failed to initialize: nothing was ever called
        let Some(last) = last_error else {
            tracing::error!(
                request_id = %request_id,
                state = FallbackState::Exhausted.as_str(),
                enabled_providers = enabled.len(),
                "No provider could be initialized"
            );
            self.sink.record(&FallbackEvent::Exhausted {
                total_attempts,
                last_kind: None,
                elapsed: started.elapsed(),
            });
            return Err(AppError::NoProviderAvailable {
                enabled: enabled.len(),
            });
        };

        tracing::error!(
            request_id = %request_id,
            state = FallbackState::Exhausted.as_str(),
            total_attempts = total_attempts,
            error_kind = last.kind.as_str(),
            last_provider_id = %last.provider_id,
            "All providers exhausted"
        );
        self.sink.record(&FallbackEvent::Exhausted {
            total_attempts,
            last_kind: Some(last.kind),
            elapsed: started.elapsed(),
        });

        let message = match last.kind {
            ErrorKind::Unavailable => format!(
                "AI providers are temporarily unavailable, retry later (last error: {})",
                last
            ),
            _ => format!("last error: {}", last),
        };

        Err(AppError::AllProvidersExhausted {
            kind: last.kind,
            message,
            attempts: total_attempts,
        })
    }

    /// Resolve enabled ids to configured, available candidates (order preserved)
    fn select<'a>(&'a self, enabled: &[String], request_id: RequestId) -> Vec<Candidate<'a>> {
        let mut candidates = Vec::with_capacity(enabled.len());

        for (position, id) in enabled.iter().enumerate() {
            let Some(descriptor) = self.config.provider(id) else {
                tracing::warn!(
                    request_id = %request_id,
                    provider_id = %id,
                    "Priority store lists a provider missing from the config, skipping"
                );
                self.sink.record(&FallbackEvent::Skipped {
                    provider_id: id.clone(),
                    reason: SkipReason::Unconfigured,
                });
                continue;
            };

            if !self.gate.is_available(descriptor) {
                tracing::debug!(
                    request_id = %request_id,
                    provider_id = %id,
                    "Provider has no usable credential, skipping"
                );
                self.sink.record(&FallbackEvent::Skipped {
                    provider_id: id.clone(),
                    reason: SkipReason::Unavailable,
                });
                continue;
            }

            candidates.push(Candidate {
                position,
                descriptor,
            });
        }

        candidates
    }

    fn cancelled(&self, request_id: RequestId, attempts: usize) -> AppError {
        tracing::info!(
            request_id = %request_id,
            total_attempts = attempts,
            "Request cancelled by caller"
        );
        AppError::Cancelled { attempts }
    }
}
