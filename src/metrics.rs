//! Prometheus metrics collection for chatrelay
//!
//! This module provides metrics instrumentation for tracking:
//! - Provider attempts, successes and classified failures
//! - Skipped candidates (unconfigured, no credential, init failure)
//! - Fallbacks and exhausted requests
//! - End-to-end orchestration latency
//!
//! [`Metrics`] is an [`EventSink`], so it is fed directly by the fallback
//! orchestrator. Metrics are exposed via the `/metrics` endpoint in
//! Prometheus text format.

use crate::error::ErrorKind;
use crate::router::{EventSink, FallbackEvent};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Terminal outcome of one orchestration, for the duration histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Exhausted,
}

impl Outcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Exhausted => "exhausted",
        }
    }
}

/// Metrics collector for chatrelay
///
/// Label cardinality is bounded: `provider` values come from the configured
/// provider list, `error_kind` and `reason` from closed enums.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    attempts: IntCounterVec,
    successes: IntCounterVec,
    failures: IntCounterVec,
    skips: IntCounterVec,
    fallbacks: IntCounter,
    exhaustions: IntCounterVec,
    request_duration: HistogramVec,
    metrics_recording_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let attempts = IntCounterVec::new(
            Opts::new(
                "chatrelay_provider_attempts_total",
                "Total provider calls, including retries, by provider",
            ),
            &["provider"],
        )?;

        let successes = IntCounterVec::new(
            Opts::new(
                "chatrelay_provider_successes_total",
                "Total requests answered, by the provider that answered",
            ),
            &["provider"],
        )?;

        // Cardinality: N providers x 5 error kinds
        let failures = IntCounterVec::new(
            Opts::new(
                "chatrelay_provider_failures_total",
                "Total failed provider calls by provider and error kind",
            ),
            &["provider", "error_kind"],
        )?;

        let skips = IntCounterVec::new(
            Opts::new(
                "chatrelay_provider_skips_total",
                "Candidates passed over without a call, by provider and reason",
            ),
            &["provider", "reason"],
        )?;

        let fallbacks = IntCounter::new(
            "chatrelay_fallbacks_total",
            "Requests answered by a provider other than the first enabled one",
        )?;

        // error_kind="none" when no provider could be called at all
        let exhaustions = IntCounterVec::new(
            Opts::new(
                "chatrelay_exhausted_total",
                "Requests that failed on every candidate, by last error kind",
            ),
            &["error_kind"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "chatrelay_request_duration_ms",
                "End-to-end orchestration latency in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
            ]),
            &["outcome"],
        )?;

        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "chatrelay_metrics_recording_failures_total",
                "Total number of metrics recording operation failures by operation. \
                Indicates Prometheus internal errors.",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(attempts.clone()))?;
        registry.register(Box::new(successes.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(skips.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(exhaustions.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            attempts,
            successes,
            failures,
            skips,
            fallbacks,
            exhaustions,
            request_duration,
            metrics_recording_failures,
        })
    }

    pub fn record_attempt(&self, provider: &str) -> Result<(), prometheus::Error> {
        self.attempts.get_metric_with_label_values(&[provider])?.inc();
        Ok(())
    }

    pub fn record_failure(&self, provider: &str, kind: ErrorKind) -> Result<(), prometheus::Error> {
        self.failures
            .get_metric_with_label_values(&[provider, kind.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_skip(&self, provider: &str, reason: &str) -> Result<(), prometheus::Error> {
        self.skips
            .get_metric_with_label_values(&[provider, reason])?
            .inc();
        Ok(())
    }

    pub fn record_success(
        &self,
        provider: &str,
        fallback_used: bool,
    ) -> Result<(), prometheus::Error> {
        self.successes.get_metric_with_label_values(&[provider])?.inc();
        if fallback_used {
            self.fallbacks.inc();
        }
        Ok(())
    }

    pub fn record_exhausted(&self, last_kind: Option<ErrorKind>) -> Result<(), prometheus::Error> {
        let label = last_kind.map_or("none", |k| k.as_str());
        self.exhaustions.get_metric_with_label_values(&[label])?.inc();
        Ok(())
    }

    /// Record orchestration duration
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_ms` is NaN, infinite, or negative.
    /// Such values corrupt histogram percentiles.
    pub fn record_duration(
        &self,
        outcome: Outcome,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite (not NaN or Infinity), got: {}",
                duration_ms
            )));
        }
        if duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be non-negative, got: {}",
                duration_ms
            )));
        }

        self.request_duration
            .get_metric_with_label_values(&[outcome.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    /// Record a metrics recording operation failure
    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    /// Sum across all operations; reported by `/health`
    pub fn metrics_recording_failures_count(&self) -> u64 {
        self.registry
            .gather()
            .iter()
            .find(|mf| mf.name() == "chatrelay_metrics_recording_failures_total")
            .map(|mf| {
                mf.get_metric()
                    .iter()
                    .map(|m| m.counter.value.unwrap_or(0.0) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn fallbacks_count(&self) -> u64 {
        self.fallbacks.get()
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        tracing::debug!(
            metric_family_count = metric_families.len(),
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(error = %e, "Prometheus text encoder failed");
                e
            })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                e.utf8_error().valid_up_to(),
                e
            ))
        })
    }

    fn observe(&self, operation: &'static str, result: Result<(), prometheus::Error>) {
        if let Err(e) = result {
            self.metrics_recording_failure(operation);
            tracing::error!(
                error = %e,
                operation,
                "Metrics recording failed. Observability degraded but request continues."
            );
        }
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

impl EventSink for Metrics {
    fn record(&self, event: &FallbackEvent) {
        match event {
            FallbackEvent::Attempted { provider_id, .. } => {
                self.observe("record_attempt", self.record_attempt(provider_id));
            }
            FallbackEvent::Failed {
                provider_id, kind, ..
            } => {
                self.observe("record_failure", self.record_failure(provider_id, *kind));
            }
            FallbackEvent::Skipped {
                provider_id,
                reason,
            } => {
                self.observe("record_skip", self.record_skip(provider_id, reason.as_str()));
            }
            FallbackEvent::Succeeded {
                provider_id,
                fallback_used,
                elapsed,
                ..
            } => {
                self.observe(
                    "record_success",
                    self.record_success(provider_id, *fallback_used),
                );
                self.observe(
                    "record_duration",
                    self.record_duration(Outcome::Success, millis(*elapsed)),
                );
            }
            FallbackEvent::Exhausted {
                last_kind, elapsed, ..
            } => {
                self.observe("record_exhausted", self.record_exhausted(*last_kind));
                self.observe(
                    "record_duration",
                    self.record_duration(Outcome::Exhausted, millis(*elapsed)),
                );
            }
        }
    }
}
