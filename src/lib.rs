//! chatrelay - single-message chat relay with provider fallback
//!
//! Forwards a chat message to the highest-priority hosted AI provider that
//! has a usable credential. Failures are classified, retried with bounded
//! exponential backoff, and fall through to the next provider in a
//! persisted, runtime-editable priority order.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod router;
pub mod telemetry;
