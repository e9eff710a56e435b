//! Command-line interface for chatrelay
//!
//! Provides argument parsing and subcommand handling for the chatrelay binary.

use clap::{Parser, Subcommand};

/// Chat relay with priority-ordered fallback across hosted AI providers
#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(version)]
#[command(about = "Chat relay with priority-ordered fallback across hosted AI providers")]
#[command(
    long_about = "chatrelay forwards a single chat message to the highest-priority hosted \
    AI provider that has a usable credential, retrying and falling back down the \
    priority list until one answers."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Write the default priority store for the configured providers
    InitPriorities {
        /// Replace an existing priority store file
        #[arg(long)]
        force: bool,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# chatrelay configuration
# =======================
#
# Providers are tried in the order recorded in the priority store (see
# [priority_store]); this file only describes how to reach each one.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "127.0.0.1"
port = 3000

# ─────────────────────────────────────────────────────────────────────────────
# FALLBACK
# ─────────────────────────────────────────────────────────────────────────────

[fallback]
# Attempts against one provider before moving to the next (1-10)
max_attempts_per_provider = 2
# Base backoff between retries on the same provider; doubles each retry
retry_backoff_ms = 250
# Backoff multiplier after a provider reports a temporary outage (502/503/504)
unavailable_backoff_multiplier = 3

# ─────────────────────────────────────────────────────────────────────────────
# AVAILABILITY
# ─────────────────────────────────────────────────────────────────────────────

[availability]
# How long a credential check is reused (0 disables caching)
cache_ttl_ms = 5000
# Credentials this many characters or fewer are treated as placeholders
min_credential_length = 10

# ─────────────────────────────────────────────────────────────────────────────
# PRIORITY STORE
# ─────────────────────────────────────────────────────────────────────────────
#
# JSON array of {id, priority, enabled, model}. Lower priority is tried first.
# Create it with: chatrelay init-priorities

[priority_store]
path = "priorities.json"

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDERS
# ─────────────────────────────────────────────────────────────────────────────
#
# api = "openai" speaks POST {base_url}/chat/completions with a bearer token.
# api = "gemini" speaks POST {base_url}/models/{model}:generateContent.
# The credential is read from the environment variable named by credential_env.

[[providers]]
id = "groq"
display_name = "Groq"
api = "openai"
base_url = "https://api.groq.com/openai/v1"
credential_env = "GROQ_API_KEY"
credential_prefix = "gsk_"
model = "llama-3.3-70b-versatile"
request_timeout_ms = 30000
max_tokens = 1024
temperature = 0.7

[[providers]]
id = "gemini"
display_name = "Google Gemini"
api = "gemini"
base_url = "https://generativelanguage.googleapis.com/v1beta"
credential_env = "GEMINI_API_KEY"
credential_prefix = "AIza"
model = "gemini-1.5-flash"
request_timeout_ms = 30000
max_tokens = 1024
temperature = 0.7

[[providers]]
id = "openrouter"
display_name = "OpenRouter"
api = "openai"
base_url = "https://openrouter.ai/api/v1"
credential_env = "OPENROUTER_API_KEY"
credential_prefix = "sk-or-"
model = "meta-llama/llama-3.1-8b-instruct"
request_timeout_ms = 45000
"#
}
