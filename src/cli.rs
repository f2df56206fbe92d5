//! Command-line interface for chat-relay
//!
//! Provides argument parsing and subcommand handling for the chat-relay binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Streams chat completions from an OpenAI-compatible provider as plain text
#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(version)]
#[command(about = "Streams chat completions from an OpenAI-compatible provider as plain text")]
pub struct Cli {
    /// Path to configuration file (built-in defaults are used when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# chat-relay Configuration
# ========================
#
# Every section and field is optional; omitted values use the defaults shown.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3000

# Hard deadline for one chat request, upstream call and streaming included (1-300)
request_timeout_seconds = 30

# ─────────────────────────────────────────────────────────────────────────────
# UPSTREAM PROVIDER
# ─────────────────────────────────────────────────────────────────────────────

[provider]
# Base URL of an OpenAI-compatible API; /chat/completions is appended
base_url = "https://api.openai.com/v1"

# Model requested for every completion
model = "gpt-3.5-turbo"

# Sampling temperature (0.0-2.0)
temperature = 0.7

# Environment variable holding the API key (read once at startup)
api_key_env = "OPENAI_API_KEY"

# ─────────────────────────────────────────────────────────────────────────────
# RELAY
# ─────────────────────────────────────────────────────────────────────────────

[relay]
# Text fragments buffered between the provider and a slow caller (1-1024)
channel_capacity = 32

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
# RUST_LOG takes precedence when set
log_level = "info"

# Log format: "pretty" or "json"
log_format = "pretty"

# Prometheus metrics are always available at /metrics on the server port
"#
}
