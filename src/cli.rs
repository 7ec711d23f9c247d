//! Command-line interface, built on clap.
//!
//! Defines the [`Cli`] struct with subcommands [`Command`] (send, batch,
//! status) and global flags (--config, --verbose).

use clap::{Parser, Subcommand, ValueEnum};

use courier::Priority;

/// Courier — resilient request pipeline for a single backend endpoint.
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "courier.toml")]
    pub config: String,

    /// Print pipeline notifications as they happen.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Priority accepted on the command line, mapped to
/// [`Priority`](courier::Priority) internally.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    /// Drains before everything else.
    High,
    /// The default lane.
    Normal,
    /// Background work.
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::High => Priority::High,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::Low => Priority::Low,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit one operation and wait for its result.
    Send {
        /// Logical operation name, without the action namespace prefix.
        name: String,

        /// Payload fields as key=value pairs. Values that parse as JSON
        /// keep their type; anything else is sent as a string.
        fields: Vec<String>,

        #[arg(long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,

        /// Override the global retry cap for this operation.
        #[arg(long)]
        max_retries: Option<u32>,

        /// Override the request timeout for this operation, in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Submit same-name operations from a JSON file as one batch.
    Batch {
        /// Logical operation name shared by every member.
        name: String,

        /// JSON file holding an array of payload objects.
        #[arg(long)]
        file: String,

        /// Abort remaining members after the first failure.
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },

    /// Show pipeline metrics, breaker states and recent history.
    Status {
        /// Only failed operations.
        #[arg(long, default_value_t = false)]
        failures: bool,

        /// History entries to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Parse one `key=value` payload argument.
pub fn parse_field(arg: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{arg}'"))?;
    if key.is_empty() {
        anyhow::bail!("empty key in '{arg}'");
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
