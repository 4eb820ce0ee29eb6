//! CLI command definitions for the `lurk` binary.

pub mod ask;
pub mod providers;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Ask many LLMs at once and merge their answers.
#[derive(Parser)]
#[command(name = "lurk", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value_t = 3000, env = "LURK_PORT")]
        port: u16,

        /// Host address to bind to.
        #[arg(long, default_value = "127.0.0.1", env = "LURK_HOST")]
        host: String,
    },

    /// Send one prompt to several providers and print their answers.
    Ask {
        /// The prompt to send.
        prompt: String,

        /// Provider ids to ask (repeatable). Defaults to every enabled provider.
        #[arg(short, long = "provider")]
        providers: Vec<String>,

        /// Attachment reference appended to the prompt (repeatable).
        #[arg(long = "attach")]
        attachments: Vec<String>,

        /// Merge the answers into one when every provider has replied.
        #[arg(long)]
        synthesize: bool,
    },

    /// List configured providers and whether their credential is set.
    Providers,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Tracing filter for the requested verbosity.
pub fn verbosity_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,lurk=debug",
        _ => "trace",
    }
}
