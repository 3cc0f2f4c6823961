//! ragcite CLI: check RAG answers for citations and unsupported facts.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// ragcite: match answer sentences to source passages and flag hallucinations
#[derive(Parser, Debug)]
#[command(name = "ragcite", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (reads `.ragcite/config.toml` from it)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces the user and workspace layers)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Check an answer against its context and print the citation report
    Check {
        /// JSON file with `answer` and `context` fields
        #[arg(short, long)]
        input: PathBuf,
        /// Minimum cosine similarity for a citation
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
        /// Print the intermediate pipeline trace instead of the report
        #[arg(long)]
        trace: bool,
    },
    /// Print the focus words the pipeline would look for in a text
    Focus {
        /// Text to classify
        #[arg(long)]
        text: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file into the workspace
    Init,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (stdout carries the JSON output)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = ragcite_core::config::log_dir().unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ragcite.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let output = commands::handle_command(cli.command, &workspace, cli.config.as_deref())?;
    println!("{output}");
    Ok(())
}
