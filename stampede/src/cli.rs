use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr as _;
use std::time::Duration;

use stampede_core::{InjectionMode, JitterPolicy};

/// Accepts humantime strings (`250ms`, `1m 30s`) or a bare number of seconds.
pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    if let Ok(secs) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(secs)
            .map_err(|e| format!("invalid duration '{s}': {e}"));
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m): {e}"))
}

fn parse_mode(input: &str) -> Result<InjectionMode, String> {
    InjectionMode::from_str(input.trim()).map_err(|_| {
        format!("invalid mode '{input}' (expected constant-rate or constant-rate-randomized)")
    })
}

fn parse_jitter(input: &str) -> Result<JitterPolicy, String> {
    JitterPolicy::from_str(input.trim())
        .map_err(|_| format!("invalid jitter '{input}' (expected uniform or poisson)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Live progress on stderr and a human-readable summary.
    HumanReadable,
    /// Emit NDJSON to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Open-model HTTP load generator",
    long_about = "stampede replays a scripted user journey against an HTTP service.\n\n\
        New virtual users arrive at a fixed rate for a fixed duration, regardless of how \
        slowly the target answers; a slow target shows up as rising concurrency and latency, \
        never as fewer arrivals.\n\n\
        A scenario is a YAML document listing request and pause steps. Values captured from \
        responses (tokens, ETags) can be referenced by later steps as ${key}.",
    after_help = "Examples:\n  \
        stampede run scenarios/browse.yaml\n  \
        stampede run scenarios/browse.yaml --rate 20 --duration 2m\n  \
        stampede run scenarios/browse.yaml --mode randomized --seed 7 --output json --stream\n  \
        stampede validate scenarios/browse.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter (e.g. info, stampede_core=debug). Overrides RUST_LOG.
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario document
    #[command(
        long_about = "Load a scenario document and its fixtures, then inject users for the \
            configured duration and wait for every started user to finish.\n\n\
            CLI flags override values from the document's `workload` and `protocol` sections."
    )]
    Run(RunArgs),

    /// Load and check a scenario document without sending any request
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the scenario document (.yaml)
    pub scenario: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario document (.yaml)
    pub scenario: PathBuf,

    /// New users per second
    #[arg(long)]
    pub rate: Option<f64>,

    /// Injection window (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Injection mode: constant-rate | constant-rate-randomized
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<InjectionMode>,

    /// Arrival jitter for randomized mode: uniform | poisson
    #[arg(long, value_parser = parse_jitter)]
    pub jitter: Option<JitterPolicy>,

    /// Seed for randomized arrivals
    #[arg(long)]
    pub seed: Option<u64>,

    /// Per-request timeout (e.g. 5s)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Base URL that relative step URLs are joined onto
    #[arg(long)]
    pub base_url: Option<String>,

    /// Extra attempts after a transport error
    #[arg(long)]
    pub retries: Option<u32>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// With `--output json`, also emit one line per request and user outcome
    #[arg(long)]
    pub stream: bool,
}
