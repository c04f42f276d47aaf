use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use trendmon_server::commands;
use trendmon_server::config::ServerConfig;
use trendmon_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  trendmon-server ingest <config.toml> <samples.json>                         Ingest a JSON array of samples");
    eprintln!("  trendmon-server tendencies <config.toml> <views,...> <metrics,...>          Print metric tendencies");
    eprintln!("  trendmon-server period <config.toml> <name> <identifier> <minute|hour> <ms>  Print the aggregate of one period");
    eprintln!("  trendmon-server prune <config.toml> <name> <identifier> <minute|hour>       Remove periods beyond retention");
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, message: &str) -> Result<&'a str> {
    args.get(index).map(String::as_str).ok_or_else(|| {
        print_usage();
        anyhow::anyhow!("{message}")
    })
}

fn open_state(config_path: &str) -> Result<AppState> {
    let config = ServerConfig::load(config_path)?;
    tracing::info!(
        config = config_path,
        database = %config.database_path().display(),
        "Loaded configuration"
    );
    AppState::open(&config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trendmon=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("ingest") => {
            let config_path = arg(&args, 2, "ingest requires <config.toml> and <samples.json> arguments")?;
            let samples_path = arg(&args, 3, "ingest requires <samples.json> argument")?;
            let state = open_state(config_path)?;
            let report = commands::ingest_file(&state, Path::new(samples_path))?;
            print_json(&report)
        }
        Some("tendencies") => {
            let config_path = arg(&args, 2, "tendencies requires <config.toml>, <views> and <metrics> arguments")?;
            let views = commands::parse_list(arg(&args, 3, "tendencies requires <views> argument")?);
            let metrics = commands::parse_list(arg(&args, 4, "tendencies requires <metrics> argument")?);
            let state = open_state(config_path)?;
            let result = commands::tendencies(&state, &views, &metrics)?;
            print_json(&result)
        }
        Some("period") => {
            let config_path = arg(&args, 2, "period requires <config.toml>, <name>, <identifier>, <granularity> and <timestamp_ms> arguments")?;
            let name = arg(&args, 3, "period requires <name> argument")?;
            let identifier = arg(&args, 4, "period requires <identifier> argument")?;
            let granularity = commands::parse_granularity(arg(&args, 5, "period requires <granularity> argument")?)?;
            let timestamp = commands::parse_timestamp_ms(arg(&args, 6, "period requires <timestamp_ms> argument")?)?;
            let state = open_state(config_path)?;
            let aggregate = commands::period(&state, name, identifier, granularity, timestamp)?;
            print_json(&aggregate)
        }
        Some("prune") => {
            let config_path = arg(&args, 2, "prune requires <config.toml>, <name>, <identifier> and <granularity> arguments")?;
            let name = arg(&args, 3, "prune requires <name> argument")?;
            let identifier = arg(&args, 4, "prune requires <identifier> argument")?;
            let granularity = commands::parse_granularity(arg(&args, 5, "prune requires <granularity> argument")?)?;
            let state = open_state(config_path)?;
            let report = commands::prune(&state, name, identifier, granularity)?;
            print_json(&report)
        }
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            anyhow::bail!("unknown command: {other}")
        }
        None => {
            print_usage();
            anyhow::bail!("missing command")
        }
    }
}
