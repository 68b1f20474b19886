//! opsdash-query entry point.
//!
//! Opens one live query and drives it from stdin: each JSON object line
//! replaces the params, `!refetch`, `!invalidate` and `!bump` trigger the
//! matching operation. Every published state is printed to stdout as a JSON
//! line. Logging goes to stderr so stdout stays machine-readable.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use opsdash_client::{QueryClient, QueryState};
use opsdash_core::{AppConfig, TtlClass};

mod input;

use input::Command;

/// Run a debounced, cached dashboard query from the terminal.
#[derive(Parser)]
#[command(name = "opsdash-query")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Endpoint path, e.g. /api/metrics/sla
    endpoint: String,

    /// Initial params as key=value; repeat a key for a list
    #[arg(short, long = "param")]
    params: Vec<String>,

    /// Cache lifetime class
    #[arg(long, value_enum, default_value = "short")]
    ttl: TtlArg,

    /// Override the configured debounce, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Query even when no filter is set
    #[arg(long)]
    allow_empty: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum TtlArg {
    Short,
    Long,
}

impl From<TtlArg> for TtlClass {
    fn from(arg: TtlArg) -> Self {
        match arg {
            TtlArg::Short => TtlClass::Short,
            TtlArg::Long => TtlClass::Long,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    let initial = input::params_from_pairs(&cli.params).map_err(anyhow::Error::msg)?;

    tracing::info!(base_url = %config.base_url, endpoint = %cli.endpoint, "Starting opsdash-query");

    let client = QueryClient::from_config(config)?;
    let mut options = client.default_options().with_ttl(client.config().ttl_for(cli.ttl.into()));
    if let Some(ms) = cli.debounce_ms {
        options = options.with_debounce(Duration::from_millis(ms));
    }
    options = options.allow_empty(cli.allow_empty);

    let query = client.query::<Value, Value>(cli.endpoint, initial, options);

    let mut states = query.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            let line = render(&states.borrow_and_update());
            println!("{line}");
            if states.changed().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match input::parse_line(&line) {
            Ok(Command::Params(params)) => query.set_params(params),
            Ok(Command::Refetch) => query.refetch().await,
            Ok(Command::Invalidate) => query.invalidate(),
            Ok(Command::Bump) => {
                client.bump_invalidation();
            }
            Ok(Command::Skip) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring input line"),
        }
    }

    query.settled().await;
    drop(query);
    printer.await.context("state printer failed")?;

    Ok(())
}

fn render(state: &QueryState<Value>) -> String {
    serde_json::to_string(state).unwrap_or_else(|e| format!(r#"{{"error":"unprintable state: {e}"}}"#))
}
