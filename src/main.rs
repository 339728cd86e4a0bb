use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_responsiveness::config::{ALLOWED_SLOW_CALLS, SUMMARY_NAME, USE_SIMPLE_LATENCY_QUERY};
use api_responsiveness::load_generator::{self, LoadProfile};
use api_responsiveness::{ApiResponsivenessGatherer, InMemoryBackend, MeasurementConfig};
use clap::Parser;
use serde_json::{Map, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "api-responsiveness",
    about = "Generate synthetic API traffic and check it against latency SLOs"
)]
struct Args {
    /// How long to generate traffic (seconds)
    #[arg(long, default_value_t = 5)]
    duration: u64,

    /// Number of concurrent traffic workers
    #[arg(long, default_value_t = 8)]
    concurrency: u32,

    /// Percentage of calls (0–100) made slower than every objective
    #[arg(long, default_value_t = 0)]
    slow_pct: u8,

    /// Query each quantile directly instead of the windowed SLI
    #[arg(long)]
    simple_latency_query: bool,

    /// Slow calls tolerated per dimension before a breach counts
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    allowed_slow_calls: i64,

    /// Name for the rendered summary
    #[arg(long)]
    summary_name: Option<String>,

    /// Identifier prefixed to diagnostic lines
    #[arg(long, default_value = "demo")]
    identifier: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.slow_pct > 100 {
        eprintln!("--slow-pct must be between 0 and 100");
        process::exit(3);
    }

    // ── 1. Generate traffic ──────────────────────────────────────
    let backend = Arc::new(InMemoryBackend::new());
    let start = chrono::Utc::now();
    let profile = LoadProfile {
        concurrency: args.concurrency,
        duration: Duration::from_secs(args.duration),
        slow_pct: args.slow_pct,
    };
    info!(?profile, "generating api traffic");

    // Ctrl-C ends traffic early; the gather still runs on what was recorded
    let running = Arc::new(AtomicBool::new(true));
    let stop = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping traffic");
            stop.store(false, Ordering::SeqCst);
        }
    });
    load_generator::run(running, backend.clone(), profile).await;
    info!(
        calls = backend.total_calls(),
        series = backend.series_count(),
        "traffic done"
    );

    // ── 2. Gather & validate ─────────────────────────────────────
    let config = MeasurementConfig::new(args.identifier.clone(), params(&args));
    let gathered = tokio::task::spawn_blocking(move || {
        ApiResponsivenessGatherer.gather(&backend, start, &config)
    })
    .await;

    let outcome = match gathered {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!("gather failed: {e}");
            process::exit(3);
        }
        Err(e) => {
            error!("gather task panicked: {e}");
            process::exit(3);
        }
    };

    // ── 3. Report ────────────────────────────────────────────────
    println!("{}", outcome.summary.content);
    match outcome.violation {
        None => info!(summary = %outcome.summary.name, "PASS"),
        Some(v) => {
            error!("FAIL: {v}");
            process::exit(1);
        }
    }
}

fn params(args: &Args) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(USE_SIMPLE_LATENCY_QUERY.into(), args.simple_latency_query.into());
    params.insert(ALLOWED_SLOW_CALLS.into(), args.allowed_slow_calls.into());
    if let Some(name) = &args.summary_name {
        params.insert(SUMMARY_NAME.into(), name.clone().into());
    }
    params
}
