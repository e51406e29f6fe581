use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatekeeper::config::GatekeeperConfig;
use gatekeeper::ratelimit::{CheckOutcome, CheckPath, RateLimiter};

/// Probe the rate limiter with the process's configuration.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about)]
struct Args {
    /// Identity to check (user id or IP address)
    #[arg(long, required_unless_present = "list")]
    identity: Option<String>,

    /// Rate limit category
    #[arg(long, required_unless_present = "list")]
    category: Option<String>,

    /// Number of consecutive checks to perform
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Optional YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,

    /// Print the policy table and exit
    #[arg(long)]
    list: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Serialize)]
struct ProbeLine<'a> {
    attempt: u32,
    path: String,
    #[serde(flatten)]
    result: &'a gatekeeper::RateLimitResult,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = GatekeeperConfig::load(args.config.as_deref())?;
    info!(
        store = config.store.as_ref().map(|s| s.host.as_str()).unwrap_or("none"),
        store_timeout_ms = config.limiter.store_timeout_ms,
        sweep_interval_secs = config.limiter.sweep_interval_secs,
        "Configuration loaded"
    );

    let limiter = RateLimiter::from_config(&config)?;

    if args.list {
        for category in limiter.registry().categories() {
            let policy = limiter.registry().lookup(category)?;
            println!("{:<28} {:>5} / {}s", category, policy.limit, policy.window_secs);
        }
        return Ok(());
    }

    // clap enforces both when --list is absent
    let identity = args.identity.unwrap_or_default();
    let category = args.category.unwrap_or_default();

    for attempt in 1..=args.count {
        let outcome = limiter.check_detailed(&identity, &category).await?;
        print_outcome(attempt, &outcome, args.json)?;
    }

    let stats = limiter.stats();
    info!(
        persistent = stats.persistent,
        fallback = stats.fallback,
        "Probe finished"
    );

    Ok(())
}

fn print_outcome(attempt: u32, outcome: &CheckOutcome, json: bool) -> anyhow::Result<()> {
    let path = match outcome.path {
        CheckPath::Persistent => "persistent".to_string(),
        CheckPath::Fallback(cause) => format!("fallback ({:?})", cause),
    };

    if json {
        let line = ProbeLine {
            attempt,
            path,
            result: &outcome.result,
        };
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    let verdict = if outcome.result.allowed { "allowed" } else { "denied" };
    println!("#{} {} via {}", attempt, verdict, path);
    for (name, value) in outcome.result.headers().iter() {
        println!("  {}: {}", name, value);
    }
    Ok(())
}
