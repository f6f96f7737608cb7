use clap::Parser;
use tracing_subscriber::EnvFilter;

use trendwatch_lib::{run, RunOptions, SortOrder};

/// Google Trends dashboard for Bangladesh and the United Kingdom.
#[derive(Debug, Parser)]
#[command(name = "trendwatch", version, about)]
struct Args {
    /// Load once, print the dashboard and exit
    #[arg(long)]
    once: bool,

    /// Print the dashboard state as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Initial sort order by publication date (asc or desc)
    #[arg(long, default_value_t = SortOrder::Desc)]
    order: SortOrder,

    /// Refresh period in seconds, overriding TRENDWATCH_REFRESH_SECS
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = RunOptions {
        once: args.once,
        json: args.json,
        order: args.order,
        interval_secs: args.interval_secs,
    };
    if let Err(err) = run(options).await {
        tracing::error!(error = %err, "trendwatch failed");
        std::process::exit(1);
    }
}
