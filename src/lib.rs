pub mod core;

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::core::config::{ConfigError, TrendwatchConfig};
use crate::core::dashboard::{spawn_load, spawn_refresh_loop, Dashboard, DashboardSnapshot};
use crate::core::feed::fetcher::{FetchError, TrendsFetcher};
use crate::core::feed::types::{FeedData, Geo};
use crate::core::view::render_dashboard;

pub use crate::core::dashboard::sort::SortOrder;

const HELP_LINE: &str = "commands: r = refresh now, s = toggle sort order, q = quit";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub once: bool,
    pub json: bool,
    pub order: SortOrder,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Refresh,
    ToggleSort,
    Quit,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "" => None,
        "r" | "refresh" => Some(Command::Refresh),
        "s" | "sort" => Some(Command::ToggleSort),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => Some(Command::Help),
    }
}

/// What one line read from stdin means for the command loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StdinEvent {
    Command(Command),
    Blank,
    Closed,
}

/// Unreadable input (e.g. a line that is not UTF-8) disables commands like EOF
/// does; the dashboard itself keeps running.
fn stdin_event(line: std::io::Result<Option<String>>) -> StdinEvent {
    match line {
        Ok(Some(line)) => parse_command(&line).map_or(StdinEvent::Blank, StdinEvent::Command),
        Ok(None) => {
            tracing::debug!("stdin closed, commands disabled");
            StdinEvent::Closed
        }
        Err(err) => {
            tracing::warn!(error = %err, "stdin unreadable, commands disabled");
            StdinEvent::Closed
        }
    }
}

/// Help goes to stdout only in text mode so `--json` output stays parseable.
fn write_help<O: Write, E: Write>(out: &mut O, err: &mut E, json: bool) -> std::io::Result<()> {
    if json {
        writeln!(err, "{HELP_LINE}")
    } else {
        writeln!(out, "{HELP_LINE}")
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    order: SortOrder,
    loading: bool,
    is_live: bool,
    error_message: Option<&'a str>,
    feeds: Vec<FeedData>,
}

fn write_snapshot<W: Write>(
    out: &mut W,
    snapshot: &DashboardSnapshot,
    order: SortOrder,
    json: bool,
) -> Result<(), AppError> {
    if json {
        let sorted = snapshot.sorted(order);
        let report = JsonReport {
            order,
            loading: sorted.loading,
            is_live: sorted.is_live,
            error_message: sorted.error_message.as_deref(),
            feeds: Geo::ALL.iter().map(|geo| sorted.feed(*geo)).collect(),
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", render_dashboard(snapshot, order))?;
    }
    out.flush()?;
    Ok(())
}

fn print_snapshot(snapshot: &DashboardSnapshot, order: SortOrder, json: bool) -> Result<(), AppError> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_snapshot(&mut handle, snapshot, order, json)
}

pub async fn run(options: RunOptions) -> Result<(), AppError> {
    let mut config = TrendwatchConfig::from_env()?;
    if let Some(secs) = options.interval_secs {
        config = config.with_refresh_secs(secs)?;
    }
    let relay_names: Vec<&str> = config.relays.iter().map(|relay| relay.name()).collect();
    tracing::info!(
        base_url = %config.feed_base_url,
        relays = ?relay_names,
        refresh_secs = config.refresh_interval.as_secs(),
        "trendwatch starting"
    );

    let fetcher = Arc::new(TrendsFetcher::from_config(&config)?);
    let dashboard = Dashboard::new();
    let mut order = options.order;

    if options.once {
        dashboard.load_data(fetcher.as_ref()).await;
        return print_snapshot(&dashboard.snapshot(), order, options.json);
    }

    let mut updates = dashboard.subscribe();
    let refresh = spawn_refresh_loop(&dashboard, Arc::clone(&fetcher), config.refresh_interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_printed: Option<DashboardSnapshot> = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = dashboard.snapshot();
                // Only settled states are printed; begin/commit/finish each bump the revision.
                if !snapshot.loading && last_printed.as_ref() != Some(&snapshot) {
                    print_snapshot(&snapshot, order, options.json)?;
                    last_printed = Some(snapshot);
                }
            }
            line = lines.next_line(), if stdin_open => {
                match stdin_event(line) {
                    StdinEvent::Command(Command::Refresh) => {
                        tracing::info!("manual refresh requested");
                        spawn_load(&dashboard, &fetcher);
                    }
                    StdinEvent::Command(Command::ToggleSort) => {
                        order = order.toggle();
                        print_snapshot(&dashboard.snapshot(), order, options.json)?;
                    }
                    StdinEvent::Command(Command::Quit) => break,
                    StdinEvent::Command(Command::Help) => {
                        write_help(&mut std::io::stdout(), &mut std::io::stderr(), options.json)?;
                    }
                    StdinEvent::Blank => {}
                    StdinEvent::Closed => stdin_open = false,
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    refresh.shutdown();
    tracing::info!("trendwatch stopped");
    Ok(())
}
