use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use screenlog_core::{
    aggregate_screen_time, export_logs_as_csv, export_logs_as_json, filter_logs,
    format_totals_minutes,
    live::LIVE_POLL_INTERVAL,
    HttpLogSink, LiveLog, LogFilter, LogStore, NavigationState, ScreenTimeTracker, SqliteLogStore,
    TrackOutcome,
};
use serde::Deserialize;
use serde_json::Value;
use std::{path::PathBuf, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "nav_collector", version)]
struct Args {
    /// Core base URL, e.g. http://127.0.0.1:8087
    #[arg(long, default_value = "http://127.0.0.1:8087")]
    core_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read navigation notifications (one JSON object per line) from stdin and
    /// record dwell times.
    ///
    /// Line shape: {"userId": 42, "state": {"index": 1, "routes": [{"name": "Login"}, {"name": "Survey"}]}}
    /// `state` may also be {"routeName": "Survey"}. Optional "at" (RFC 3339)
    /// overrides the receive time; {"logout": true} clears the cursor.
    Track(TrackArgs),

    /// Fetch a user's logs and print totals, CSV or JSON.
    Report(ReportArgs),
}

#[derive(clap::Args, Debug)]
struct TrackArgs {
    /// Local log store (SQLite).
    #[arg(long, default_value = "./data/screen-logs.db")]
    db: PathBuf,

    /// User id applied to lines that carry none.
    #[arg(long)]
    user: Option<String>,

    /// Do not mirror entries to the core.
    #[arg(long, default_value_t = false)]
    no_sink: bool,

    /// Print the latest tracker line whenever it changes (polled every second).
    #[arg(long, default_value_t = false)]
    live: bool,

    /// Request timeout for the core (milliseconds, 0 = none).
    #[arg(long, default_value_t = 0)]
    sink_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportFormat {
    Totals,
    Csv,
    Json,
}

#[derive(clap::Args, Debug)]
struct ReportArgs {
    #[arg(long)]
    user: String,

    #[arg(long, value_enum, default_value_t = ReportFormat::Totals)]
    format: ReportFormat,

    /// Only entries for this screen.
    #[arg(long)]
    screen: Option<String>,

    /// Only entries recorded on this UTC date (YYYY-MM-DD).
    #[arg(long)]
    date: Option<String>,

    /// Read the local store instead of the core.
    #[arg(long)]
    local_db: Option<PathBuf>,
}

#[derive(Deserialize)]
struct NavLine {
    #[serde(rename = "userId", default)]
    user_id: Option<Value>,
    #[serde(default)]
    state: Option<NavigationState>,
    #[serde(default)]
    at: Option<String>,
    #[serde(default)]
    logout: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nav_collector=info,screenlog_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let core_url = args.core_url.trim_end_matches('/').to_string();
    match args.command {
        Command::Track(t) => track(&core_url, t).await,
        Command::Report(r) => report(&core_url, r).await,
    }
}

async fn track(core_url: &str, args: TrackArgs) -> anyhow::Result<()> {
    let store = SqliteLogStore::open(&args.db)?;
    let sink = if args.no_sink {
        None
    } else {
        let timeout = (args.sink_timeout_ms > 0).then(|| Duration::from_millis(args.sink_timeout_ms));
        Some(HttpLogSink::with_timeout(core_url, timeout)?)
    };

    let live = LiveLog::new();
    if args.live {
        tokio::spawn(poll_live_log(live.clone()));
    }
    let mut tracker = ScreenTimeTracker::with_live_log(store, sink, live);

    if args.no_sink {
        info!("Navigation collector started. Remote mirroring disabled");
    } else {
        info!("Navigation collector started. Mirroring to {core_url}/api/screen-logs/<user>");
    }
    info!("Local store: {}", args.db.display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let nav: NavLine = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("skipping malformed line: {e}");
                continue;
            }
        };

        if nav.logout {
            info!("logout; cursor cleared");
            tracker.reset();
            continue;
        }
        let Some(state) = nav.state else {
            debug!("line without navigation state ignored");
            continue;
        };

        let user = nav.user_id.as_ref().and_then(user_id_string).or_else(|| args.user.clone());
        let now = received_at(nav.at.as_deref());

        match tracker.observe(&state, user.as_deref(), now).await {
            TrackOutcome::Recorded {
                entry,
                stored,
                mirrored,
            } => {
                debug!(
                    "recorded {} {}s (stored: {}, mirrored: {})",
                    entry.screen,
                    entry.duration,
                    stored.is_delivered(),
                    mirrored.is_delivered()
                );
            }
            TrackOutcome::Started => debug!("tracking started"),
            TrackOutcome::Skipped => debug!("transition skipped"),
        }
    }

    info!("input closed; exiting");
    Ok(())
}

/// Numbers and strings are both accepted as user ids.
fn user_id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn received_at(at: Option<&str>) -> DateTime<Utc> {
    match at {
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                warn!("bad \"at\" value '{s}' ({e}); using receive time");
                Utc::now()
            }
        },
        None => Utc::now(),
    }
}

async fn poll_live_log(live: LiveLog) {
    let mut interval = tokio::time::interval(LIVE_POLL_INTERVAL);
    let mut shown: Option<String> = None;
    loop {
        interval.tick().await;
        let text = live.display_text();
        if shown.as_deref() != Some(text.as_str()) {
            println!("[live] {text}");
            shown = Some(text);
        }
    }
}

async fn report(core_url: &str, args: ReportArgs) -> anyhow::Result<()> {
    let logs = match &args.local_db {
        Some(path) => SqliteLogStore::open(path)?.read_all(&args.user),
        None => HttpLogSink::new(core_url).fetch_logs(&args.user).await?,
    };
    let filter = LogFilter {
        screen: args.screen,
        date: args.date,
    };
    let logs = filter_logs(&logs, &filter);

    match args.format {
        ReportFormat::Totals => {
            println!("Screen usage for user {}", args.user);
            for line in format_totals_minutes(&aggregate_screen_time(&logs)) {
                println!("{line}");
            }
        }
        ReportFormat::Csv => println!("{}", export_logs_as_csv(&logs)),
        ReportFormat::Json => println!("{}", export_logs_as_json(&logs)),
    }
    Ok(())
}
