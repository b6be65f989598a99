use clap::{Args as ClapArgs, Parser, Subcommand};
use crossterm::cursor::Show;
use crossterm::execute;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use buildwatch::config::{self, ConfigDoc, DashboardConfig};
use buildwatch::log_capture::LogCaptureLayer;
use buildwatch::simulate::{self, SimulateConfig};
use buildwatch::ui::{self, Dashboard};
use buildwatch::{BuildEventSink, BuildState, Error, Result, replay};
use toml::Value;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, ClapArgs)]
struct CommonArgs {
    /// Dashboard/simulation config TOML
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Build nodes to display (0 = use CPU count)
    #[arg(long, global = true)]
    nodes: Option<usize>,
    /// Milliseconds between repaints
    #[arg(long, global = true)]
    interval_ms: Option<u64>,
    /// Lowest importance of plain messages to show (low, normal, high)
    #[arg(long, global = true)]
    importance: Option<String>,
    /// Print line-oriented progress instead of the live region
    #[arg(long, global = true)]
    plain: bool,
    /// Override a config value, e.g. --set dashboard.message_rows=4
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Feed a recorded JSON-lines event stream into the dashboard
    Replay {
        /// File with one build event per line
        events: PathBuf,
        /// Delay between events
        #[arg(long, default_value_t = 20)]
        pace_ms: u64,
    },
    /// Run a synthetic parallel build and watch it
    Simulate,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let doc = load_doc(&args.common)?;
    let cfg = DashboardConfig::from_doc(&doc)?;

    let state = Arc::new(BuildState::new(
        cfg.node_count(),
        cfg.message_cap,
        cfg.importance,
    ));
    init_tracing(&cfg, &state);

    let dashboard = Dashboard::start(Arc::clone(&state), &cfg)?;
    let result = match args.cmd {
        Command::Replay { events, pace_ms } => cmd_replay(&events, pace_ms, &state),
        Command::Simulate => cmd_simulate(&doc, &cfg, &state),
    };
    if !dashboard.shutdown() && ui::wants_live(&cfg) {
        // The redraw thread still owns the region; at least give the cursor back.
        warn!("exiting before the live display was restored");
        let _ = execute!(io::stdout(), Show);
    }
    result
}

fn load_doc(common: &CommonArgs) -> Result<ConfigDoc> {
    let doc = match &common.config {
        Some(path) => config::load(path)?,
        None => ConfigDoc::default(),
    };

    let mut overrides = Value::Table(Default::default());
    if let Some(n) = common.nodes {
        let n = i64::try_from(n).map_err(|_| Error::config(format!("--nodes {n} is too large")))?;
        config::set_override(&mut overrides, "dashboard.nodes", Value::Integer(n))?;
    }
    if let Some(ms) = common.interval_ms {
        let ms = i64::try_from(ms)
            .map_err(|_| Error::config(format!("--interval-ms {ms} is too large")))?;
        config::set_override(&mut overrides, "dashboard.redraw_interval_ms", Value::Integer(ms))?;
    }
    if let Some(importance) = &common.importance {
        let importance: buildwatch::Importance = importance.parse().map_err(Error::config)?;
        config::set_override(
            &mut overrides,
            "dashboard.importance",
            Value::String(importance.as_str().to_string()),
        )?;
    }
    if common.plain {
        config::set_override(&mut overrides, "dashboard.plain", Value::Boolean(true))?;
    }
    for raw in &common.overrides {
        let (key, value) = config::parse_assignment(raw)?;
        config::set_override(&mut overrides, &key, value)?;
    }
    Ok(doc.with_overrides(overrides))
}

fn init_tracing(cfg: &DashboardConfig, state: &Arc<BuildState>) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter =
        EnvFilter::try_from_env("BUILDWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    if ui::wants_live(cfg) {
        // stderr would tear the live region; show our own warnings in the tail.
        tracing_subscriber::registry()
            .with(LogCaptureLayer::new(Arc::clone(state)).with_filter(filter))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn cmd_replay(events: &Path, pace_ms: u64, state: &BuildState) -> Result<()> {
    let stats = replay::replay_file(events, state, Duration::from_millis(pace_ms))?;
    if stats.skipped > 0 {
        info!(skipped = stats.skipped, "some lines were not valid events");
    }
    Ok(())
}

fn cmd_simulate(doc: &ConfigDoc, cfg: &DashboardConfig, state: &Arc<BuildState>) -> Result<()> {
    let sim = SimulateConfig::from_doc(doc)?;
    let sink: Arc<dyn BuildEventSink> = Arc::<BuildState>::clone(state);
    simulate::run(&sim, cfg.node_count(), sink)?;
    Ok(())
}
