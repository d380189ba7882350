//! aircanvas - command-line entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use aircanvas::backend;
use aircanvas::net::Session;
use aircanvas::state::CanvasState;
use aircanvas::tracking::source::{LandmarkSource, ReplaySource, ScriptedSource};

#[derive(Parser, Debug)]
#[command(name = "aircanvas", about = "Gesture-driven air drawing with peer replication")]
struct Cli {
    /// Landmark source: scripted or replay
    #[arg(long, default_value = "scripted")]
    source: String,

    /// Landmark recording to replay (with --source replay)
    #[arg(long)]
    replay_file: Option<PathBuf>,

    /// TCP port to host the replication session on
    #[arg(long, default_value_t = 7401)]
    listen_port: u16,

    /// Join a peer's session at HOST:PORT instead of hosting
    #[arg(long)]
    join: Option<String>,

    /// Room code for --join (6 characters, case-insensitive)
    #[arg(long)]
    code: Option<String>,

    /// Active drawing color
    #[arg(long, default_value = "#ffb3ba")]
    color: String,

    /// Frame interval in milliseconds
    #[arg(long, default_value_t = 33)]
    frame_interval: u64,

    /// Exit after N seconds (demo/CI)
    #[arg(long)]
    exit_after: Option<u64>,

    /// Log all session traffic
    #[arg(long)]
    net_trace: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("aircanvas {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aircanvas=info".into()),
        )
        .init();

    info!("aircanvas v{} starting", env!("CARGO_PKG_VERSION"));

    let session = match (&cli.join, &cli.code) {
        (Some(addr), Some(code)) => match Session::join(addr, code, cli.net_trace) {
            Ok(session) => session,
            Err(e) => {
                // No automatic retry; keep working standalone.
                warn!("join failed ({e:#}), hosting a fresh session instead");
                Session::host(cli.listen_port, cli.net_trace)?
            }
        },
        (Some(_), None) => anyhow::bail!("--join requires --code"),
        _ => Session::host(cli.listen_port, cli.net_trace)?,
    };
    info!(
        room_code = session.room_code(),
        role = session.role().as_str(),
        "session ready",
    );

    let source: Box<dyn LandmarkSource> = match cli.source.as_str() {
        "scripted" => Box::new(ScriptedSource::demo()),
        "replay" => {
            let path = cli
                .replay_file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--source replay requires --replay-file"))?;
            Box::new(ReplaySource::from_path(path)?)
        }
        other => anyhow::bail!("unknown source: {other}. Use: scripted or replay"),
    };

    let state = CanvasState::new(session, &cli.color);
    backend::run(
        state,
        source,
        backend::HeadlessConfig {
            frame_interval_ms: cli.frame_interval,
            exit_after: cli.exit_after,
            ..Default::default()
        },
    )
}
