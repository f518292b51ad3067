//! Kiosk Agent
//!
//! Runs the check-in durability pipeline on a kiosk device and offers a few
//! maintenance commands against its on-device queue.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use kiosk_agent::background_sync::PostOutcome;
use kiosk_agent::network::probe_once;
use kiosk_agent::remote::{HttpRemoteStore, build_http_client};
use kiosk_agent::{Agent, Connectivity, Notice, Submission};
use kiosk_core::{CheckInRecord, ClockTime, Config};

#[derive(Parser, Debug)]
#[command(name = "kiosk-agent")]
#[command(version, about = "Kiosk agent - offline-resilient check-in submission")]
struct Args {
    /// Directory holding the on-device stores
    #[arg(long, global = true, env = "KIOSK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Base URL of the remote document store
    #[arg(long, global = true, env = "KIOSK_REMOTE_URL")]
    remote_url: Option<String>,

    /// Log level filter for the agent (e.g. "info", "debug", "warn").
    #[arg(long, global = true, env = "KIOSK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true, env = "KIOSK_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent until interrupted
    Run,
    /// Submit a single check-in
    Submit(SubmitArgs),
    /// Print the queued check-ins as JSON
    Pending,
    /// Run one resend pass over the queue
    Drain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Via {
    /// Remote document store, with device-queue fallback
    Store,
    /// HTTP submission endpoint, with background sync fallback
    Http,
}

#[derive(clap::Args, Debug)]
struct SubmitArgs {
    #[arg(long)]
    room: String,

    /// Start time, HH:MM
    #[arg(long)]
    start: ClockTime,

    /// End time, HH:MM
    #[arg(long)]
    end: ClockTime,

    /// Number of occupants
    #[arg(long, default_value_t = 1)]
    count: u32,

    #[arg(long)]
    purpose: String,

    #[arg(long)]
    age_group: String,

    #[arg(long)]
    reservation_id: Option<String>,

    #[arg(long, value_enum, default_value = "store")]
    via: Via,
}

impl SubmitArgs {
    fn record(&self) -> CheckInRecord {
        let record = CheckInRecord::new(
            self.room.clone(),
            self.start,
            self.end,
            self.count,
            self.purpose.clone(),
            self.age_group.clone(),
        );
        match &self.reservation_id {
            Some(id) => record.with_reservation(id.clone()),
            None => record,
        }
    }
}

fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let cwd = std::env::current_dir().ok();
    let mut config = kiosk_core::config::load_config(cwd.as_deref())?;
    if let Some(dir) = &args.data_dir {
        config.agent.data_dir = Some(dir.clone());
    }
    if let Some(url) = &args.remote_url {
        config.agent.remote_url.clone_from(url);
    }
    if let Some(level) = &args.log_level {
        config.agent.log_level.clone_from(level);
    }
    Ok(config)
}

/// Data directory: configured, platform default, or `~/.kiosk`.
fn data_dir(config: &Config) -> anyhow::Result<PathBuf> {
    if let Some(dir) = config.agent.resolved_data_dir() {
        return Ok(dir);
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".kiosk"))
}

fn write_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    let log_filter = format!("kiosk_agent={}", config.agent.log_level);
    kiosk_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let data_dir = data_dir(&config)?;
    let http = build_http_client(config.agent.request_timeout())
        .context("Failed to build HTTP client")?;
    let remote = Arc::new(HttpRemoteStore::with_client(
        config.agent.remote_url.clone(),
        http.clone(),
    ));

    let initial = probe_once(&http, &config.agent.remote_url).await;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %data_dir.display(),
        remote_url = %config.agent.remote_url,
        ?initial,
        "Starting kiosk-agent"
    );

    let agent = Agent::build(&config, &data_dir, remote, http, initial).await;

    match args.command {
        Command::Run => run(&agent).await,
        Command::Submit(submit) => submit_one(&agent, &submit, initial).await,
        Command::Pending => write_json(&agent.queue().try_list_all().await?),
        Command::Drain => {
            let sent = agent.resync().drain().await;
            write_json(&serde_json::json!({ "sent": sent }))
        }
    }
}

async fn run(agent: &Agent) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut notices = agent.notifier().subscribe();
    let mut messages = agent.background_sync().subscribe();
    let tasks = agent.start(&shutdown_rx);

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    sd_notify::notify(false, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();
    tokio::pin!(sigterm_future);

    loop {
        tokio::select! {
            Ok(notice) = notices.recv() => {
                if let Notice::NotRecorded { reason } = notice {
                    warn!(%reason, "Check-in lost to the device");
                }
            }
            Ok(message) = messages.recv() => {
                info!(?message, "Background sync message");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C shutdown signal");
                break;
            }
            _ = &mut sigterm_future => {
                info!("Received SIGTERM shutdown signal");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    info!("Agent stopped");
    Ok(())
}

async fn submit_one(
    agent: &Agent,
    args: &SubmitArgs,
    connectivity: Connectivity,
) -> anyhow::Result<()> {
    let record = args.record();

    match args.via {
        Via::Store => {
            let outcome = agent.pipeline().submit(&record).await?;
            let status = match &outcome {
                Submission::Delivered(id) => serde_json::json!({ "status": "delivered", "id": id }),
                Submission::SavedOffline => serde_json::json!({
                    "status": "saved_offline",
                    "online": connectivity.is_online(),
                }),
            };
            write_json(&status)
        }
        Via::Http => {
            let status = match agent.checkin_client().post_checkin(&record).await? {
                PostOutcome::Response(code) => {
                    serde_json::json!({ "status": "answered", "code": code.as_u16() })
                }
                PostOutcome::Queued => serde_json::json!({ "status": "queued" }),
            };
            write_json(&status)
        }
    }
}
