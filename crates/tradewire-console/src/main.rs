/*
[INPUT]:  CLI arguments, YAML profile, OS shutdown signals
[OUTPUT]: Supervised venue session with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tradewire_console::{ConsoleHandler, ConsoleProfile};
use tradewire_session::{SessionStatus, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "tradewire-console", version, about = "Headless WAMP venue console")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting tradewire-console"
    );

    let profile = load_profile(&args.config_path)?;
    info!(
        endpoint = %profile.endpoint,
        subscriptions = profile.subscriptions.len(),
        calls = profile.calls.len(),
        "profile loaded"
    );

    if args.dry_run {
        info!("dry-run requested; profile validated");
        return Ok(());
    }

    let endpoint = profile.endpoint()?;
    let mut supervisor =
        Supervisor::new(endpoint, profile.session.clone()).context("create supervisor")?;

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let mut handler = ConsoleHandler::new(profile);
    let status = supervisor.run(&mut handler, shutdown).await;
    info!(
        %status,
        sessions = handler.sessions(),
        events_seen = handler.events_seen(),
        "supervisor stopped"
    );

    match status {
        SessionStatus::Closed { .. } => Ok(()),
        other => {
            error!(%other, "console stopped abnormally");
            Err(anyhow!("console stopped: {other}"))
        }
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_profile(path: &PathBuf) -> Result<ConsoleProfile> {
    let path_str = path.to_str().context("config path must be valid utf-8")?;
    let profile = ConsoleProfile::from_file(path_str).context("load profile")?;
    profile.validate().context("validate profile")?;
    Ok(profile)
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
