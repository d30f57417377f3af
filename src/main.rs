use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use wallpaper_rotator::bridge::Notifier;
use wallpaper_rotator::config::{Configuration, RotationConfig};
use wallpaper_rotator::engine::RotationEngine;
use wallpaper_rotator::events::SchedulerCommand;
use wallpaper_rotator::sink::FileSink;
use wallpaper_rotator::store::JsonFileStore;
use wallpaper_rotator::tasks;

#[derive(Debug, Parser)]
#[command(
    name = "wallpaper-rotator",
    version,
    about = "Rotates lock-screen and home-screen wallpapers from a folder"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Do not start rotating until a start request arrives
    #[arg(long)]
    no_autostart: bool,
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        no_autostart,
        verbose,
    } = Args::parse();

    let default_level = match verbose {
        0 => "info",
        1 => "info,wallpaper_rotator=debug",
        _ => "debug,wallpaper_rotator=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg
    );

    let store = JsonFileStore::open(&cfg.settings_path)
        .context("failed to open rotation settings")?;
    tracing::info!(path = %store.path().display(), "rotation settings opened");
    let initial = RotationConfig::load(&store, &cfg.defaults);
    let engine = Arc::new(RotationEngine::new(
        initial,
        cfg.catalog.clone(),
        Arc::new(FileSink::new(&cfg.sink)),
        Arc::new(cfg.screen),
        Notifier::new(32),
    ));

    let (command_tx, command_rx) = mpsc::channel::<SchedulerCommand>(16); // Control -> Scheduler
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            tracing::info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    let mut tasks = JoinSet::new();

    // RotationScheduler
    tasks.spawn({
        let engine = Arc::clone(&engine);
        let defaults = cfg.defaults.clone();
        let cancel = cancel.clone();
        async move {
            tasks::scheduler::run(engine, Box::new(store), defaults, command_rx, cancel)
                .await
                .context("scheduler task failed")
        }
    });

    // Control socket
    tasks.spawn({
        let socket = cfg.control_socket_path.clone();
        let engine = Arc::clone(&engine);
        let to_scheduler = command_tx.clone();
        let cancel = cancel.clone();
        async move {
            tasks::control::run(socket, engine, to_scheduler, cancel)
                .await
                .context("control task failed")
        }
    });

    if cfg.autostart && !no_autostart {
        command_tx
            .send(SchedulerCommand::Start(None))
            .await
            .context("failed to request autostart")?;
    }
    drop(command_tx);

    // Any task ending early takes the daemon down with it.
    if let Some(res) = tasks.join_next().await {
        log_task_result(res);
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        log_task_result(res);
    }

    Ok(())
}

fn log_task_result(res: Result<Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("task error: {e:?}"),
        Err(e) => tracing::error!("join error: {e}"),
    }
}
