use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rotation_model::{ControlRequest, ControlResponse, NotificationTag};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::engine::RotationEngine;
use crate::events::SchedulerCommand;

/// Serve newline-delimited JSON control requests until cancelled.
#[instrument(skip_all, fields(socket = %socket_path.display()))]
pub async fn run(
    socket_path: PathBuf,
    engine: Arc<RotationEngine>,
    to_scheduler: Sender<SchedulerCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = bind(&socket_path)?;
    info!("control socket listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; closing control socket");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let engine = Arc::clone(&engine);
                    let to_scheduler = to_scheduler.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(err) = serve_client(stream, engine, to_scheduler, cancel).await {
                            debug!(error = ?err, "control client ended with error");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "failed to accept control client"),
            },
        }
    }

    drop(listener);
    if let Err(err) = fs::remove_file(&socket_path) {
        debug!(error = %err, "control socket already gone");
    }
    Ok(())
}

fn bind(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if socket_path.exists() {
        fs::remove_file(socket_path).with_context(|| {
            format!("failed to remove stale socket {}", socket_path.display())
        })?;
    }
    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("failed to bind {}", socket_path.display()))?;
    fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict {}", socket_path.display()))?;
    Ok(listener)
}

/// The scheduler message for requests that change rotation state.
fn scheduler_command(request: ControlRequest) -> Option<SchedulerCommand> {
    match request {
        ControlRequest::Start { config } => Some(SchedulerCommand::Start(config)),
        ControlRequest::Stop => Some(SchedulerCommand::Stop),
        ControlRequest::SkipNext => Some(SchedulerCommand::SkipNext),
        ControlRequest::SkipPrevious => Some(SchedulerCommand::SkipPrevious),
        ControlRequest::SelectFolder { path } => Some(SchedulerCommand::ConfigChanged(
            rotation_model::ConfigPatch::folder(path),
        )),
        ControlRequest::RequestSnapshot => Some(SchedulerCommand::RequestSnapshot),
        ControlRequest::Status | ControlRequest::Subscribe => None,
    }
}

async fn serve_client(
    stream: UnixStream,
    engine: Arc<RotationEngine>,
    to_scheduler: Sender<SchedulerCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match ControlRequest::parse_line(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "rejecting malformed control request");
                let message = format!("{err:#}");
                respond(&mut writer, &ControlResponse::Error { message }).await?;
                continue;
            }
        };
        debug!(?request, "control request");

        match request {
            ControlRequest::Status => {
                let snapshot = engine.snapshot(NotificationTag::UpdateUi);
                respond(&mut writer, &ControlResponse::Snapshot(snapshot)).await?;
            }
            ControlRequest::Subscribe => {
                return stream_notifications(&mut writer, &engine, &cancel).await;
            }
            other => {
                let Some(command) = scheduler_command(other) else {
                    continue;
                };
                let response = match to_scheduler.send(command).await {
                    Ok(()) => ControlResponse::Ok,
                    Err(_) => ControlResponse::Error {
                        message: "scheduler is shutting down".into(),
                    },
                };
                respond(&mut writer, &response).await?;
            }
        }
    }
    Ok(())
}

/// Send a fresh snapshot, then every notification until the client leaves.
async fn stream_notifications(
    writer: &mut OwnedWriteHalf,
    engine: &RotationEngine,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut updates = engine.notifier().subscribe();
    let snapshot = engine.snapshot(NotificationTag::UpdateUi);
    respond(writer, &ControlResponse::Snapshot(snapshot)).await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            received = updates.recv() => match received {
                Ok(notification) => {
                    respond(writer, &ControlResponse::Snapshot(notification)).await?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagging; notifications dropped");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn respond(writer: &mut OwnedWriteHalf, response: &ControlResponse) -> Result<()> {
    writer
        .write_all(response.to_line()?.as_bytes())
        .await
        .context("failed to write control response")?;
    writer.flush().await.context("failed to flush control response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotation_model::ConfigPatch;

    #[test]
    fn select_folder_becomes_folder_only_patch() {
        let command = scheduler_command(ControlRequest::SelectFolder {
            path: PathBuf::from("/srv/walls"),
        });
        assert_eq!(
            command,
            Some(SchedulerCommand::ConfigChanged(ConfigPatch::folder("/srv/walls")))
        );
    }

    #[test]
    fn read_only_requests_bypass_scheduler() {
        assert_eq!(scheduler_command(ControlRequest::Status), None);
        assert_eq!(scheduler_command(ControlRequest::Subscribe), None);
        assert_eq!(
            scheduler_command(ControlRequest::SkipPrevious),
            Some(SchedulerCommand::SkipPrevious)
        );
    }
}
