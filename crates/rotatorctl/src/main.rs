use std::env;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rotation_model::{
    ConfigPatch, ControlRequest, ControlResponse, PlacementMode, StateNotification, TargetMode,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const SOCKET_NAME: &str = "wallpaper-rotator.sock";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "rotatorctl",
    about = "Control a running wallpaper rotator daemon"
)]
struct Cli {
    /// Daemon control socket. Defaults to $XDG_RUNTIME_DIR/wallpaper-rotator.sock.
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Logging level (error|warn|info|debug|trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Start rotating, optionally overriding the stored configuration.
    Start {
        /// Seconds between automatic changes.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        interval: Option<u32>,
        /// Folder to draw images from.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// lock-screen, home-screen or both.
        #[arg(long)]
        target: Option<TargetMode>,
        /// full, half, third or quarter.
        #[arg(long)]
        placement: Option<PlacementMode>,
    },
    /// Stop the rotation timer.
    Stop,
    /// Show the next image now.
    Next,
    /// Show the previous image now.
    Previous,
    /// Point the rotation at another folder (applies while stopped).
    SelectFolder { path: PathBuf },
    /// Ask the daemon to broadcast its state to every subscriber.
    Refresh,
    /// Print the daemon's current state.
    Status {
        /// Print the raw JSON snapshot.
        #[arg(long)]
        json: bool,
    },
    /// Stream state notifications until interrupted.
    Watch,
}

impl Command {
    fn request(&self) -> ControlRequest {
        match self {
            Self::Start {
                interval,
                folder,
                target,
                placement,
            } => {
                let patch = ConfigPatch {
                    interval_seconds: *interval,
                    folder_path: folder.clone(),
                    target_mode: *target,
                    placement_mode: *placement,
                };
                ControlRequest::Start {
                    config: (!patch.is_empty()).then_some(patch),
                }
            }
            Self::Stop => ControlRequest::Stop,
            Self::Next => ControlRequest::SkipNext,
            Self::Previous => ControlRequest::SkipPrevious,
            Self::SelectFolder { path } => ControlRequest::SelectFolder { path: path.clone() },
            Self::Refresh => ControlRequest::RequestSnapshot,
            Self::Status { .. } => ControlRequest::Status,
            Self::Watch => ControlRequest::Subscribe,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let socket = cli.socket.clone().unwrap_or_else(default_socket_path);
    let request = cli.command.request();
    let mut session = Session::connect(&socket)?;
    session.send(&request)?;

    match &cli.command {
        Command::Watch => loop {
            match session.read_response()? {
                Some(ControlResponse::Snapshot(snapshot)) => println!("{}", summarize(&snapshot)),
                Some(ControlResponse::Error { message }) => bail!("daemon error: {message}"),
                Some(ControlResponse::Ok) => {}
                None => return Ok(()),
            }
        },
        Command::Status { json } => match session.read_response()? {
            Some(ControlResponse::Snapshot(snapshot)) if *json => {
                println!("{}", raw_line(&ControlResponse::Snapshot(snapshot))?);
                Ok(())
            }
            Some(ControlResponse::Snapshot(snapshot)) => {
                println!("{}", summarize(&snapshot));
                Ok(())
            }
            other => expect_ok(other),
        },
        _ => expect_ok(session.read_response()?),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .parse(level)
        .with_context(|| format!("invalid log level '{level}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn default_socket_path() -> PathBuf {
    env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join(SOCKET_NAME)
}

fn expect_ok(response: Option<ControlResponse>) -> Result<()> {
    match response {
        Some(ControlResponse::Ok) => Ok(()),
        Some(ControlResponse::Error { message }) => bail!("daemon error: {message}"),
        Some(ControlResponse::Snapshot(_)) => bail!("unexpected snapshot response"),
        None => bail!("daemon closed the connection without replying"),
    }
}

fn raw_line(response: &ControlResponse) -> Result<String> {
    Ok(response.to_line()?.trim_end().to_string())
}

fn summarize(snapshot: &StateNotification) -> String {
    let target = snapshot
        .target()
        .map(|mode| mode.to_string())
        .unwrap_or_else(|| snapshot.target_mode.to_string());
    let placement = snapshot
        .placement()
        .map(|mode| mode.to_string())
        .unwrap_or_else(|| snapshot.placement_mode.to_string());
    let current = snapshot
        .current_image_path
        .as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "-".into());
    format!(
        "[{:?}] folder={} interval={}s target={} placement={} current={}",
        snapshot.trigger_tag,
        snapshot.folder_path.display(),
        snapshot.interval_seconds,
        target,
        placement,
        current
    )
}

struct Session {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl Session {
    fn connect(socket: &Path) -> Result<Self> {
        let writer = UnixStream::connect(socket).with_context(|| {
            format!("failed to connect to control socket at {}", socket.display())
        })?;
        let reader = BufReader::new(
            writer
                .try_clone()
                .context("failed to clone control socket handle")?,
        );
        Ok(Self { writer, reader })
    }

    fn send(&mut self, request: &ControlRequest) -> Result<()> {
        let line = request.to_line()?;
        debug!(request = line.trim_end(), "sending control request");
        self.writer
            .write_all(line.as_bytes())
            .context("failed to send control request")?;
        self.writer.flush().context("failed to flush control socket")
    }

    fn read_response(&mut self) -> Result<Option<ControlResponse>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .context("failed to read control response")?;
        if read == 0 {
            return Ok(None);
        }
        ControlResponse::parse_line(&line).map(Some)
    }
}
