//! Unix control socket for operator commands.
//!
//! Each connection carries one JSON object, e.g. `{"command":"force-insert"}`,
//! terminated by EOF or a newline.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{BoothEvent, InsertSource, StateCell};

const MAX_COMMAND_BYTES: u64 = 4096;
/// A client must finish sending its command within this window.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlCommand {
    /// Start a session as if a coin had been inserted.
    ForceInsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceInsertOutcome {
    Accepted,
    /// The booth is busy or an insert is already queued.
    Busy,
    Disconnected,
}

/// Raise a manual insert through the same latch the coin monitor uses.
pub fn force_insert(state: &StateCell, events: &Sender<BoothEvent>) -> ForceInsertOutcome {
    if !state.try_claim_insert() {
        info!(state = %state.load(), "force insert ignored; booth is busy");
        return ForceInsertOutcome::Busy;
    }
    if events.send(BoothEvent::Insert(InsertSource::Manual)).is_err() {
        state.release_insert();
        return ForceInsertOutcome::Disconnected;
    }
    info!("force insert accepted");
    ForceInsertOutcome::Accepted
}

pub fn parse_command(raw: &[u8]) -> serde_json::Result<ControlCommand> {
    let text = String::from_utf8_lossy(raw);
    let line = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    serde_json::from_str(line.trim())
}

pub struct ControlSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlSocket {
    /// Bind the socket, replacing a stale socket file from a previous run.
    pub fn bind(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale control socket"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to remove stale control socket {}", path.display())
                });
            }
        }
        let listener = UnixListener::bind(path)
            .with_context(|| format!("failed to bind control socket at {}", path.display()))?;
        info!(path = %path.display(), "control socket listening");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub async fn run(self, state: StateCell, events: Sender<BoothEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let state = state.clone();
                        let events = events.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, &state, &events).await {
                                warn!("control connection failed: {err:#}");
                            }
                        });
                    }
                    Err(err) => warn!("control socket accept failed: {err}"),
                },
            }
        }
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            debug!(path = %self.path.display(), "failed to remove control socket: {err}");
        }
        debug!("control socket closed");
    }
}

async fn handle_connection(
    stream: UnixStream,
    state: &StateCell,
    events: &Sender<BoothEvent>,
) -> Result<()> {
    let mut raw = Vec::new();
    let mut reader = BufReader::new(stream.take(MAX_COMMAND_BYTES));
    tokio::time::timeout(COMMAND_TIMEOUT, reader.read_until(b'\n', &mut raw))
    .await
    .context("control client did not finish its command in time")?
    .context("failed to read control command")?;
    match parse_command(&raw) {
        Ok(ControlCommand::ForceInsert) => {
            force_insert(state, events);
        }
        Err(err) => warn!(
            payload = %String::from_utf8_lossy(&raw).trim(),
            "ignoring malformed control command: {err}"
        ),
    }
    Ok(())
}
