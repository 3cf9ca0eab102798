//! JSON-lines host bridge
//!
//! The browser-side shim talks to the recorder over stdin/stdout, one JSON
//! object per line. Requests carry an `id` and get exactly one response
//! with the same `id`; everything else flows one way.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::controller::{Command, SessionHandle, StatusChanged};
use crate::error::{ErrorType, SessionError};
use crate::host::{AttachError, TabHost, TabInfo};
use crate::input::{PageSignal, PageSurface};
use crate::session::SessionStatus;

/// Messages from the browser shim
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Inbound {
    GetStatus {
        id: u64,
    },
    StartRecording {
        id: u64,
        #[serde(default, rename = "trackInteractions")]
        track_interactions: bool,
    },
    StopRecording {
        id: u64,
    },
    /// Downloads already start when a session ends. Older shims still
    /// send this after stopping and wait for the reply.
    DownloadRecording {
        id: u64,
    },
    /// The focused tab changed
    ActiveTab {
        tab: Option<TabInfo>,
    },
    /// Raw signal from the page listeners
    LogInteraction {
        data: PageSignal,
    },
}

/// Reply to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_recording: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_recording: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

impl Response {
    fn ok(id: u64) -> Self {
        Self {
            id,
            success: true,
            is_recording: None,
            has_recording: None,
            error: None,
            error_type: None,
        }
    }

    fn status(id: u64, status: SessionStatus) -> Self {
        Self {
            is_recording: Some(status.is_recording),
            has_recording: Some(status.has_recording),
            ..Self::ok(id)
        }
    }

    fn failed(id: u64, error: &SessionError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            error_type: Some(error.error_type()),
            ..Self::ok(id)
        }
    }

    fn from_result(id: u64, result: Result<(), SessionError>) -> Self {
        match result {
            Ok(()) => Self::ok(id),
            Err(e) => Self::failed(id, &e),
        }
    }
}

/// One-way messages to the browser shim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Notice {
    RecordingStatusChanged(StatusChanged),
    /// Inject the page script into the tab
    InjectContentScript {
        #[serde(rename = "tabId")]
        tab_id: i64,
    },
    StartTracking,
    StopTracking,
    ShowIndicator {
        label: String,
    },
    HideIndicator,
}

/// A line written to stdout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Response(Response),
    Notice(Notice),
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Create the outbound message channel
pub fn outbound_channel() -> (OutboundSender, mpsc::UnboundedReceiver<Outbound>) {
    mpsc::unbounded_channel()
}

/// Tab host backed by `activeTab` messages from the shim
pub struct BridgeHost {
    active: Mutex<Option<TabInfo>>,
    out: OutboundSender,
}

impl BridgeHost {
    pub fn new(out: OutboundSender) -> Self {
        Self {
            active: Mutex::new(None),
            out,
        }
    }

    pub fn set_active_tab(&self, tab: Option<TabInfo>) {
        if let Ok(mut active) = self.active.lock() {
            debug!("Active tab: {:?}", tab);
            *active = tab;
        }
    }
}

#[async_trait]
impl TabHost for BridgeHost {
    async fn active_tab(&self) -> Option<TabInfo> {
        self.active.lock().ok().and_then(|tab| tab.clone())
    }

    async fn attach(&self, tab: &TabInfo) -> Result<(), AttachError> {
        self.out
            .send(Outbound::Notice(Notice::InjectContentScript { tab_id: tab.id }))
            .map_err(|_| AttachError::new("Host bridge is closed"))
    }
}

/// Page surface that forwards listener and indicator control to the shim
pub struct BridgeSurface {
    out: OutboundSender,
}

impl BridgeSurface {
    pub fn new(out: OutboundSender) -> Self {
        Self { out }
    }

    fn notify(&self, notice: Notice) {
        if self.out.send(Outbound::Notice(notice)).is_err() {
            debug!("Host bridge closed, dropping page control message");
        }
    }
}

impl PageSurface for BridgeSurface {
    fn install_listeners(&self) -> Result<()> {
        self.out
            .send(Outbound::Notice(Notice::StartTracking))
            .map_err(|_| anyhow::anyhow!("Host bridge is closed"))
    }

    fn remove_listeners(&self) {
        self.notify(Notice::StopTracking);
    }

    fn show_indicator(&self, label: &str) {
        self.notify(Notice::ShowIndicator {
            label: label.to_string(),
        });
    }

    fn remove_indicator(&self) {
        self.notify(Notice::HideIndicator);
    }
}

/// Routes inbound lines to the session controller
pub struct Bridge {
    handle: SessionHandle,
    host: Arc<BridgeHost>,
    out: OutboundSender,
}

impl Bridge {
    pub fn new(handle: SessionHandle, host: Arc<BridgeHost>, out: OutboundSender) -> Self {
        Self {
            handle,
            host,
            out,
        }
    }

    /// Read requests until EOF
    pub async fn run<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read from host")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.handle_line(line).await?;
        }
        info!("Host closed the bridge");
        Ok(())
    }

    /// Dispatch one inbound line. Malformed lines are logged and skipped.
    pub async fn handle_line(&self, line: &str) -> Result<()> {
        let message: Inbound = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed bridge message: {}", e);
                return Ok(());
            }
        };
        self.handle(message).await
    }

    /// Commands are enqueued in arrival order; replies are awaited off the
    /// read loop so a start waiting on consent never blocks a stop.
    pub async fn handle(&self, message: Inbound) -> Result<()> {
        match message {
            Inbound::GetStatus { id } => {
                let (reply, rx) = oneshot::channel();
                self.send(Command::GetStatus { reply }).await?;
                self.respond_later(id, async move {
                    rx.await
                        .map(|status| Response::status(id, status))
                        .unwrap_or_else(|_| Response::failed(id, &controller_gone()))
                });
            }
            Inbound::StartRecording {
                id,
                track_interactions,
            } => {
                let (reply, rx) = oneshot::channel();
                self.send(Command::Start {
                    track_interactions,
                    reply,
                })
                .await?;
                self.respond_later(id, async move {
                    let result = rx.await.unwrap_or_else(|_| Err(controller_gone()));
                    Response::from_result(id, result)
                });
            }
            Inbound::StopRecording { id } => {
                let (reply, rx) = oneshot::channel();
                self.send(Command::Stop { reply }).await?;
                self.respond_later(id, async move {
                    let result = rx.await.unwrap_or_else(|_| Err(controller_gone()));
                    Response::from_result(id, result)
                });
            }
            Inbound::DownloadRecording { id } => {
                debug!("Download request {} acknowledged, export runs on stop", id);
                let _ = self.out.send(Outbound::Response(Response::ok(id)));
            }
            Inbound::ActiveTab { tab } => self.host.set_active_tab(tab),
            Inbound::LogInteraction { data } => {
                self.handle
                    .record(data)
                    .await
                    .context("Failed to forward interaction")?;
            }
        }
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.handle
            .send(command)
            .await
            .context("Failed to reach session controller")
    }

    fn respond_later<F>(&self, id: u64, response: F)
    where
        F: std::future::Future<Output = Response> + Send + 'static,
    {
        let out = self.out.clone();
        tokio::spawn(async move {
            let response = response.await;
            debug!("Responding to request {} (success: {})", id, response.success);
            let _ = out.send(Outbound::Response(response));
        });
    }
}

fn controller_gone() -> SessionError {
    SessionError::Generic("session controller is not running".to_string())
}

/// Forward status notifications until the controller goes away
pub fn spawn_status_forwarder(
    mut status_rx: broadcast::Receiver<StatusChanged>,
    out: OutboundSender,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(status) => {
                    if out
                        .send(Outbound::Notice(Notice::RecordingStatusChanged(status)))
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} status notifications", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Serialize outbound messages, one per line, until every sender is gone
pub async fn write_outbound<W>(mut rx: mpsc::UnboundedReceiver<Outbound>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message).context("Failed to encode bridge message")?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .context("Failed to write to host")?;
        writer.flush().await.context("Failed to flush host output")?;
    }
    Ok(())
}
