//! Session controller loop
//!
//! A single task owns the [`RecordingSession`]. Commands, capture events,
//! the pending device acquisition and the pending export are all polled
//! from one `select!` loop, so `getStatus`, `start` and `stop` stay
//! responsive while the device waits on user consent or an export is
//! being dispatched.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{ActiveCapture, CaptureDevice, CaptureEvent, CaptureSink, EndReason};
use crate::config::Config;
use crate::error::SessionError;
use crate::export::{DownloadSink, ExportResult, LegOutcome, SessionExporter};
use crate::host::{prepare_tab, TabHost};
use crate::input::{InteractionCaptureBoundary, PageSurface, TrackingGuard};
use crate::session::{RecordingSession, SessionState};

use super::{Command, StatusChanged};

/// Platform integrations the controller drives
#[derive(Clone)]
pub struct Services {
    pub host: Arc<dyn TabHost>,
    pub device: Arc<dyn CaptureDevice>,
    pub surface: Arc<dyn PageSurface>,
    pub sink: Arc<dyn DownloadSink>,
}

/// A start request waiting on tab preparation and device consent
struct PendingStart {
    reply: oneshot::Sender<Result<(), SessionError>>,
    events: mpsc::UnboundedReceiver<CaptureEvent>,
    task: JoinHandle<Result<ActiveCapture, SessionError>>,
}

/// Coordinates the recording session with the page and the download sink
pub struct SessionController {
    session: RecordingSession,
    host: Arc<dyn TabHost>,
    capture: CaptureSink,
    boundary: InteractionCaptureBoundary,
    exporter: SessionExporter,
    /// Command receiver
    cmd_rx: mpsc::Receiver<Command>,
    /// Status broadcaster
    status_tx: broadcast::Sender<StatusChanged>,
}

impl SessionController {
    pub fn new(
        config: &Config,
        services: Services,
        cmd_rx: mpsc::Receiver<Command>,
        status_tx: broadcast::Sender<StatusChanged>,
    ) -> Self {
        Self {
            session: RecordingSession::new(config.tracking.scroll_throttle_ms),
            host: services.host,
            capture: CaptureSink::from_config(services.device, &config.capture),
            boundary: InteractionCaptureBoundary::new(
                services.surface,
                config.tracking.indicator_label.clone(),
            ),
            exporter: SessionExporter::new(services.sink),
            cmd_rx,
            status_tx,
        }
    }

    /// Run until shutdown. An active session is stopped and exported first.
    pub async fn run(&mut self) -> Result<()> {
        info!("Session controller starting");

        let mut pending_start: Option<PendingStart> = None;
        let mut capture_rx: Option<mpsc::UnboundedReceiver<CaptureEvent>> = None;
        let mut export: Option<JoinHandle<ExportResult>> = None;
        let mut commands_open = true;
        let mut shutting_down = false;

        self.broadcast(None);

        loop {
            tokio::select! {
                // Handle commands
                cmd = self.cmd_rx.recv(), if commands_open => {
                    let cmd = match cmd {
                        Some(cmd) => cmd,
                        None => {
                            info!("Command channel closed");
                            commands_open = false;
                            Command::Shutdown
                        }
                    };

                    match cmd {
                        Command::GetStatus { reply } => {
                            let _ = reply.send(self.session.status());
                        }
                        Command::Start { track_interactions, reply } => {
                            if shutting_down {
                                let _ = reply.send(Err(SessionError::SessionBusy));
                                continue;
                            }
                            match self.session.begin_start(track_interactions) {
                                Ok(_) => pending_start = Some(self.spawn_acquisition(reply)),
                                Err(e) => {
                                    let _ = reply.send(Err(e));
                                }
                            }
                        }
                        Command::Stop { reply } => {
                            match self.session.begin_stop() {
                                Ok(Some(capture)) => {
                                    let _ = reply.send(Ok(()));
                                    self.teardown(capture).await;
                                }
                                Ok(None) => {
                                    let _ = reply.send(Ok(()));
                                }
                                Err(e) => {
                                    debug!("Stop rejected: {}", e);
                                    let _ = reply.send(Err(e));
                                }
                            }
                        }
                        Command::Interaction(signal) => {
                            if self.session.record(signal) {
                                debug!("Interaction {} logged", self.session.interaction_count());
                            }
                        }
                        Command::Shutdown => {
                            info!("Shutdown command received");
                            shutting_down = true;
                            match self.session.state() {
                                SessionState::Active => {
                                    if let Ok(Some(capture)) = self.session.begin_stop() {
                                        self.teardown(capture).await;
                                    }
                                }
                                SessionState::Requesting => {
                                    if let Some(pending) = pending_start.take() {
                                        pending.task.abort();
                                        let _ = pending.reply.send(Err(SessionError::Generic(
                                            "recorder is shutting down".to_string(),
                                        )));
                                    }
                                    self.session.reset();
                                    break;
                                }
                                SessionState::Stopping => {
                                    info!("Waiting for export before exiting");
                                }
                                SessionState::Idle | SessionState::Failed => break,
                            }
                        }
                    }
                }

                // Device acquisition finished
                joined = async {
                    match pending_start.as_mut() {
                        Some(pending) => (&mut pending.task).await,
                        None => std::future::pending().await,
                    }
                } => {
                    let Some(pending) = pending_start.take() else {
                        continue;
                    };
                    let result = joined.unwrap_or_else(|e| {
                        error!("Capture acquisition task failed: {}", e);
                        Err(SessionError::Generic(e.to_string()))
                    });
                    if self.finish_start(pending.reply, result).await {
                        capture_rx = Some(pending.events);
                    }
                }

                // Chunks and end-of-stream from the encoder
                event = async {
                    match capture_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    let event = event.unwrap_or_else(|| {
                        debug!("Capture channel closed");
                        CaptureEvent::Ended(EndReason::Stopped)
                    });

                    match event {
                        CaptureEvent::Chunk(chunk) => {
                            self.session.push_chunk(chunk);
                        }
                        CaptureEvent::Error(message) => {
                            if self.session.state() == SessionState::Active && !self.session.has_chunks() {
                                error!("Encoder failed before first chunk: {}", message);
                                capture_rx = None;
                                self.fail_active(SessionError::Generic(message)).await;
                            } else {
                                warn!("Encoder error: {}", message);
                            }
                        }
                        CaptureEvent::Ended(reason) => {
                            capture_rx = None;
                            export = self.on_stream_end(reason).await;
                            if export.is_none() && shutting_down {
                                break;
                            }
                        }
                    }
                }

                // Export finished
                joined = async {
                    match export.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                } => {
                    export = None;
                    match joined {
                        Ok(result) => log_export(&result),
                        Err(e) => error!("Export task failed: {}", e),
                    }
                    self.session.reset();
                    self.broadcast(None);

                    if shutting_down {
                        break;
                    }
                }
            }
        }

        info!("Session controller stopped");
        Ok(())
    }

    /// Prepare the tab and acquire the device off the loop
    fn spawn_acquisition(&self, reply: oneshot::Sender<Result<(), SessionError>>) -> PendingStart {
        let (events_tx, events) = mpsc::unbounded_channel();
        let host = self.host.clone();
        let capture = self.capture.clone();

        let task = tokio::spawn(async move {
            prepare_tab(host.as_ref()).await?;
            capture.open(events_tx).await
        });

        PendingStart {
            reply,
            events,
            task,
        }
    }

    /// Resolve a start request, returning whether the session went active
    async fn finish_start(
        &mut self,
        reply: oneshot::Sender<Result<(), SessionError>>,
        result: Result<ActiveCapture, SessionError>,
    ) -> bool {
        let error = match result {
            Ok(capture) => {
                let tracking = self.install_tracking();
                match self.session.activate(capture, tracking) {
                    Ok(()) => {
                        self.broadcast(None);
                        let _ = reply.send(Ok(()));
                        return true;
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        if let Some(mut capture) = self.session.fail(&error) {
            capture.stop().await;
        }
        self.broadcast(Some(&error));
        self.session.reset();
        let _ = reply.send(Err(error));
        false
    }

    fn install_tracking(&self) -> Option<TrackingGuard> {
        if !self.session.tracking_enabled() {
            return None;
        }
        match self.boundary.install() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Failed to start interaction tracking: {}", e);
                None
            }
        }
    }

    /// Stop the device after `Active -> Stopping`
    async fn teardown(&mut self, mut capture: ActiveCapture) {
        self.broadcast(None);
        capture.stop().await;
        debug!("Capture device stopped");
    }

    /// `Active -> Failed -> Idle`
    async fn fail_active(&mut self, error: SessionError) {
        if let Some(mut capture) = self.session.fail(&error) {
            capture.stop().await;
        }
        self.broadcast(Some(&error));
        self.session.reset();
    }

    /// The stream is complete: stop if the device ended it, then export
    async fn on_stream_end(&mut self, reason: EndReason) -> Option<JoinHandle<ExportResult>> {
        match self.session.state() {
            SessionState::Active => {
                info!("Capture ended by device ({:?})", reason);
                if let Ok(Some(capture)) = self.session.begin_stop() {
                    self.teardown(capture).await;
                }
            }
            SessionState::Stopping => {
                debug!("Capture stream complete");
            }
            state => {
                debug!("Ignoring end of stream in state {:?}", state);
                return None;
            }
        }

        match self.session.finalize() {
            Some(recording) => {
                let exporter = self.exporter.clone();
                Some(tokio::spawn(async move { exporter.export(recording).await }))
            }
            None => {
                warn!("Nothing to export");
                self.session.reset();
                self.broadcast(None);
                None
            }
        }
    }

    fn broadcast(&self, error: Option<&SessionError>) {
        let status = StatusChanged::new(self.session.status(), error);
        debug!("Status: {:?}", status);
        let _ = self.status_tx.send(status);
    }
}

fn log_export(result: &ExportResult) {
    for (leg, outcome) in [("video", &result.video), ("report", &result.report)] {
        match outcome {
            LegOutcome::Delivered { filename, .. } => info!("Exported {} as {}", leg, filename),
            LegOutcome::Failed { filename, error } => {
                error!("Failed to export {} {}: {}", leg, filename, error)
            }
            LegOutcome::Skipped => debug!("No {} to export", leg),
        }
    }
}

/// Create the controller's command and status channels
pub fn create_controller_channels() -> (
    mpsc::Sender<Command>,
    mpsc::Receiver<Command>,
    broadcast::Sender<StatusChanged>,
    broadcast::Receiver<StatusChanged>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (status_tx, status_rx) = broadcast::channel(16);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}
