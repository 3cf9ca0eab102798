//! Recording session state machine
//!
//! Owns everything one session accumulates: the chunk sequence, the
//! interaction log, the capture handle and the tracking guard. All
//! mutation happens on the controller task, so the state field alone
//! provides mutual exclusion.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{SessionState, SessionStatus};
use crate::capture::{ActiveCapture, VideoChunk};
use crate::data::{InteractionEvent, InteractionLog};
use crate::error::SessionError;
use crate::export::FinishedRecording;
use crate::input::{PageSignal, TrackingGuard};

#[derive(Debug)]
pub struct RecordingSession {
    state: SessionState,
    /// Correlates log lines of one attempt
    session_id: Option<Uuid>,
    tracking_enabled: bool,
    started_at: Option<DateTime<Utc>>,
    chunks: Vec<VideoChunk>,
    mime_type: Option<String>,
    log: InteractionLog,
    scroll_throttle_ms: i64,
    /// Snapshot taken when the log is frozen
    interactions: Vec<InteractionEvent>,
    capture: Option<ActiveCapture>,
    tracking: Option<TrackingGuard>,
}

impl RecordingSession {
    pub fn new(scroll_throttle_ms: i64) -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            tracking_enabled: false,
            started_at: None,
            chunks: Vec::new(),
            mime_type: None,
            log: InteractionLog::new(scroll_throttle_ms),
            scroll_throttle_ms,
            interactions: Vec::new(),
            capture: None,
            tracking: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn has_chunks(&self) -> bool {
        !self.chunks.is_empty()
    }

    pub fn interaction_count(&self) -> usize {
        self.log.len()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            is_recording: self.state == SessionState::Active,
            has_recording: self.state == SessionState::Stopping,
        }
    }

    /// `Idle -> Requesting`
    ///
    /// Fails with `SessionBusy` from any other state and leaves the
    /// session untouched.
    pub fn begin_start(&mut self, track_interactions: bool) -> Result<Uuid, SessionError> {
        if self.state != SessionState::Idle {
            debug!("Start rejected in state {:?}", self.state);
            return Err(SessionError::SessionBusy);
        }

        let id = Uuid::new_v4();
        self.clear();
        self.state = SessionState::Requesting;
        self.session_id = Some(id);
        self.tracking_enabled = track_interactions;

        info!(
            "Session {} requesting capture (tracking: {})",
            id, track_interactions
        );
        Ok(id)
    }

    /// `Requesting -> Active`
    pub fn activate(
        &mut self,
        capture: ActiveCapture,
        tracking: Option<TrackingGuard>,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Requesting {
            warn!("Capture granted in unexpected state {:?}", self.state);
            return Err(SessionError::Generic(format!(
                "capture granted while {:?}",
                self.state
            )));
        }

        self.mime_type = Some(capture.mime_type().to_string());
        self.capture = Some(capture);
        self.tracking = tracking;
        self.started_at = Some(Utc::now());
        self.state = SessionState::Active;

        info!(
            "Session {} active ({})",
            self.id_for_log(),
            self.mime_type.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    /// Abort the attempt
    ///
    /// Allowed from `Requesting`, or from `Active` while no chunk has been
    /// captured. Releases the tracking guard and hands back the capture so
    /// the caller can stop it.
    pub fn fail(&mut self, error: &SessionError) -> Option<ActiveCapture> {
        match self.state {
            SessionState::Requesting => {}
            SessionState::Active if self.chunks.is_empty() => {}
            state => {
                warn!("Ignoring failure in state {:?}: {}", state, error);
                return None;
            }
        }

        warn!("Session {} failed: {}", self.id_for_log(), error);
        self.state = SessionState::Failed;
        self.tracking = None;
        self.log.freeze();
        self.capture.take()
    }

    /// Append a chunk. Empty chunks are dropped.
    pub fn push_chunk(&mut self, chunk: VideoChunk) -> bool {
        if !matches!(self.state, SessionState::Active | SessionState::Stopping) {
            debug!("Dropping chunk received in state {:?}", self.state);
            return false;
        }
        if chunk.data.is_empty() {
            return false;
        }

        debug!(
            "Chunk {} received ({} bytes)",
            self.chunks.len() + 1,
            chunk.data.len()
        );
        self.chunks.push(chunk);
        true
    }

    /// Feed a page signal into the log while tracking
    pub fn record(&mut self, signal: PageSignal) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        let Some(guard) = &self.tracking else {
            return false;
        };
        match guard.translate(signal) {
            Some(event) => self.log.record(event),
            None => false,
        }
    }

    /// `Active -> Stopping`
    ///
    /// Releases tracking and freezes the log. Returns the capture to stop,
    /// or `None` if a stop is already under way.
    pub fn begin_stop(&mut self) -> Result<Option<ActiveCapture>, SessionError> {
        match self.state {
            SessionState::Active => {}
            SessionState::Stopping => {
                debug!("Stop requested while already stopping");
                return Ok(None);
            }
            _ => return Err(SessionError::NoActiveSession),
        }

        self.state = SessionState::Stopping;
        self.tracking = None;
        self.interactions = self.log.freeze();

        info!(
            "Session {} stopping ({} chunks, {} interactions)",
            self.id_for_log(),
            self.chunks.len(),
            self.interactions.len()
        );
        Ok(self.capture.take())
    }

    /// Assemble the recording for export. Only once, and only while stopping.
    pub fn finalize(&mut self) -> Option<FinishedRecording> {
        if self.state != SessionState::Stopping {
            return None;
        }
        let started_at = self.started_at.take()?;

        let size = self.chunks.iter().map(|c| c.data.len()).sum();
        let mut video = Vec::with_capacity(size);
        for chunk in self.chunks.drain(..) {
            video.extend_from_slice(&chunk.data);
        }

        Some(FinishedRecording {
            video,
            mime_type: self.mime_type.clone(),
            interactions: std::mem::take(&mut self.interactions),
            started_at,
        })
    }

    /// Back to `Idle`, discarding everything the attempt held
    pub fn reset(&mut self) {
        if self.state != SessionState::Idle {
            debug!("Session {} reset from {:?}", self.id_for_log(), self.state);
        }
        self.clear();
        self.state = SessionState::Idle;
    }

    fn clear(&mut self) {
        self.session_id = None;
        self.tracking_enabled = false;
        self.started_at = None;
        self.chunks.clear();
        self.mime_type = None;
        self.log = InteractionLog::new(self.scroll_throttle_ms);
        self.interactions.clear();
        self.capture = None;
        self.tracking = None;
    }

    fn id_for_log(&self) -> String {
        self.session_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}
