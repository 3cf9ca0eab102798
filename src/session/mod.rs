//! Recording session lifecycle

mod recording;

pub use recording::RecordingSession;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No resources held
    Idle,
    /// Waiting on the tab host and capture device
    Requesting,
    /// Capturing chunks (and interactions, if tracking)
    Active,
    /// Device torn down, recording pending export
    Stopping,
    /// Attempt aborted; resets to `Idle` once reported
    Failed,
}

/// Externally visible status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_recording: bool,
    pub has_recording: bool,
}
