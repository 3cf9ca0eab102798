//! Session controller - mediates between the transport and the session

mod engine;

pub use engine::{create_controller_channels, Services, SessionController};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ErrorType, SessionError};
use crate::input::PageSignal;
use crate::session::SessionStatus;

/// Commands accepted by the session controller
#[derive(Debug)]
pub enum Command {
    /// Report the current status
    GetStatus {
        reply: oneshot::Sender<SessionStatus>,
    },
    /// Start a session. Replies once the capture device has been acquired
    /// or the attempt has failed.
    Start {
        track_interactions: bool,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Stop the active session. Replies once teardown has begun; export
    /// follows asynchronously.
    Stop {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Raw signal from the page listeners
    Interaction(PageSignal),
    /// Stop and export any active session, then exit
    Shutdown,
}

/// Status notification broadcast on every externally visible change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanged {
    pub is_recording: bool,
    pub has_recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

impl StatusChanged {
    pub fn new(status: SessionStatus, error: Option<&SessionError>) -> Self {
        Self {
            is_recording: status.is_recording,
            has_recording: status.has_recording,
            error: error.map(|e| e.to_string()),
            error_type: error.map(SessionError::error_type),
        }
    }
}

/// Cloneable client of a running [`SessionController`]
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

fn controller_gone() -> SessionError {
    SessionError::Generic("session controller is not running".to_string())
}

impl SessionHandle {
    pub fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetStatus { reply }).await?;
        rx.await.map_err(|_| controller_gone())
    }

    pub async fn start(&self, track_interactions: bool) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start {
            track_interactions,
            reply,
        })
        .await?;
        rx.await.map_err(|_| controller_gone())?
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| controller_gone())?
    }

    pub async fn record(&self, signal: PageSignal) -> Result<(), SessionError> {
        self.send(Command::Interaction(signal)).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }

    /// Enqueue a raw command. Commands are handled in the order sent.
    pub async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).await.map_err(|_| controller_gone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_changed_wire_format() {
        let idle = StatusChanged::new(SessionStatus::default(), None);
        assert_eq!(
            serde_json::to_value(&idle).unwrap(),
            serde_json::json!({"isRecording": false, "hasRecording": false})
        );

        let failed = StatusChanged::new(SessionStatus::default(), Some(&SessionError::UserCancelled));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["errorType"], "user_cancelled");
        assert_eq!(
            json["error"],
            "Screen recording was cancelled. Please try again."
        );
    }

    #[tokio::test]
    async fn test_handle_without_controller() {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        drop(cmd_rx);

        let handle = SessionHandle::new(cmd_tx);
        let err = handle.start(true).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Generic);
    }
}
