//! Session error taxonomy
//!
//! Every failure that reaches the UI boundary is a [`SessionError`]. Its
//! `Display` text is the user-facing message and [`SessionError::error_type`]
//! is the machine-readable kind sent alongside it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error kind carried in responses and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    #[serde(rename = "permission_denied")]
    PermissionDenied,
    #[serde(rename = "no_source")]
    NoSource,
    #[serde(rename = "user_cancelled")]
    UserCancelled,
    #[serde(rename = "no_tab")]
    NoActiveTab,
    #[serde(rename = "restricted_page")]
    RestrictedPage,
    #[serde(rename = "initialization_error")]
    InitializationError,
    #[serde(rename = "session_busy")]
    SessionBusy,
    #[serde(rename = "no_active_session")]
    NoActiveSession,
    #[serde(rename = "generic_error")]
    Generic,
}

/// Errors surfaced by the session lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Screen recording permission was denied. Please allow screen sharing and try again.")]
    PermissionDenied,

    #[error("No screen capture source was found. Please try again.")]
    NoSource,

    #[error("Screen recording was cancelled. Please try again.")]
    UserCancelled,

    #[error("No active tab found. Please make sure you have a Chrome tab open and try again.")]
    NoActiveTab,

    #[error("Cannot record on this page. Please try on a regular webpage (not chrome:// or extension pages).")]
    RestrictedPage,

    #[error("Failed to initialize recording. {0}")]
    InitializationError(String),

    #[error("A recording session is already in progress")]
    SessionBusy,

    #[error("No active recording found")]
    NoActiveSession,

    #[error("Failed to start recording: {0}")]
    Generic(String),
}

impl SessionError {
    /// Get the wire kind for this error
    pub fn error_type(&self) -> ErrorType {
        match self {
            SessionError::PermissionDenied => ErrorType::PermissionDenied,
            SessionError::NoSource => ErrorType::NoSource,
            SessionError::UserCancelled => ErrorType::UserCancelled,
            SessionError::NoActiveTab => ErrorType::NoActiveTab,
            SessionError::RestrictedPage => ErrorType::RestrictedPage,
            SessionError::InitializationError(_) => ErrorType::InitializationError,
            SessionError::SessionBusy => ErrorType::SessionBusy,
            SessionError::NoActiveSession => ErrorType::NoActiveSession,
            SessionError::Generic(_) => ErrorType::Generic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_wire_names() {
        let json = serde_json::to_string(&SessionError::NoActiveTab.error_type()).unwrap();
        assert_eq!(json, "\"no_tab\"");

        let json = serde_json::to_string(&SessionError::Generic("x".into()).error_type()).unwrap();
        assert_eq!(json, "\"generic_error\"");
    }

    #[test]
    fn test_generic_keeps_raw_message() {
        let err = SessionError::Generic("device exploded".to_string());
        assert_eq!(err.to_string(), "Failed to start recording: device exploded");
    }

    #[test]
    fn test_tab_messages_match_popup_copy() {
        assert_eq!(
            SessionError::NoActiveTab.to_string(),
            "No active tab found. Please make sure you have a Chrome tab open and try again."
        );
        assert_eq!(
            SessionError::RestrictedPage.to_string(),
            "Cannot record on this page. Please try on a regular webpage (not chrome:// or extension pages)."
        );
    }
}
