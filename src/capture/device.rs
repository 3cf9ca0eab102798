//! Capture device contract
//!
//! The platform screen-share provider and its encoder sit behind these
//! traits. A device hands out a [`MediaStream`] once the user consents;
//! the stream turns into an [`EncodingHandle`] that pushes
//! [`CaptureEvent`]s into the session's channel.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use super::{CaptureEvent, EncoderOptions};
use crate::config::CaptureConfig;
use crate::error::SessionError;

/// Failure reported by the platform, named after the DOM exception it raised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct DeviceError {
    /// Platform error name (e.g. `NotAllowedError`)
    pub name: String,
    /// Platform error message
    pub message: String,
}

impl DeviceError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Map the platform reason onto the session taxonomy
    pub fn classify(&self) -> SessionError {
        match self.name.as_str() {
            "NotAllowedError" => SessionError::PermissionDenied,
            "NotFoundError" => SessionError::NoSource,
            "AbortError" => SessionError::UserCancelled,
            _ => SessionError::Generic(self.message.clone()),
        }
    }
}

/// `{ ideal, max }` constraint pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub ideal: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub width: Range,
    pub height: Range,
    pub frame_rate: Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
}

/// What the session asks the device for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaConstraints {
    pub video: VideoConstraints,
    pub audio: AudioConstraints,
}

impl MediaConstraints {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            video: VideoConstraints {
                width: Range {
                    ideal: config.ideal_width,
                    max: config.max_width,
                },
                height: Range {
                    ideal: config.ideal_height,
                    max: config.max_height,
                },
                frame_rate: Range {
                    ideal: config.ideal_frame_rate,
                    max: config.max_frame_rate,
                },
            },
            audio: AudioConstraints {
                echo_cancellation: config.echo_cancellation,
                noise_suppression: config.noise_suppression,
                sample_rate: config.audio_sample_rate,
            },
        }
    }
}

/// Screen-share provider
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Ask for a capture stream. May wait indefinitely on user consent.
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceError>;

    /// Whether the encoder can produce the given mime type
    fn is_type_supported(&self, mime_type: &str) -> bool;
}

/// An acquired, not yet encoding, capture stream
pub trait MediaStream: Send {
    /// Start encoding. Chunks, errors and the end-of-stream signal are
    /// delivered on `events`, in order.
    fn begin_encoding(
        self: Box<Self>,
        options: &EncoderOptions,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<Box<dyn EncodingHandle>, DeviceError>;
}

/// A running encoder
///
/// After [`EncodingHandle::stop`] the encoder flushes its last chunk and
/// then sends `CaptureEvent::Ended(EndReason::Stopped)`.
#[async_trait]
pub trait EncodingHandle: Send {
    /// Mime type the encoder committed to
    fn mime_type(&self) -> &str;

    /// Stop the encoder and release every device track. Idempotent.
    async fn stop(&mut self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;

    #[test]
    fn test_classify_platform_reasons() {
        let cases = [
            ("NotAllowedError", ErrorType::PermissionDenied),
            ("NotFoundError", ErrorType::NoSource),
            ("AbortError", ErrorType::UserCancelled),
            ("NotReadableError", ErrorType::Generic),
        ];
        for (name, expected) in cases {
            let err = DeviceError::new(name, "boom");
            assert_eq!(err.classify().error_type(), expected, "{}", name);
        }
    }

    #[test]
    fn test_unclassified_reason_keeps_message() {
        let err = DeviceError::new("OverconstrainedError", "width too large");
        assert_eq!(
            err.classify(),
            SessionError::Generic("width too large".to_string())
        );
    }

    #[test]
    fn test_constraints_from_defaults() {
        let constraints = MediaConstraints::from_config(&CaptureConfig::default());
        assert_eq!(constraints.video.width, Range { ideal: 1920, max: 1920 });
        assert_eq!(constraints.video.frame_rate, Range { ideal: 30, max: 60 });
        assert!(!constraints.audio.echo_cancellation);
        assert!(!constraints.audio.noise_suppression);

        let json = serde_json::to_value(&constraints).unwrap();
        assert_eq!(json["video"]["frameRate"]["max"], 60);
        assert_eq!(json["audio"]["sampleRate"], 44100);
    }
}
