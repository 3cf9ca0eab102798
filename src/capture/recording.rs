//! Recording output management
//!
//! Negotiates the encoder mime type and opens a capture on the device.
//! The mime candidates are tried in order: H.264/AAC in MP4 first for
//! player compatibility, then VP9/Opus, VP8/Opus and plain WebM.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::device::{CaptureDevice, DeviceError, EncodingHandle, MediaConstraints};
use super::CaptureEvent;
use crate::config::{
    CaptureConfig, DEFAULT_AUDIO_BITRATE, DEFAULT_PREFERRED_MIME_TYPES, DEFAULT_TIMESLICE_MS,
    DEFAULT_VIDEO_BITRATE,
};
use crate::error::SessionError;

/// Shortest chunk cadence the encoder accepts
const MIN_TIMESLICE: Duration = Duration::from_millis(1);

/// Used when the device supports none of the candidates
pub const FALLBACK_MIME_TYPE: &str = "video/webm";

/// Pick the first candidate the device supports
pub fn negotiate_mime_type<F>(candidates: &[String], is_supported: F) -> String
where
    F: Fn(&str) -> bool,
{
    for candidate in candidates {
        if is_supported(candidate) {
            return candidate.clone();
        }
        debug!("Mime type not supported: {}", candidate);
    }

    warn!(
        "None of {} preferred mime types supported, using {}",
        candidates.len(),
        FALLBACK_MIME_TYPE
    );
    FALLBACK_MIME_TYPE.to_string()
}

/// Options handed to the encoder once the mime type is settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    pub mime_type: String,
    /// Video bitrate in bits per second
    pub video_bitrate: u32,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u32,
    /// Chunk cadence
    pub timeslice: Duration,
}

/// Encoder policy
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    pub preferred_mime_types: Vec<String>,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub timeslice: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            preferred_mime_types: DEFAULT_PREFERRED_MIME_TYPES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            video_bitrate: DEFAULT_VIDEO_BITRATE,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
            timeslice: Duration::from_millis(DEFAULT_TIMESLICE_MS),
        }
    }
}

impl RecordingConfig {
    pub fn from_config(config: &CaptureConfig) -> Self {
        let mut timeslice = Duration::from_millis(config.timeslice_ms);
        if timeslice < MIN_TIMESLICE {
            warn!(
                "timeslice_ms = {} is too short, using {:?}",
                config.timeslice_ms, MIN_TIMESLICE
            );
            timeslice = MIN_TIMESLICE;
        }

        Self {
            preferred_mime_types: config.preferred_mime_types.clone(),
            video_bitrate: config.video_bitrate,
            audio_bitrate: config.audio_bitrate,
            timeslice,
        }
    }

    fn options_for(&self, mime_type: String) -> EncoderOptions {
        EncoderOptions {
            mime_type,
            video_bitrate: self.video_bitrate,
            audio_bitrate: self.audio_bitrate,
            timeslice: self.timeslice,
        }
    }
}

/// A capture that is producing chunks
pub struct ActiveCapture {
    handle: Box<dyn EncodingHandle>,
}

impl std::fmt::Debug for ActiveCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveCapture")
            .field("mime_type", &self.handle.mime_type())
            .finish()
    }
}

impl ActiveCapture {
    /// The encoding descriptor chunks are produced in
    pub fn mime_type(&self) -> &str {
        self.handle.mime_type()
    }

    /// Stop the device. Failures are logged; the session moves on regardless.
    pub async fn stop(&mut self) {
        if let Err(e) = self.handle.stop().await {
            warn!("Failed to stop capture device cleanly: {}", e);
        }
    }
}

/// Wraps the platform capture/encode pipeline
#[derive(Clone)]
pub struct CaptureSink {
    device: Arc<dyn CaptureDevice>,
    constraints: MediaConstraints,
    recording: RecordingConfig,
}

impl CaptureSink {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        constraints: MediaConstraints,
        recording: RecordingConfig,
    ) -> Self {
        Self {
            device,
            constraints,
            recording,
        }
    }

    pub fn from_config(device: Arc<dyn CaptureDevice>, config: &CaptureConfig) -> Self {
        Self::new(
            device,
            MediaConstraints::from_config(config),
            RecordingConfig::from_config(config),
        )
    }

    /// Acquire the device and start encoding into `events`
    pub async fn open(
        &self,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<ActiveCapture, SessionError> {
        info!("Requesting capture device...");
        let stream = self
            .device
            .acquire(&self.constraints)
            .await
            .map_err(|e| {
                warn!("Capture device acquisition failed: {}", e);
                e.classify()
            })?;
        info!("Capture stream obtained");

        let mime_type = negotiate_mime_type(&self.recording.preferred_mime_types, |m| {
            self.device.is_type_supported(m)
        });
        let options = self.recording.options_for(mime_type);
        info!(
            "Starting encoder: {} (video {} bps, audio {} bps, {:?} chunks)",
            options.mime_type, options.video_bitrate, options.audio_bitrate, options.timeslice
        );

        let handle = stream
            .begin_encoding(&options, events)
            .map_err(|e: DeviceError| SessionError::InitializationError(e.message))?;

        Ok(ActiveCapture { handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;

    fn candidates() -> Vec<String> {
        RecordingConfig::default().preferred_mime_types
    }

    #[test]
    fn test_negotiation_prefers_mp4() {
        let chosen = negotiate_mime_type(&candidates(), |_| true);
        assert_eq!(chosen, "video/mp4;codecs=h264,aac");
    }

    #[test]
    fn test_negotiation_falls_through_to_vp8() {
        let chosen = negotiate_mime_type(&candidates(), |m| m.contains("vp8"));
        assert!(chosen.contains("vp8"));
    }

    #[test]
    fn test_negotiation_default_container() {
        let chosen = negotiate_mime_type(&candidates(), |_| false);
        assert_eq!(chosen, FALLBACK_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_open_commits_to_supported_codec() {
        let device = Arc::new(FakeDevice::supporting(&["video/webm;codecs=vp8,opus"]));
        let sink = CaptureSink::from_config(device.clone(), &CaptureConfig::default());

        let (tx, _rx) = mpsc::unbounded_channel();
        let capture = sink.open(tx).await.unwrap();
        assert!(capture.mime_type().contains("vp8"));
        assert_eq!(device.last_options().unwrap().video_bitrate, 2_500_000);
    }

    #[tokio::test]
    async fn test_open_classifies_denial() {
        let device = Arc::new(FakeDevice::rejecting("NotAllowedError", "Permission denied"));
        let sink = CaptureSink::from_config(device, &CaptureConfig::default());

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = sink.open(tx).await.unwrap_err();
        assert_eq!(err, SessionError::PermissionDenied);
    }

    #[tokio::test]
    async fn test_zero_timeslice_is_clamped() {
        let config: crate::config::Config = toml::from_str("[capture]\ntimeslice_ms = 0\n").unwrap();
        assert_eq!(
            RecordingConfig::from_config(&config.capture).timeslice,
            Duration::from_millis(1)
        );

        let device = Arc::new(FakeDevice::supporting(&["video/webm"]));
        let sink = CaptureSink::from_config(device.clone(), &config.capture);
        let (tx, _rx) = mpsc::unbounded_channel();
        sink.open(tx).await.unwrap();
        assert_eq!(
            device.last_options().unwrap().timeslice,
            Duration::from_millis(1)
        );
    }
}
