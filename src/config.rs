//! Configuration management for the screen session recorder

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::DEFAULT_SCROLL_THROTTLE_MS;

/// Capture policy defaults
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;
pub const DEFAULT_IDEAL_FRAME_RATE: u32 = 30;
pub const DEFAULT_MAX_FRAME_RATE: u32 = 60;
/// 2.5 Mbps
pub const DEFAULT_VIDEO_BITRATE: u32 = 2_500_000;
/// 128 kbps
pub const DEFAULT_AUDIO_BITRATE: u32 = 128_000;
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 44_100;
/// Encoder emits one chunk per timeslice
pub const DEFAULT_TIMESLICE_MS: u64 = 1_000;

/// Container/codec candidates, most compatible first
pub const DEFAULT_PREFERRED_MIME_TYPES: [&str; 4] = [
    "video/mp4;codecs=h264,aac",
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm",
];

pub const DEFAULT_INDICATOR_LABEL: &str = "🔴 Recording & Tracking";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Capture device and encoder policy
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Interaction tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Where exported artifacts go
    #[serde(default)]
    pub output: OutputConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_max_width")]
    pub ideal_width: u32,

    #[serde(default = "default_max_width")]
    pub max_width: u32,

    #[serde(default = "default_max_height")]
    pub ideal_height: u32,

    #[serde(default = "default_max_height")]
    pub max_height: u32,

    #[serde(default = "default_ideal_frame_rate")]
    pub ideal_frame_rate: u32,

    #[serde(default = "default_max_frame_rate")]
    pub max_frame_rate: u32,

    /// Video bitrate in bits per second
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: u32,

    /// Audio bitrate in bits per second
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u32,

    /// Browser-side audio processing is off so system audio is captured as-is
    #[serde(default)]
    pub echo_cancellation: bool,

    #[serde(default)]
    pub noise_suppression: bool,

    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    /// Chunk cadence (ms)
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,

    /// Encoder mime types to try, in order
    #[serde(default = "default_preferred_mime_types")]
    pub preferred_mime_types: Vec<String>,

    /// Pre-encoded media file the replay device streams from
    #[serde(default)]
    pub replay_source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Minimum spacing between logged scroll events (ms)
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: i64,

    /// Text of the on-page indicator shown while tracking
    #[serde(default = "default_indicator_label")]
    pub indicator_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory downloads are written to
    #[serde(default = "default_download_directory_option")]
    pub download_directory: Option<PathBuf>,
}

// Default value functions
fn default_max_width() -> u32 {
    DEFAULT_MAX_WIDTH
}

fn default_max_height() -> u32 {
    DEFAULT_MAX_HEIGHT
}

fn default_ideal_frame_rate() -> u32 {
    DEFAULT_IDEAL_FRAME_RATE
}

fn default_max_frame_rate() -> u32 {
    DEFAULT_MAX_FRAME_RATE
}

fn default_video_bitrate() -> u32 {
    DEFAULT_VIDEO_BITRATE
}

fn default_audio_bitrate() -> u32 {
    DEFAULT_AUDIO_BITRATE
}

fn default_audio_sample_rate() -> u32 {
    DEFAULT_AUDIO_SAMPLE_RATE
}

fn default_timeslice_ms() -> u64 {
    DEFAULT_TIMESLICE_MS
}

fn default_preferred_mime_types() -> Vec<String> {
    DEFAULT_PREFERRED_MIME_TYPES
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_scroll_throttle_ms() -> i64 {
    DEFAULT_SCROLL_THROTTLE_MS
}

fn default_indicator_label() -> String {
    DEFAULT_INDICATOR_LABEL.to_string()
}

fn default_download_directory() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| std::env::temp_dir().join("screen-recordings"))
}

fn default_download_directory_option() -> Option<PathBuf> {
    Some(default_download_directory())
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ideal_width: DEFAULT_MAX_WIDTH,
            max_width: DEFAULT_MAX_WIDTH,
            ideal_height: DEFAULT_MAX_HEIGHT,
            max_height: DEFAULT_MAX_HEIGHT,
            ideal_frame_rate: DEFAULT_IDEAL_FRAME_RATE,
            max_frame_rate: DEFAULT_MAX_FRAME_RATE,
            video_bitrate: DEFAULT_VIDEO_BITRATE,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
            echo_cancellation: false,
            noise_suppression: false,
            audio_sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            timeslice_ms: DEFAULT_TIMESLICE_MS,
            preferred_mime_types: default_preferred_mime_types(),
            replay_source: None,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            scroll_throttle_ms: DEFAULT_SCROLL_THROTTLE_MS,
            indicator_label: default_indicator_label(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_directory: default_download_directory_option(),
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else {
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "screen-session", "recorder")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Directory exported artifacts are written to
    pub fn download_directory(&self) -> PathBuf {
        self.output
            .download_directory
            .clone()
            .unwrap_or_else(default_download_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [capture]
            video_bitrate = 5000000

            [tracking]
            scroll_throttle_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.video_bitrate, 5_000_000);
        assert_eq!(config.capture.audio_bitrate, DEFAULT_AUDIO_BITRATE);
        assert_eq!(config.capture.max_frame_rate, 60);
        assert_eq!(config.capture.preferred_mime_types.len(), 4);
        assert_eq!(config.tracking.scroll_throttle_ms, 500);
        assert_eq!(config.tracking.indicator_label, DEFAULT_INDICATOR_LABEL);
        assert!(config.output.download_directory.is_some());
    }

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.capture.preferred_mime_types[0], "video/mp4;codecs=h264,aac");
        assert!(!parsed.capture.echo_cancellation);
    }
}
