//! Session export
//!
//! Turns a finished recording into two artifacts, the video and the
//! interaction report, and hands each to the download sink. The two legs
//! are independent: a failed video download never prevents the report
//! from going out, and nothing is retried.

mod report;
mod sink;

use report::render_or_fallback;
pub use sink::{Artifact, DownloadSink, FsDownloadSink};

#[cfg(test)]
pub use sink::SinkError;

use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::data::InteractionEvent;

const REPORT_MIME_TYPE: &str = "text/plain;charset=utf-8";
const DEFAULT_VIDEO_MIME_TYPE: &str = "video/webm";

/// Everything a stopped session hands to the exporter
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    /// Concatenated chunks
    pub video: Vec<u8>,
    pub mime_type: Option<String>,
    /// Frozen interaction log
    pub interactions: Vec<InteractionEvent>,
    pub started_at: DateTime<Utc>,
}

/// Outcome of one export leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegOutcome {
    Delivered { filename: String, location: String },
    Failed { filename: String, error: String },
    /// Nothing to deliver
    Skipped,
}

impl LegOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, LegOutcome::Delivered { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LegOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// Timestamp shared by both filenames
    pub base_name: String,
    pub video: LegOutcome,
    pub report: LegOutcome,
}

/// `YYYY-MM-DDTHH-MM-SS`
pub fn timestamp_base_name(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// `mp4` for MP4 containers, `webm` for everything else
pub fn video_extension(video: &[u8], mime_type: Option<&str>) -> &'static str {
    match mime_type {
        Some(mime) if !video.is_empty() && mime.contains("mp4") => "mp4",
        _ => "webm",
    }
}

#[derive(Clone)]
pub struct SessionExporter {
    sink: Arc<dyn DownloadSink>,
}

impl SessionExporter {
    pub fn new(sink: Arc<dyn DownloadSink>) -> Self {
        Self { sink }
    }

    /// Export using the current time for filenames
    pub async fn export(&self, recording: FinishedRecording) -> ExportResult {
        self.export_at(recording, Utc::now()).await
    }

    pub async fn export_at(&self, recording: FinishedRecording, now: DateTime<Utc>) -> ExportResult {
        let base_name = timestamp_base_name(now);
        info!(
            "Exporting recording {} ({} bytes, {} interactions)",
            base_name,
            recording.video.len(),
            recording.interactions.len()
        );

        let video = self.export_video(&recording, &base_name).await;
        let report = self.export_report(&recording, &base_name).await;

        ExportResult {
            base_name,
            video,
            report,
        }
    }

    async fn export_video(&self, recording: &FinishedRecording, base_name: &str) -> LegOutcome {
        if recording.video.is_empty() {
            error!("No video data recorded");
            return LegOutcome::Skipped;
        }

        let mime_type = recording
            .mime_type
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_VIDEO_MIME_TYPE.to_string());
        let extension = video_extension(&recording.video, Some(&mime_type));
        let filename = format!("screen-recording-{}.{}", base_name, extension);

        let artifact = Artifact {
            filename: filename.clone(),
            mime_type,
            bytes: recording.video.clone(),
        };
        self.dispatch(artifact).await
    }

    async fn export_report(&self, recording: &FinishedRecording, base_name: &str) -> LegOutcome {
        if recording.interactions.is_empty() {
            info!("No interactions to download");
            return LegOutcome::Skipped;
        }

        let recording_date = recording
            .started_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let text = render_or_fallback(&recording.interactions, &recording_date, base_name);

        let artifact = Artifact {
            filename: format!("user-interactions-{}.txt", base_name),
            mime_type: REPORT_MIME_TYPE.to_string(),
            bytes: text.into_bytes(),
        };
        self.dispatch(artifact).await
    }

    async fn dispatch(&self, artifact: Artifact) -> LegOutcome {
        let filename = artifact.filename.clone();
        match self.sink.download(artifact).await {
            Ok(location) => {
                info!("Download of {} started: {}", filename, location);
                LegOutcome::Delivered { filename, location }
            }
            Err(e) => {
                warn!("Download of {} failed: {}", filename, e);
                LegOutcome::Failed {
                    filename,
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FunctionalKey;
    use crate::testing::MemorySink;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn recording(video: &[u8], mime: Option<&str>, interactions: Vec<InteractionEvent>) -> FinishedRecording {
        FinishedRecording {
            video: video.to_vec(),
            mime_type: mime.map(String::from),
            interactions,
            started_at: at(),
        }
    }

    fn clicks(n: i64) -> Vec<InteractionEvent> {
        (0..n)
            .map(|i| InteractionEvent::click(i * 100, 1, 1, "div".into(), "https://a.test".into()))
            .collect()
    }

    #[test]
    fn test_base_name_is_colon_free() {
        assert_eq!(timestamp_base_name(at()), "2024-03-09T14-05-07");
    }

    #[test]
    fn test_video_extension() {
        assert_eq!(video_extension(b"x", Some("video/mp4;codecs=h264,aac")), "mp4");
        assert_eq!(video_extension(b"x", Some("video/webm;codecs=vp8,opus")), "webm");
        assert_eq!(video_extension(b"x", None), "webm");
        assert_eq!(video_extension(b"", Some("video/mp4")), "webm");
    }

    #[tokio::test]
    async fn test_exports_both_artifacts() {
        let sink = Arc::new(MemorySink::default());
        let exporter = SessionExporter::new(sink.clone());

        let result = exporter
            .export_at(recording(b"video", Some("video/mp4;codecs=h264,aac"), clicks(2)), at())
            .await;

        assert!(result.video.is_delivered());
        assert!(result.report.is_delivered());

        let names = sink.filenames();
        assert_eq!(
            names,
            vec![
                "screen-recording-2024-03-09T14-05-07.mp4".to_string(),
                "user-interactions-2024-03-09T14-05-07.txt".to_string(),
            ]
        );
        let report = sink.text("user-interactions-2024-03-09T14-05-07.txt").unwrap();
        assert!(report.contains("CLICK: 2 times"));
        assert!(report.contains("Generated: 2024-03-09T14-05-07"));
    }

    #[tokio::test]
    async fn test_video_failure_does_not_block_report() {
        let sink = Arc::new(MemorySink::failing_prefix("screen-recording-"));
        let exporter = SessionExporter::new(sink.clone());

        let mut events = clicks(1);
        events.push(InteractionEvent::key_down(500, FunctionalKey::Tab, "input".into(), String::new()));
        let result = exporter.export_at(recording(b"video", None, events), at()).await;

        assert!(result.video.is_failed());
        assert!(result.report.is_delivered());
        assert_eq!(sink.filenames(), vec!["user-interactions-2024-03-09T14-05-07.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_report_failure_keeps_video() {
        let sink = Arc::new(MemorySink::failing_prefix("user-interactions-"));
        let exporter = SessionExporter::new(sink.clone());

        let result = exporter.export_at(recording(b"v", None, clicks(1)), at()).await;
        assert!(result.video.is_delivered());
        assert!(result.report.is_failed());
    }

    #[tokio::test]
    async fn test_empty_inputs_are_skipped() {
        let sink = Arc::new(MemorySink::default());
        let exporter = SessionExporter::new(sink.clone());

        let result = exporter.export_at(recording(b"", None, Vec::new()), at()).await;
        assert_eq!(result.video, LegOutcome::Skipped);
        assert_eq!(result.report, LegOutcome::Skipped);
        assert!(sink.filenames().is_empty());
    }

    #[tokio::test]
    async fn test_missing_mime_defaults_to_webm() {
        let sink = Arc::new(MemorySink::default());
        let exporter = SessionExporter::new(sink.clone());

        exporter.export_at(recording(b"v", Some(""), Vec::new()), at()).await;
        let artifact = sink.artifact("screen-recording-2024-03-09T14-05-07.webm").unwrap();
        assert_eq!(artifact.mime_type, "video/webm");
    }
}
