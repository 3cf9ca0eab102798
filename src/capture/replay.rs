//! File replay capture device
//!
//! Streams a pre-encoded media file as if it came from a live encoder,
//! one bitrate-sized chunk per timeslice. Running out of data looks like
//! the user stopping the share. Used by the host bridge when no browser
//! capture is wired in, and for end-to-end runs of the session pipeline.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::device::{CaptureDevice, DeviceError, EncodingHandle, MediaConstraints, MediaStream};
use super::{CaptureEvent, EncoderOptions, EndReason, VideoChunk};

pub struct ReplayDevice {
    source: Option<PathBuf>,
}

impl ReplayDevice {
    pub fn new(source: Option<PathBuf>) -> Self {
        Self { source }
    }

    fn container(&self) -> Option<&'static str> {
        let ext = self
            .source
            .as_deref()
            .and_then(Path::extension)
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "m4v" => Some("video/mp4"),
            "webm" => Some("video/webm"),
            _ => None,
        }
    }
}

#[async_trait]
impl CaptureDevice for ReplayDevice {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        let path = self
            .source
            .as_ref()
            .ok_or_else(|| DeviceError::new("NotFoundError", "No replay source configured"))?;

        let data = tokio::fs::read(path).await.map_err(|e| {
            DeviceError::new(
                "NotFoundError",
                format!("Failed to read replay source {:?}: {}", path, e),
            )
        })?;

        debug!(
            "Replay source {:?} ({} bytes) acquired for {}x{}@{}",
            path,
            data.len(),
            constraints.video.width.ideal,
            constraints.video.height.ideal,
            constraints.video.frame_rate.ideal
        );

        Ok(Box::new(ReplayStream { data }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        match self.container() {
            Some(container) => mime_type.starts_with(container),
            None => false,
        }
    }
}

struct ReplayStream {
    data: Vec<u8>,
}

impl MediaStream for ReplayStream {
    fn begin_encoding(
        self: Box<Self>,
        options: &EncoderOptions,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<Box<dyn EncodingHandle>, DeviceError> {
        // tokio intervals reject a zero period
        let timeslice = options.timeslice.max(Duration::from_millis(1));
        let bits = (options.video_bitrate as u64 + options.audio_bitrate as u64)
            * timeslice.as_millis() as u64;
        let chunk_size = ((bits / 8_000) as usize).max(1);
        let mime_type = options.mime_type.clone();
        let data = self.data;

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let chunk_mime = mime_type.clone();

        let task = tokio::spawn(async move {
            let mut offset = 0;
            let mut ticker = tokio::time::interval_at(Instant::now() + timeslice, timeslice);

            info!("Replay encoder started ({} byte chunks)", chunk_size);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        if offset < data.len() {
                            let end = (offset + chunk_size).min(data.len());
                            let _ = events.send(CaptureEvent::Chunk(VideoChunk {
                                data: data[offset..end].to_vec(),
                                mime_type: chunk_mime.clone(),
                            }));
                        }
                        let _ = events.send(CaptureEvent::Ended(EndReason::Stopped));
                        break;
                    }
                    _ = ticker.tick() => {
                        if offset >= data.len() {
                            info!("Replay source exhausted");
                            let _ = events.send(CaptureEvent::Ended(EndReason::Revoked));
                            break;
                        }
                        let end = (offset + chunk_size).min(data.len());
                        let chunk = VideoChunk {
                            data: data[offset..end].to_vec(),
                            mime_type: chunk_mime.clone(),
                        };
                        offset = end;
                        if events.send(CaptureEvent::Chunk(chunk)).is_err() {
                            debug!("Session dropped the capture channel");
                            break;
                        }
                    }
                }
            }
        });

        Ok(Box::new(ReplayEncoder {
            mime_type,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }))
    }
}

struct ReplayEncoder {
    mime_type: String,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl EncodingHandle for ReplayEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Replay encoder task failed: {}", e);
                return Err(DeviceError::new("UnknownError", e.to_string()));
            }
        }
        Ok(())
    }
}
