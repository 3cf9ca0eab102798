//! Test doubles for the platform seams

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

use crate::capture::{
    CaptureDevice, CaptureEvent, DeviceError, EncoderOptions, EncodingHandle, EndReason,
    MediaConstraints, MediaStream, VideoChunk,
};
use crate::export::{Artifact, DownloadSink, SinkError};
use crate::host::{AttachError, TabHost, TabInfo};
use crate::input::PageSurface;

#[derive(Default)]
struct DeviceState {
    acquisitions: usize,
    stops: usize,
    last_options: Option<EncoderOptions>,
    events: Option<mpsc::UnboundedSender<CaptureEvent>>,
}

/// Capture device driven by the test
///
/// Chunks, encoder errors and revocation are injected through the device
/// once encoding has begun. Stopping the encoder sends `Ended(Stopped)`.
pub struct FakeDevice {
    supported: Vec<String>,
    rejection: Option<DeviceError>,
    consent: Option<Arc<Notify>>,
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn supporting(mime_types: &[&str]) -> Self {
        Self {
            supported: mime_types.iter().map(|m| m.to_string()).collect(),
            rejection: None,
            consent: None,
            state: Arc::default(),
        }
    }

    pub fn rejecting(name: &str, message: &str) -> Self {
        Self {
            rejection: Some(DeviceError::new(name, message)),
            ..Self::supporting(&[])
        }
    }

    /// Hold acquisition until [`FakeDevice::grant`] is called
    pub fn gated(mut self) -> Self {
        self.consent = Some(Arc::new(Notify::new()));
        self
    }

    pub fn grant(&self) {
        if let Some(consent) = &self.consent {
            consent.notify_one();
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.state.lock().unwrap().acquisitions
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn last_options(&self) -> Option<EncoderOptions> {
        self.state.lock().unwrap().last_options.clone()
    }

    pub fn emit_chunk(&self, data: &[u8]) -> bool {
        let state = self.state.lock().unwrap();
        let mime_type = state
            .last_options
            .as_ref()
            .map(|o| o.mime_type.clone())
            .unwrap_or_default();
        match &state.events {
            Some(tx) => tx
                .send(CaptureEvent::Chunk(VideoChunk {
                    data: data.to_vec(),
                    mime_type,
                }))
                .is_ok(),
            None => false,
        }
    }

    pub fn emit_error(&self, message: &str) -> bool {
        match &self.state.lock().unwrap().events {
            Some(tx) => tx.send(CaptureEvent::Error(message.to_string())).is_ok(),
            None => false,
        }
    }

    /// The user stops sharing from the platform UI
    pub fn revoke(&self) -> bool {
        match self.state.lock().unwrap().events.take() {
            Some(tx) => tx.send(CaptureEvent::Ended(EndReason::Revoked)).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl CaptureDevice for FakeDevice {
    async fn acquire(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        self.state.lock().unwrap().acquisitions += 1;
        if let Some(consent) = &self.consent {
            consent.notified().await;
        }
        match &self.rejection {
            Some(e) => Err(e.clone()),
            None => Ok(Box::new(FakeStream {
                state: self.state.clone(),
            })),
        }
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|m| m == mime_type)
    }
}

struct FakeStream {
    state: Arc<Mutex<DeviceState>>,
}

impl MediaStream for FakeStream {
    fn begin_encoding(
        self: Box<Self>,
        options: &EncoderOptions,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<Box<dyn EncodingHandle>, DeviceError> {
        let mut state = self.state.lock().unwrap();
        state.last_options = Some(options.clone());
        state.events = Some(events);
        Ok(Box::new(FakeEncoder {
            mime_type: options.mime_type.clone(),
            state: self.state.clone(),
        }))
    }
}

struct FakeEncoder {
    mime_type: String,
    state: Arc<Mutex<DeviceState>>,
}

#[async_trait]
impl EncodingHandle for FakeEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        state.stops += 1;
        if let Some(tx) = state.events.take() {
            let _ = tx.send(CaptureEvent::Ended(EndReason::Stopped));
        }
        Ok(())
    }
}

/// Download sink that keeps artifacts in memory
#[derive(Default)]
pub struct MemorySink {
    fail_prefix: Option<String>,
    artifacts: Mutex<Vec<Artifact>>,
}

impl MemorySink {
    /// Reject every artifact whose filename starts with `prefix`
    pub fn failing_prefix(prefix: &str) -> Self {
        Self {
            fail_prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    pub fn filenames(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.filename.clone())
            .collect()
    }

    pub fn artifact(&self, filename: &str) -> Option<Artifact> {
        self.artifacts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.filename == filename)
            .cloned()
    }

    pub fn artifact_with_prefix(&self, prefix: &str) -> Option<Artifact> {
        self.artifacts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.filename.starts_with(prefix))
            .cloned()
    }

    pub fn text(&self, filename: &str) -> Option<String> {
        self.artifact(filename)
            .map(|a| String::from_utf8(a.bytes).unwrap())
    }
}

#[async_trait]
impl DownloadSink for MemorySink {
    async fn download(&self, artifact: Artifact) -> Result<String, SinkError> {
        if let Some(prefix) = &self.fail_prefix {
            if artifact.filename.starts_with(prefix.as_str()) {
                return Err(SinkError::Rejected("simulated failure".to_string()));
            }
        }
        let location = format!("memory://{}", artifact.filename);
        self.artifacts.lock().unwrap().push(artifact);
        Ok(location)
    }
}

#[derive(Default)]
struct SurfaceState {
    installs: usize,
    removals: usize,
    indicator: Option<String>,
}

/// Page surface that records what was installed
#[derive(Default)]
pub struct FakeSurface {
    fail_install: bool,
    state: Mutex<SurfaceState>,
}

impl FakeSurface {
    pub fn failing() -> Self {
        Self {
            fail_install: true,
            ..Self::default()
        }
    }

    pub fn installs(&self) -> usize {
        self.state.lock().unwrap().installs
    }

    pub fn removals(&self) -> usize {
        self.state.lock().unwrap().removals
    }

    pub fn indicator(&self) -> Option<String> {
        self.state.lock().unwrap().indicator.clone()
    }
}

impl PageSurface for FakeSurface {
    fn install_listeners(&self) -> anyhow::Result<()> {
        if self.fail_install {
            anyhow::bail!("listener registration failed");
        }
        self.state.lock().unwrap().installs += 1;
        Ok(())
    }

    fn remove_listeners(&self) {
        self.state.lock().unwrap().removals += 1;
    }

    fn show_indicator(&self, label: &str) {
        self.state.lock().unwrap().indicator = Some(label.to_string());
    }

    fn remove_indicator(&self) {
        self.state.lock().unwrap().indicator = None;
    }
}

/// Tab host with a fixed active tab
pub struct FakeHost {
    tab: Option<TabInfo>,
    attach_error: Option<String>,
    attach_calls: AtomicUsize,
}

impl FakeHost {
    pub fn without_tab() -> Self {
        Self {
            tab: None,
            attach_error: None,
            attach_calls: AtomicUsize::new(0),
        }
    }

    pub fn on(url: &str) -> Self {
        Self {
            tab: Some(TabInfo {
                id: 1,
                url: url.to_string(),
            }),
            ..Self::without_tab()
        }
    }

    pub fn failing_attach(mut self, message: &str) -> Self {
        self.attach_error = Some(message.to_string());
        self
    }

    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabHost for FakeHost {
    async fn active_tab(&self) -> Option<TabInfo> {
        self.tab.clone()
    }

    async fn attach(&self, _tab: &TabInfo) -> Result<(), AttachError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        match &self.attach_error {
            Some(message) => Err(AttachError::new(message.clone())),
            None => Ok(()),
        }
    }
}
