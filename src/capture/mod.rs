//! Screen capture pipeline
//!
//! Wraps the platform capture device and encoder. The session only sees
//! ordered [`VideoChunk`]s plus a terminal signal, delivered as
//! [`CaptureEvent`]s on a per-session channel.

mod device;
mod recording;
mod replay;

pub use device::CaptureDevice;
pub use recording::{ActiveCapture, CaptureSink, EncoderOptions};
pub use replay::ReplayDevice;

#[cfg(test)]
pub use device::{DeviceError, EncodingHandle, MediaConstraints, MediaStream};

/// An encoded fragment of the recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoChunk {
    pub data: Vec<u8>,
    /// Encoding descriptor the fragment was produced with
    pub mime_type: String,
}

/// Why the stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The encoder was stopped by the session
    Stopped,
    /// The device went away (e.g. the user stopped sharing)
    Revoked,
}

/// Events emitted by the capture pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A chunk of encoded video
    Chunk(VideoChunk),
    /// The encoder reported an error
    Error(String),
    /// No more chunks will follow
    Ended(EndReason),
}
