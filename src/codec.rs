// Encoder and muxer capability contracts
//
// The engine drives a stateful hardware encoder through a slot-based
// submit/dequeue protocol and feeds its output to a container muxer. Both
// are platform services; this module only fixes the contract the engine
// relies on. Handle teardown beyond `stop` happens on drop.

use std::path::Path;

use crate::config::VideoFormat;
use crate::frame::PixelLayout;

/// Error reported by an encoder or muxer backend.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("muxer error: {0}")]
    Muxer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A free encoder input buffer, identified by its queue index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot(pub usize);

/// One compressed sample dequeued from the encoder output.
#[derive(Debug, Clone)]
pub struct OutputSample {
    /// Output queue index, returned via `release_output` once consumed.
    pub slot: usize,
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    pub keyframe: bool,
}

/// Track description negotiated by the encoder, consumed by the muxer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFormat {
    /// Codec mime type, e.g. "video/avc".
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

/// A stateful compressed-video encoder with bounded-timeout polling.
///
/// `dequeue_input`/`dequeue_output` wait at most the given timeout and
/// return `None` when no slot frees up in time; the caller is expected to
/// poll both sides cooperatively.
pub trait HardwareEncoder {
    /// Configure against the target format. Returns the input pixel layout
    /// the encoder selected, or `None` when the format is rejected.
    fn configure(&mut self, format: &VideoFormat) -> Option<PixelLayout>;

    fn start(&mut self) -> Result<(), CodecError>;

    fn dequeue_input(&mut self, timeout_us: u64) -> Option<InputSlot>;

    /// Submit raw frame bytes with their presentation timestamp.
    fn submit_input(&mut self, slot: InputSlot, data: &[u8], pts_us: i64)
        -> Result<(), CodecError>;

    fn dequeue_output(&mut self, timeout_us: u64) -> Option<OutputSample>;

    /// The output format as negotiated after configuration. Only meaningful
    /// once the first output sample exists.
    fn output_format(&self) -> TrackFormat;

    fn release_output(&mut self, slot: usize);

    fn stop(&mut self);
}

/// Writes timestamped compressed samples into a single-track container
/// file. `add_track` must precede `start`; `stop` finalizes the container.
pub trait Muxer {
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize, CodecError>;

    fn start(&mut self) -> Result<(), CodecError>;

    fn write_sample(
        &mut self,
        track: usize,
        data: &[u8],
        pts_us: i64,
        keyframe: bool,
    ) -> Result<(), CodecError>;

    fn stop(&mut self);
}

/// Factory for the platform encoder and muxer a single encode session uses.
pub trait CodecBackend: Send + Sync {
    type Encoder: HardwareEncoder;
    type Muxer: Muxer;

    /// Create an encoder instance, or `None` when the platform has none to
    /// offer.
    fn create_encoder(&self) -> Option<Self::Encoder>;

    /// Create a muxer writing the container to `path`.
    fn create_muxer(&self, path: &Path) -> Result<Self::Muxer, CodecError>;
}
