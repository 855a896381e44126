//! Shared test utilities: a scripted codec backend.
//!
//! The fake encoder hands out input slots immediately and echoes every
//! submitted frame back as one compressed sample carrying the same
//! timestamp, which makes encode runs deterministic and fast. Everything
//! the backend observes is recorded in a [`BackendLog`] for assertions.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{
    CodecBackend, CodecError, HardwareEncoder, InputSlot, Muxer, OutputSample, TrackFormat,
};
use crate::config::VideoFormat;
use crate::frame::PixelLayout;

/// Everything the fake backend observed, for test assertions.
#[derive(Default)]
pub struct BackendLog {
    pub encoders_created: usize,
    pub muxers_created: usize,
    pub configured: Vec<VideoFormat>,
    pub encoder_started: bool,
    pub encoder_stopped: bool,
    /// (pts_us, byte length, first payload byte) per submitted frame.
    pub submitted: Vec<(i64, usize, u8)>,
    pub released_slots: Vec<usize>,
    pub track_formats: Vec<TrackFormat>,
    pub muxer_started: bool,
    pub muxer_stopped: bool,
    /// (pts_us, byte length) per sample the muxer received.
    pub samples: Vec<(i64, usize)>,
    pub output_path: Option<PathBuf>,
}

/// Always-accepting in-memory encoder/muxer factory.
pub struct FakeBackend {
    pub log: Arc<Mutex<BackendLog>>,
    encoder_available: bool,
    reject_format: bool,
    layout: PixelLayout,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(BackendLog::default())),
            encoder_available: true,
            reject_format: false,
            layout: PixelLayout::Planar,
        }
    }

    /// A platform with no encoder to offer.
    pub fn unavailable() -> Self {
        Self {
            encoder_available: false,
            ..Self::new()
        }
    }

    /// An encoder that rejects every format.
    pub fn rejecting() -> Self {
        Self {
            reject_format: true,
            ..Self::new()
        }
    }

    /// Use the semi-planar input layout instead of planar.
    pub fn semi_planar() -> Self {
        Self {
            layout: PixelLayout::SemiPlanar,
            ..Self::new()
        }
    }
}

pub struct FakeEncoder {
    log: Arc<Mutex<BackendLog>>,
    reject_format: bool,
    layout: PixelLayout,
    format: Option<VideoFormat>,
    pending: VecDeque<OutputSample>,
    next_slot: usize,
}

impl HardwareEncoder for FakeEncoder {
    fn configure(&mut self, format: &VideoFormat) -> Option<PixelLayout> {
        self.log.lock().configured.push(*format);
        if self.reject_format {
            return None;
        }
        self.format = Some(*format);
        Some(self.layout)
    }

    fn start(&mut self) -> Result<(), CodecError> {
        self.log.lock().encoder_started = true;
        Ok(())
    }

    fn dequeue_input(&mut self, _timeout_us: u64) -> Option<InputSlot> {
        let slot = self.next_slot;
        self.next_slot += 1;
        Some(InputSlot(slot))
    }

    fn submit_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        pts_us: i64,
    ) -> Result<(), CodecError> {
        self.log
            .lock()
            .submitted
            .push((pts_us, data.len(), data.first().copied().unwrap_or(0)));
        self.pending.push_back(OutputSample {
            slot: slot.0,
            data: data[..data.len().min(16)].to_vec(),
            pts_us,
            keyframe: pts_us == 0,
        });
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout_us: u64) -> Option<OutputSample> {
        self.pending.pop_front()
    }

    fn output_format(&self) -> TrackFormat {
        let format = self.format.unwrap_or(VideoFormat {
            width: 0,
            height: 0,
            bitrate: 0,
            frame_rate: 0,
        });
        TrackFormat {
            mime: "video/avc".into(),
            width: format.width,
            height: format.height,
        }
    }

    fn release_output(&mut self, slot: usize) {
        self.log.lock().released_slots.push(slot);
    }

    fn stop(&mut self) {
        self.log.lock().encoder_stopped = true;
    }
}

pub struct FakeMuxer {
    log: Arc<Mutex<BackendLog>>,
}

impl Muxer for FakeMuxer {
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize, CodecError> {
        let mut log = self.log.lock();
        log.track_formats.push(format.clone());
        Ok(log.track_formats.len() - 1)
    }

    fn start(&mut self) -> Result<(), CodecError> {
        self.log.lock().muxer_started = true;
        Ok(())
    }

    fn write_sample(
        &mut self,
        _track: usize,
        data: &[u8],
        pts_us: i64,
        _keyframe: bool,
    ) -> Result<(), CodecError> {
        self.log.lock().samples.push((pts_us, data.len()));
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().muxer_stopped = true;
    }
}

impl CodecBackend for FakeBackend {
    type Encoder = FakeEncoder;
    type Muxer = FakeMuxer;

    fn create_encoder(&self) -> Option<FakeEncoder> {
        if !self.encoder_available {
            return None;
        }
        self.log.lock().encoders_created += 1;
        Some(FakeEncoder {
            log: Arc::clone(&self.log),
            reject_format: self.reject_format,
            layout: self.layout,
            format: None,
            pending: VecDeque::new(),
            next_slot: 0,
        })
    }

    fn create_muxer(&self, path: &Path) -> Result<FakeMuxer, CodecError> {
        let mut log = self.log.lock();
        log.muxers_created += 1;
        log.output_path = Some(path.to_path_buf());
        Ok(FakeMuxer {
            log: Arc::clone(&self.log),
        })
    }
}
