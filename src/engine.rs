// Boomerang encode engine
//
// Takes the converted frame sequence and produces a single video file that
// plays forward then backward, repeated until the clip covers a minimum
// playback duration. The encoder is driven through its slot protocol with
// bounded-timeout polling on both the input and output side, under a hard
// wall-clock budget so a wedged encoder can never hang the caller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::codec::{CodecBackend, CodecError, HardwareEncoder, Muxer};
use crate::config::{VideoFormat, VideoSize, FRAME_DURATION_MS, FRAME_DURATION_US};
use crate::frame::{yuv420_frame_size, PixelLayout};
use crate::ingest::FrameIngestPipeline;
use crate::store::StoredFrame;

/// Minimum total playback duration the clip must cover.
const MIN_REPEAT_DURATION_MS: u64 = 3000;

/// Never build fewer than this many forward+back cycles.
const MIN_LOOP_REPEATS: u32 = 3;

/// Base capture loop length the encode budget is derived from.
const RECORDING_LOOP_LENGTH_MS: u64 = 2000;

/// Hard wall-clock budget for one encode run.
const MAX_ENCODING_TIME_MS: u64 = RECORDING_LOOP_LENGTH_MS * 8;

/// Bounded wait for encoder input/output slots.
const DEQUEUE_TIMEOUT_US: u64 = 2500;

/// Why an encode run failed.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("no encode format configured")]
    Unconfigured,

    #[error("no output file configured")]
    MissingOutput,

    #[error("not enough frames for a loop ({0})")]
    TooFewFrames(usize),

    #[error("no hardware encoder available")]
    EncoderUnavailable,

    #[error("encoder rejected format {width}x{height}")]
    FormatRejected { width: u32, height: u32 },

    #[error("stored frame {0} could not be read")]
    FrameRead(usize),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("encode budget exhausted after {0} ms")]
    BudgetExceeded(u64),

    #[error("encode cancelled")]
    Cancelled,

    #[error("an encode run is already active")]
    AlreadyRunning,
}

/// Start/complete notifications around an asynchronous encode run.
pub trait EncodeCallback: Send + 'static {
    fn on_start(&self) {}
    fn on_complete(&self, success: bool);
}

/// How many forward+back cycles are needed to cover the minimum playback
/// duration, floored at [`MIN_LOOP_REPEATS`].
fn repeat_count(frame_count: usize) -> u32 {
    let cycle_ms = (2 * frame_count as u64 - 2) * FRAME_DURATION_MS;
    let needed = MIN_REPEAT_DURATION_MS.div_ceil(cycle_ms) as u32;
    needed.max(MIN_LOOP_REPEATS)
}

/// Total clip duration in encoder time units.
fn target_duration_us(frame_count: usize, repeats: u32) -> i64 {
    (2 * frame_count as i64 - 2) * repeats as i64 * FRAME_DURATION_US
}

/// Ping-pong index sequence over `len` frames: 0,1,..,len-1,len-2,..,1,0,1,..
///
/// Direction is forced forward at index 0 and backward at the last index, so
/// neither endpoint is ever emitted twice in a row.
struct Traversal {
    len: usize,
    index: usize,
    reverse: bool,
}

impl Traversal {
    fn new(len: usize) -> Self {
        Self {
            len,
            index: 0,
            reverse: false,
        }
    }

    fn next(&mut self) -> usize {
        let current = self.index;
        if self.index == self.len - 1 {
            self.reverse = true;
        } else if self.index == 0 {
            self.reverse = false;
        }
        self.index = if self.reverse {
            self.index - 1
        } else {
            self.index + 1
        };
        current
    }
}

/// Encoder and muxer handles for exactly one encode run.
///
/// Finalization is unconditional: it runs explicitly on every exit path and
/// again from `Drop` as a backstop, stopping the encoder and, if a track was
/// registered, the muxer.
struct EncodeSession<B: CodecBackend> {
    encoder: B::Encoder,
    muxer: B::Muxer,
    track: Option<usize>,
    finalized: bool,
}

impl<B: CodecBackend> EncodeSession<B> {
    fn open(backend: &B, format: &VideoFormat, path: &Path) -> Result<Self, EncodeError> {
        let mut encoder = backend
            .create_encoder()
            .ok_or(EncodeError::EncoderUnavailable)?;
        if encoder.configure(format).is_none() {
            return Err(EncodeError::FormatRejected {
                width: format.width,
                height: format.height,
            });
        }
        encoder.start()?;
        let muxer = backend.create_muxer(path)?;
        Ok(Self {
            encoder,
            muxer,
            track: None,
            finalized: false,
        })
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.encoder.stop();
        if self.track.is_some() {
            self.muxer.stop();
        }
    }
}

impl<B: CodecBackend> Drop for EncodeSession<B> {
    fn drop(&mut self) {
        self.finalize();
    }
}

struct EngineState {
    format: Option<VideoFormat>,
    layout: PixelLayout,
    output: Option<PathBuf>,
}

/// Owns the ingest pipeline and drives one encoder/muxer session per run.
pub struct BoomerangEncoder<B: CodecBackend> {
    backend: B,
    ingest: FrameIngestPipeline,
    state: Mutex<EngineState>,
    /// One run at a time; a second `run` is rejected, not queued.
    encoding: AtomicBool,
    /// Checked inside the encode loop independently of any lock.
    cancelled: AtomicBool,
}

impl<B: CodecBackend> BoomerangEncoder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            ingest: FrameIngestPipeline::new(),
            state: Mutex::new(EngineState {
                format: None,
                layout: PixelLayout::default(),
                output: None,
            }),
            encoding: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Prepare for a clip at the given resolution.
    ///
    /// Probes the backend so that a missing encoder or a rejected format
    /// surfaces here rather than mid-run, records the negotiated input
    /// layout, and resets any previously buffered frames.
    pub fn configure(&self, size: VideoSize) -> bool {
        if size.is_empty() {
            log::warn!("can't configure an empty encode resolution");
            return false;
        }
        let format = VideoFormat::for_size(size);
        let Some(mut probe) = self.backend.create_encoder() else {
            log::warn!("no hardware encoder available");
            return false;
        };
        let Some(layout) = probe.configure(&format) else {
            log::warn!("encoder rejected format {}x{}", size.width, size.height);
            return false;
        };
        drop(probe);

        self.ingest.clear();
        self.ingest.configure(size);
        let mut state = self.state.lock();
        state.format = Some(format);
        state.layout = layout;
        log::info!(
            "configured {}x{} at {} bps, {:?} input",
            size.width,
            size.height,
            format.bitrate,
            layout
        );
        true
    }

    pub fn is_configured(&self) -> bool {
        self.state.lock().format.is_some()
    }

    /// Record the output file and start ingesting frames. Requires a prior
    /// successful `configure`.
    pub fn start(&self, path: impl Into<PathBuf>) -> bool {
        let layout = {
            let mut state = self.state.lock();
            if state.format.is_none() {
                log::warn!("can't start before a successful configure");
                return false;
            }
            state.output = Some(path.into());
            state.layout
        };
        self.ingest.start(layout)
    }

    /// The pipeline the capture source pushes raw frames into.
    pub fn ingest(&self) -> &FrameIngestPipeline {
        &self.ingest
    }

    /// Whether a run would have frames to work with and none is active.
    pub fn can_encode(&self) -> bool {
        !self.ingest.frames().is_empty() && !self.encoding.load(Ordering::Acquire)
    }

    /// Encode the buffered frames into the output file.
    ///
    /// Synchronous; returns success or failure with the reason logged.
    pub fn run(&self) -> bool {
        match self.encode() {
            Ok(()) => {
                log::info!("boomerang encode complete");
                true
            }
            Err(e) => {
                log::warn!("boomerang encode failed: {}", e);
                false
            }
        }
    }

    /// Run the encode on a dedicated worker thread, reporting through the
    /// callback. Nothing is invoked when there is nothing to encode or a
    /// run is already active.
    pub fn run_async<C: EncodeCallback>(self: &Arc<Self>, callback: C)
    where
        B: 'static,
    {
        let engine = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("loopclip-encode".into())
            .spawn(move || {
                if !engine.can_encode() {
                    log::debug!("skipping encode: no frames or a run is active");
                    return;
                }
                callback.on_start();
                callback.on_complete(engine.run());
            });
        if let Err(e) = spawned {
            log::error!("failed to spawn encode worker: {}", e);
        }
    }

    /// Full teardown: cancel any active run, stop ingestion, drop all
    /// buffered frames and configuration.
    pub fn release(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.ingest.stop();
        self.ingest.clear();
        let mut state = self.state.lock();
        state.format = None;
        state.output = None;
    }

    fn encode(&self) -> Result<(), EncodeError> {
        if self
            .encoding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EncodeError::AlreadyRunning);
        }
        self.cancelled.store(false, Ordering::Release);
        let result = self.encode_session();
        self.encoding.store(false, Ordering::Release);
        result
    }

    fn encode_session(&self) -> Result<(), EncodeError> {
        let (format, path) = {
            let state = self.state.lock();
            let format = state.format.ok_or(EncodeError::Unconfigured)?;
            let path = state.output.clone().ok_or(EncodeError::MissingOutput)?;
            (format, path)
        };
        // The run operates on the store as it is right now; frames converted
        // after this point belong to a future run.
        let frames = self.ingest.frames().snapshot();
        if frames.len() <= 2 {
            return Err(EncodeError::TooFewFrames(frames.len()));
        }

        let mut session = EncodeSession::open(&self.backend, &format, &path)?;
        let result = self.drive(&mut session, &frames, &format);
        session.finalize();
        result
    }

    fn drive(
        &self,
        session: &mut EncodeSession<B>,
        frames: &[Arc<StoredFrame>],
        format: &VideoFormat,
    ) -> Result<(), EncodeError> {
        let frame_count = frames.len();
        let repeats = repeat_count(frame_count);
        let target_us = target_duration_us(frame_count, repeats);
        log::debug!(
            "encoding {} frames, {} repeats, target {} us",
            frame_count,
            repeats,
            target_us
        );

        let mut traversal = Traversal::new(frame_count);
        let mut submitted: i64 = 0;
        let mut scratch = vec![0u8; yuv420_frame_size(format.width, format.height)];
        let budget = Duration::from_millis(MAX_ENCODING_TIME_MS);
        let started = Instant::now();

        loop {
            if started.elapsed() >= budget {
                return Err(EncodeError::BudgetExceeded(
                    started.elapsed().as_millis() as u64
                ));
            }
            if self.cancelled.load(Ordering::Acquire) {
                return Err(EncodeError::Cancelled);
            }

            if let Some(slot) = session.encoder.dequeue_input(DEQUEUE_TIMEOUT_US) {
                let index = traversal.next();
                let read = frames[index].read_into(&mut scratch);
                if read == 0 {
                    return Err(EncodeError::FrameRead(index));
                }
                let pts_us = submitted * FRAME_DURATION_US;
                session.encoder.submit_input(slot, &scratch[..read], pts_us)?;
                submitted += 1;
            }

            // Cancellation may land while we were feeding input; don't start
            // draining output for a run that is being torn down.
            if self.cancelled.load(Ordering::Acquire) {
                return Err(EncodeError::Cancelled);
            }

            if let Some(sample) = session.encoder.dequeue_output(DEQUEUE_TIMEOUT_US) {
                let track = match session.track {
                    Some(track) => track,
                    None => {
                        let negotiated = session.encoder.output_format();
                        let track = session.muxer.add_track(&negotiated)?;
                        session.muxer.start()?;
                        session.track = Some(track);
                        track
                    }
                };
                if sample.pts_us >= target_us {
                    log::debug!("end of stream reached at {} us", sample.pts_us);
                    session.encoder.release_output(sample.slot);
                    return Ok(());
                }
                session
                    .muxer
                    .write_sample(track, &sample.data, sample.pts_us, sample.keyframe)?;
                session.encoder.release_output(sample.slot);
            }
        }
    }
}
