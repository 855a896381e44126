// Frame ingest pipeline
//
// Decouples the capture producer from pixel-format conversion. The producer
// hands frames into a single-slot mailbox and is never blocked; one
// background worker drains the mailbox, converts each frame to the encoder
// layout, and appends the result to the shared FrameStore.
//
// The mailbox intentionally holds at most one pending frame: when capture
// outruns conversion, newer frames overwrite the unconverted one, so the
// store always tracks the most recent camera state instead of falling
// behind. This is latest-wins buffering, not lossless buffering.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::config::VideoSize;
use crate::convert::nv21_to_yuv420;
use crate::frame::{yuv420_frame_size, PixelLayout, RawFrame};
use crate::store::{FrameStore, StoredFrame};

/// Messages delivered to the conversion worker.
enum WorkerMessage {
    /// A frame snapshot awaiting conversion.
    Convert(RawFrame),
    /// Exit after the current wait.
    Stop,
}

/// Single-slot hand-off channel with overwrite-on-full semantics.
///
/// Capacity is fixed at 1; a push that finds the slot occupied discards the
/// pending message and takes its place. With one producer this makes the
/// latest-wins contract explicit in the type rather than implied by shared
/// mutable state.
struct Mailbox {
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
}

impl Mailbox {
    fn new() -> (Mailbox, Receiver<WorkerMessage>) {
        let (tx, rx) = bounded(1);
        (
            Mailbox {
                tx,
                rx: rx.clone(),
            },
            rx,
        )
    }

    fn send_latest(&self, message: WorkerMessage) {
        if let Err(TrySendError::Full(message)) = self.tx.try_send(message) {
            // Drop whatever the worker has not taken yet.
            let _ = self.rx.try_recv();
            let _ = self.tx.try_send(message);
        }
    }
}

struct IngestState {
    size: VideoSize,
    running: bool,
    mailbox: Option<Mailbox>,
    worker: Option<thread::JoinHandle<()>>,
}

/// Producer/consumer pipeline from raw capture frames to converted,
/// encoder-ready frames.
pub struct FrameIngestPipeline {
    state: Mutex<IngestState>,
    store: Arc<FrameStore>,
}

impl Default for FrameIngestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameIngestPipeline {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IngestState {
                size: VideoSize::default(),
                running: false,
                mailbox: None,
                worker: None,
            }),
            store: Arc::new(FrameStore::new()),
        }
    }

    /// Set the capture resolution. Ignored while the pipeline is running.
    pub fn configure(&self, size: VideoSize) {
        let mut state = self.state.lock();
        if state.running {
            log::warn!("ignoring resolution change while ingest is running");
            return;
        }
        state.size = size;
    }

    /// Start the background conversion worker.
    ///
    /// Returns false when no resolution has been configured. Calling while
    /// already running is a no-op returning true.
    pub fn start(&self, layout: PixelLayout) -> bool {
        let mut state = self.state.lock();
        if state.size.is_empty() {
            log::warn!("can't start ingest on an empty resolution");
            return false;
        }
        if state.running {
            return true;
        }

        let (mailbox, receiver) = Mailbox::new();
        let store = Arc::clone(&self.store);
        let size = state.size;
        let worker = thread::Builder::new()
            .name("loopclip-convert".into())
            .spawn(move || conversion_worker(receiver, store, size, layout));
        match worker {
            Ok(handle) => {
                state.mailbox = Some(mailbox);
                state.worker = Some(handle);
                state.running = true;
                log::info!(
                    "ingest started at {}x{} ({:?})",
                    size.width,
                    size.height,
                    layout
                );
                true
            }
            Err(e) => {
                log::error!("failed to spawn conversion worker: {}", e);
                false
            }
        }
    }

    /// Hand a captured frame to the conversion worker. Never blocks beyond
    /// the copy into the mailbox; no-op when stopped or when the frame
    /// carries no pixel data.
    pub fn push(&self, frame: &RawFrame) {
        let state = self.state.lock();
        if !state.running || frame.data().is_none() {
            return;
        }
        if let Some(mailbox) = &state.mailbox {
            mailbox.send_latest(WorkerMessage::Convert(frame.clone()));
        }
    }

    /// Stop the conversion worker. Converted frames stay in the store.
    pub fn stop(&self) {
        let (mailbox, worker) = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            (state.mailbox.take(), state.worker.take())
        };
        if let Some(mailbox) = mailbox {
            mailbox.send_latest(WorkerMessage::Stop);
        }
        if let Some(handle) = worker {
            let _ = handle.join();
        }
        log::debug!("ingest stopped");
    }

    /// Drop all converted frames and their backing memory.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Shared handle to the converted frame sequence.
    pub fn frames(&self) -> Arc<FrameStore> {
        Arc::clone(&self.store)
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

impl Drop for FrameIngestPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop: wait for a frame, convert it, append the result.
///
/// The scratch buffer is reused across iterations. A frame that fails
/// conversion (wrong size, truncated buffer) is dropped without creating a
/// store entry.
fn conversion_worker(
    receiver: Receiver<WorkerMessage>,
    store: Arc<FrameStore>,
    size: VideoSize,
    layout: PixelLayout,
) {
    let frame_len = yuv420_frame_size(size.width, size.height);
    let mut scratch = vec![0u8; frame_len];

    while let Ok(message) = receiver.recv() {
        let frame = match message {
            WorkerMessage::Convert(frame) => frame,
            WorkerMessage::Stop => break,
        };
        let Some(pixels) = frame.data() else {
            continue;
        };
        if !nv21_to_yuv420(pixels, size.width, size.height, &mut scratch, layout) {
            log::debug!(
                "dropping frame: conversion failed at {}x{} with {} bytes",
                size.width,
                size.height,
                pixels.len()
            );
            continue;
        }
        match StoredFrame::copy_from(&scratch[..frame_len]) {
            Ok(stored) => store.append(stored),
            Err(e) => log::error!("can't allocate frame backing memory: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn nv21_frame(size: VideoSize, luma_byte: u8) -> RawFrame {
        let mut frame = RawFrame::with_size(size.width, size.height);
        frame.fill(&vec![
            luma_byte;
            yuv420_frame_size(size.width, size.height)
        ]);
        frame
    }

    fn wait_for_len(store: &FrameStore, len: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if store.len() >= len {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn mailbox_keeps_only_the_latest_frame() {
        let (mailbox, receiver) = Mailbox::new();
        let size = VideoSize::new(2, 2);
        mailbox.send_latest(WorkerMessage::Convert(nv21_frame(size, 0xAA)));
        mailbox.send_latest(WorkerMessage::Convert(nv21_frame(size, 0xBB)));

        match receiver.try_recv() {
            Ok(WorkerMessage::Convert(frame)) => {
                assert_eq!(frame.data().unwrap()[0], 0xBB);
            }
            _ => panic!("expected exactly one pending frame"),
        }
        assert!(receiver.try_recv().is_err(), "slot must be empty after take");
    }

    #[test]
    fn start_requires_a_resolution() {
        let pipeline = FrameIngestPipeline::new();
        assert!(!pipeline.start(PixelLayout::Planar));
        pipeline.configure(VideoSize::new(2, 2));
        assert!(pipeline.start(PixelLayout::Planar));
        // Idempotent while running.
        assert!(pipeline.start(PixelLayout::Planar));
        pipeline.stop();
    }

    #[test]
    fn frames_are_converted_in_push_order() {
        let pipeline = FrameIngestPipeline::new();
        let size = VideoSize::new(2, 2);
        pipeline.configure(size);
        assert!(pipeline.start(PixelLayout::Planar));

        pipeline.push(&nv21_frame(size, 1));
        assert!(wait_for_len(&pipeline.frames(), 1));
        pipeline.push(&nv21_frame(size, 2));
        assert!(wait_for_len(&pipeline.frames(), 2));
        pipeline.stop();

        let frames = pipeline.frames().snapshot();
        let mut out = vec![0u8; yuv420_frame_size(2, 2)];
        frames[0].read_into(&mut out);
        assert_eq!(out[0], 1);
        frames[1].read_into(&mut out);
        assert_eq!(out[0], 2);
    }

    #[test]
    fn resolution_is_locked_while_running() {
        let pipeline = FrameIngestPipeline::new();
        let size = VideoSize::new(2, 2);
        pipeline.configure(size);
        assert!(pipeline.start(PixelLayout::Planar));

        // Ignored: the worker keeps converting at the original resolution.
        pipeline.configure(VideoSize::new(64, 64));
        pipeline.push(&nv21_frame(size, 9));
        assert!(wait_for_len(&pipeline.frames(), 1));
        pipeline.stop();

        assert_eq!(
            pipeline.frames().snapshot()[0].len(),
            yuv420_frame_size(2, 2)
        );
    }

    #[test]
    fn push_after_stop_is_ignored() {
        let pipeline = FrameIngestPipeline::new();
        let size = VideoSize::new(2, 2);
        pipeline.configure(size);
        assert!(pipeline.start(PixelLayout::Planar));
        pipeline.stop();
        assert!(!pipeline.is_running());

        pipeline.push(&nv21_frame(size, 5));
        thread::sleep(Duration::from_millis(20));
        assert!(pipeline.frames().is_empty());
    }

    #[test]
    fn undersized_frame_is_dropped() {
        let pipeline = FrameIngestPipeline::new();
        pipeline.configure(VideoSize::new(4, 4));
        assert!(pipeline.start(PixelLayout::Planar));

        let mut short = RawFrame::with_size(4, 4);
        short.fill(&[0u8; 4]); // far less than a full 4x4 frame
        pipeline.push(&short);
        thread::sleep(Duration::from_millis(50));
        pipeline.stop();
        assert!(pipeline.frames().is_empty());
    }

    #[test]
    fn clear_releases_frames_independent_of_running() {
        let pipeline = FrameIngestPipeline::new();
        let size = VideoSize::new(2, 2);
        pipeline.configure(size);
        assert!(pipeline.start(PixelLayout::SemiPlanar));
        pipeline.push(&nv21_frame(size, 3));
        assert!(wait_for_len(&pipeline.frames(), 1));

        pipeline.clear();
        assert!(pipeline.frames().is_empty());
        assert!(pipeline.is_running());
        pipeline.stop();
    }
}
