// Clip timing and encoder format configuration
//
// Playback timing is fixed: every frame is shown for 50 ms (20 fps), which
// is what gives the loop its characteristic stop-motion cadence. Bitrate is
// derived from the requested resolution with a quality floor so small clips
// do not starve the encoder.

use serde::{Deserialize, Serialize};

/// Fixed display duration of one frame.
pub const FRAME_DURATION_MS: u64 = 50;

/// Frame duration in encoder time units (microseconds).
pub const FRAME_DURATION_US: i64 = (FRAME_DURATION_MS * 1000) as i64;

/// Frame rate implied by the fixed frame duration.
pub const FRAME_RATE: u32 = (1000 / FRAME_DURATION_MS) as u32;

/// Reference resolution for bitrate scaling (portrait 720p).
const REFERENCE_PIXELS: u32 = 720 * 1280;

/// Bitrate assigned to a clip at the reference resolution, in bits/s.
const REFERENCE_BITRATE_BPS: u32 = 2_000_000;

/// Target resolution of the capture and the encoded clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u32 {
        self.width.saturating_mul(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.pixels() == 0
    }
}

/// Encoder input format: resolution plus rate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
}

impl VideoFormat {
    /// Derive the encode format for a resolution.
    ///
    /// The bitrate is the larger of the resolution-scaled default and a
    /// per-pixel quality floor, so low resolutions still get enough bits
    /// per frame.
    pub fn for_size(size: VideoSize) -> Self {
        let pixels = size.pixels();
        // Integer scale factor relative to the reference resolution,
        // clamped so resolutions above the reference keep the full rate.
        let ratio = (REFERENCE_PIXELS / pixels.max(1)).max(1);
        let scaled = REFERENCE_BITRATE_BPS / ratio;
        let floor = (pixels as u64 * FRAME_RATE as u64 * 4) as f64 * 0.07;
        Self {
            width: size.width,
            height: size.height,
            bitrate: scaled.max(floor as u32),
            frame_rate: FRAME_RATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_constants_are_consistent() {
        assert_eq!(FRAME_DURATION_MS, 50);
        assert_eq!(FRAME_RATE, 20);
        assert_eq!(FRAME_DURATION_US, 50_000);
    }

    #[test]
    fn reference_resolution_uses_quality_floor() {
        let format = VideoFormat::for_size(VideoSize::new(720, 1280));
        // floor: 921600 px * 20 fps * 4 * 0.07
        assert_eq!(format.bitrate, 5_160_960);
        assert_eq!(format.frame_rate, 20);
    }

    #[test]
    fn small_resolution_keeps_quality_floor() {
        let format = VideoFormat::for_size(VideoSize::new(320, 240));
        // scaled: 2_000_000 / (921600 / 76800) = 166_666, floor wins
        assert_eq!(format.bitrate, 430_080);
    }

    #[test]
    fn oversized_resolution_does_not_divide_by_zero() {
        let format = VideoFormat::for_size(VideoSize::new(1080, 1920));
        assert!(format.bitrate >= REFERENCE_BITRATE_BPS);
    }

    #[test]
    fn empty_size_is_detected() {
        assert!(VideoSize::default().is_empty());
        assert!(VideoSize::new(0, 720).is_empty());
        assert!(!VideoSize::new(2, 2).is_empty());
    }
}
