// loopclip - looping boomerang clip recorder
//
// Buffers live NV21 camera frames, converts them on a background worker to
// the encoder's YUV 4:2:0 layout, and encodes the buffered sequence as a
// forward-then-reverse loop into a single container file.
//
// The capture source pushes frames into the ingest pipeline; pushing never
// blocks and under load only the most recent unconverted frame survives.
// The encode engine drives a platform encoder/muxer pair (see `codec` for
// the capability contracts) through a slot-based polling protocol with a
// hard wall-clock budget.

pub mod codec;
pub mod config;
pub mod convert;
pub mod engine;
pub mod frame;
pub mod ingest;
pub mod store;
pub mod testing;

pub use config::{VideoFormat, VideoSize};
pub use engine::{BoomerangEncoder, EncodeCallback, EncodeError};
pub use frame::{PixelLayout, RawFrame};
pub use ingest::FrameIngestPipeline;
pub use store::{FrameStore, StoredFrame};
