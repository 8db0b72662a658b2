//! Audio segment decoding and ordered playback.

pub mod decode;
pub mod playback;

pub use decode::{DecodedSegment, decode_segment};
pub use playback::{AudioPlaybackQueue, CpalSink, PlaybackSink};
