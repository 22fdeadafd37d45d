// crates/playcut-core/src/frame.rs
//
// The unit of currency between playcut-media's decoders and everything
// downstream (cache, transport, renderer).

use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOrigin {
    Playback,
    Scrub,
}

/// A decoded pixel buffer valid for one *timeline* presentation time (not
/// the source time it was decoded from). `source_version` is the
/// PlaybackGraph version that was current when the decode was requested —
/// the cache uses it to reject frames from a superseded graph.
#[derive(Clone)]
pub struct DecodedFrame {
    pub clip_id: Uuid,
    /// RGBA8 pixels, tightly packed, no stride padding.
    pub pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub presentation_time: f64,
    pub source_version: u64,
    pub origin: FrameOrigin,
    /// Scrub epoch this frame was decoded under (0 for playback-origin
    /// frames, which do not participate in scrub versioning).
    pub scrub_version: u64,
}

impl DecodedFrame {
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}
