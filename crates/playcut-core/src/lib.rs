// crates/playcut-core/src/lib.rs
//
// Pure playback/scrub data model — no threads, no ffmpeg, no egui.
// Everything here is cheap to construct and safe to share across the
// worker/engine boundary by value or by Arc.

pub mod commands;
pub mod composition;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod graph;
pub mod mapper;
pub mod timebase;

pub mod helpers {
    pub mod time;
}

pub use commands::EngineCommand;
pub use composition::{
    AssetRef, Clip, Composition, MatteBinding, MatteMode, SourceRange, Track, TrackKind, Transform2D,
};
pub use error::EngineError;
pub use frame::{DecodedFrame, FrameOrigin};
pub use graph::{CompositeSlice, PlaybackGraph, SliceEntry, TimelineSegment};
pub use mapper::build_graph;
pub use timebase::{FrameTimebase, Rounding};
