// crates/playcut-engine/src/lib.rs
//
// Transport-side of the engine: the authoritative clock, the display-
// cadence ticker, scrub admission, the transport state machine, tuning,
// and the audio interface boundary. Decode plumbing (VideoSource, the
// cache ring, the worker pool) lives one layer down in playcut-media.

pub mod audio;
pub mod clock;
pub mod scrub;
pub mod ticker;
pub mod transport;
pub mod tuning;

pub use audio::{ActiveAudioSegment, AudioMixer, RodioAudioMixer};
pub use clock::{ClockSource, ClockState, PlaybackClock};
pub use scrub::{Admission, Direction, ScrubCoordinator, ScrubPhase, ScrubTarget, VelocityClass};
pub use ticker::TimelineTicker;
pub use transport::{Cursor, InsertTarget, TickEvent, TransportController, TransportState};
pub use tuning::Tuning;
