// crates/playcut-core/src/commands.rs
//
// Every request a host (editor UI, demo harness) makes of the engine is an
// EngineCommand. playcut-engine's TransportController exposes one method per
// variant; this enum exists so hosts that want a queued/replayable command
// log (undo scrubbing through a session, a test fixture driving a sequence
// of actions) have a single serializable shape to log instead of a call
// trace. Adding a new host-facing action = add a variant here + one match
// arm in the transport's command dispatcher.

use serde::{Deserialize, Serialize};

use crate::composition::Composition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Replace the current composition; the transport re-derives the
    /// playback graph and rebuilds per-clip video sources.
    ApplyComposition(Composition),

    RequestPlay { rate: f64 },
    RequestPause,
    /// Synchronous seek: load the frame for `t`, then pause.
    RequestTime { t: f64 },

    BeginScrub,
    ScrubSeek { t: f64 },
    EndScrub { resume_if_wanted: bool },

    /// UI is about to start a blocking drag gesture unrelated to scrubbing
    /// (e.g. a trim handle); suspend playback without entering scrub state.
    PauseForDrag,
    ResumeAfterDrag,
}
