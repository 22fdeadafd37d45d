// crates/playcut-core/src/error.rs
//
// Closed error taxonomy. Decode-boundary failures (ffmpeg, I/O) are
// wrapped into `DecodeError` in playcut-media so nothing above that crate
// needs to know about ffmpeg or anyhow types.

use uuid::Uuid;

#[derive(thiserror::Error, Debug, Clone)]
pub enum EngineError {
    /// Fatal for the load that produced it; user-visible. Raised by the
    /// composition sanitizer/loader, e.g. a clip with srcRange.duration <= 0.
    #[error("invalid composition data: {reason}")]
    InvalidCompositionData { reason: String },

    /// Per-decode failure. Contributes to a per-clip failure counter; the
    /// transport holds the current frame and the next request retries.
    #[error("decode error for clip {clip_id}: {message}")]
    DecodeError { clip_id: Uuid, message: String },

    /// Benign — reached end of stream at a segment boundary.
    #[error("end of stream for clip {clip_id}")]
    EndOfStream { clip_id: Uuid },

    /// Benign — the task was cancelled before completion and returns
    /// without writing to the cache.
    #[error("decode cancelled for clip {clip_id}")]
    Cancelled { clip_id: Uuid },

    /// Admission denial: global in-flight budget exhausted, request dropped.
    #[error("decode budget exceeded (in-flight={in_flight}, cap={cap})")]
    BudgetExceeded { in_flight: u32, cap: u32 },
}

impl EngineError {
    /// True for the two error kinds that are expected in normal operation
    /// and should never be surfaced to the user as a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, EngineError::EndOfStream { .. } | EngineError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_classification() {
        let id = Uuid::nil();
        assert!(EngineError::EndOfStream { clip_id: id }.is_benign());
        assert!(EngineError::Cancelled { clip_id: id }.is_benign());
        assert!(!EngineError::DecodeError { clip_id: id, message: "x".into() }.is_benign());
        assert!(!EngineError::BudgetExceeded { in_flight: 6, cap: 6 }.is_benign());
    }
}
