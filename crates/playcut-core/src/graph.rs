// crates/playcut-core/src/graph.rs
//
// The derived, immutable-per-version playback graph. Produced by
// `mapper::build_graph` from a `Composition`; never mutated in place — a
// new composition produces a new graph with a higher version.

use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub enum TimelineSegment {
    /// One or more clips simultaneously active on the global timeline
    /// (distinct tracks may overlap); per-layer segment lists never carry
    /// more than one id here since a single track cannot overlap itself.
    Clip { clip_ids: Vec<Uuid>, start: f64, end: f64 },
    Gap { start: f64, end: f64 },
}

impl TimelineSegment {
    pub fn start(&self) -> f64 {
        match self {
            TimelineSegment::Clip { start, .. } => *start,
            TimelineSegment::Gap { start, .. } => *start,
        }
    }

    pub fn end(&self) -> f64 {
        match self {
            TimelineSegment::Clip { end, .. } => *end,
            TimelineSegment::Gap { end, .. } => *end,
        }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start() && t < self.end()
    }
}

/// One draw-list entry within a composite slice: the clip to draw and the
/// id of the clip (if any) feeding its matte, already resolved from
/// whichever binding style the clip used (explicit id or "layer above").
#[derive(Clone, Debug, PartialEq)]
pub struct SliceEntry {
    pub clip_id: Uuid,
    pub matte_source: Option<Uuid>,
    pub opacity: f32,
}

/// A maximal time interval over which the active clip set and z-order is
/// constant. `entries` is top-first (highest z-order first).
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeSlice {
    pub start: f64,
    pub end: f64,
    pub entries: Vec<SliceEntry>,
}

const OPACITY_EPS: f32 = 1e-3;

impl CompositeSlice {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Slices merge when the draw-list and matte-map are equal (opacity
    /// compared within `OPACITY_EPS`, not exactly) and end-times agree
    /// within half a frame.
    pub fn mergeable_with(&self, other: &CompositeSlice, half_frame: f64) -> bool {
        if (self.end - other.start).abs() > half_frame {
            return false;
        }
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().zip(other.entries.iter()).all(|(a, b)| {
            a.clip_id == b.clip_id
                && a.matte_source == b.matte_source
                && (a.opacity - b.opacity).abs() <= OPACITY_EPS
        })
    }
}

/// Immutable derived playback graph for one composition version.
#[derive(Clone, Debug)]
pub struct PlaybackGraph {
    pub version: u64,
    pub segments: Vec<TimelineSegment>,
    pub duration: f64,
    pub slices: Vec<CompositeSlice>,
}

impl PlaybackGraph {
    pub fn empty(version: u64) -> Self {
        Self { version, segments: Vec::new(), duration: 0.0, slices: Vec::new() }
    }

    /// The segment containing `t`, or the last segment if `t` is at/after
    /// the end of the timeline (for clamped seeks).
    pub fn segment_at(&self, t: f64) -> Option<&TimelineSegment> {
        self.segments
            .iter()
            .find(|s| s.contains(t))
            .or_else(|| self.segments.last())
    }

    pub fn slice_at(&self, t: f64) -> Option<&CompositeSlice> {
        self.slices.iter().find(|s| s.contains(t))
    }
}
