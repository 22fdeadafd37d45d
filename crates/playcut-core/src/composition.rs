// crates/playcut-core/src/composition.rs
//
// The edited project: tracks, clips, matte bindings. Pure data + a
// sanitizer; no decode, no rendering. The edit-operations layer (trim,
// slip, slide, ripple, undo) lives outside this crate and mutates a
// Composition directly — this module only guarantees that whatever it
// hands back out is internally consistent.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::EngineError;

/// Opaque reference to a source asset. The engine never opens files itself
/// from this type — `playcut-media::VideoSource` resolves it to a path (or
/// other locator) via a host-supplied asset resolver.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    /// Stack index determines z-order; higher draws on top.
    pub stack_index: i32,
    pub kind: TrackKind,
    pub name: String,
    pub muted: bool,
    pub solo: bool,
    pub locked: bool,
}

/// A half-open source range `[start, start + duration)` in source-native
/// seconds, before `speed` is applied.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: f64,
    pub duration: f64,
}

impl SourceRange {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatteMode {
    None,
    Alpha,
    Luma,
}

/// How a clip's matte source is chosen. Exactly one of `explicit` or
/// `use_layer_above` is meaningful when `mode != MatteMode::None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatteBinding {
    pub mode: MatteMode,
    pub source_clip_id: Option<Uuid>,
    pub use_layer_above: bool,
}

impl Default for MatteBinding {
    fn default() -> Self {
        Self { mode: MatteMode::None, source_clip_id: None, use_layer_above: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    pub translate_x: f32,
    pub translate_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation_deg: f32,
    pub opacity: f32,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            translate_x: 0.0,
            translate_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_deg: 0.0,
            opacity: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Clip {
    pub id: Uuid,
    pub asset: AssetRef,
    pub src_range: SourceRange,
    /// Timeline anchor in seconds.
    pub dst_start: f64,
    /// Playback speed multiplier; 1.0 = native rate.
    pub speed: f64,
    pub transform: Transform2D,
    pub track_id: Uuid,
    #[serde(default)]
    pub matte: MatteBinding,
}

impl Clip {
    /// Derived end of the clip on the timeline: `dstStart + srcRange.duration / speed`.
    pub fn dst_end(&self) -> f64 {
        self.dst_start + self.src_range.duration / self.speed
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Composition {
    pub tracks: Vec<Track>,
    pub clips: Vec<Clip>,
    /// Frame rate as a rational, persisted so loads don't depend on
    /// re-probing any asset.
    pub fps_num: i64,
    pub fps_den: i64,
    /// Opaque work-area passthrough — used only by lift/extract (out of
    /// scope here); validated for finiteness, not interpreted.
    pub work_area_start: Option<f64>,
    pub work_area_duration: Option<f64>,
}

impl Composition {
    /// Load-time validation: a hard error for data the engine cannot
    /// reasonably repair (non-finite/non-positive clip source durations,
    /// non-finite work-area passthrough). Everything else is handled by
    /// `sanitize`.
    pub fn validate(&self) -> Result<(), EngineError> {
        for clip in &self.clips {
            let d = clip.src_range.duration;
            if !d.is_finite() || d <= 0.0 {
                return Err(EngineError::InvalidCompositionData {
                    reason: format!("clip {} has non-positive srcRange.duration {d}", clip.id),
                });
            }
        }
        if let Some(start) = self.work_area_start {
            if !start.is_finite() {
                return Err(EngineError::InvalidCompositionData {
                    reason: format!("work_area_start {start} is not finite"),
                });
            }
        }
        if let Some(duration) = self.work_area_duration {
            if !duration.is_finite() {
                return Err(EngineError::InvalidCompositionData {
                    reason: format!("work_area_duration {duration} is not finite"),
                });
            }
        }
        Ok(())
    }

    /// Repair everything that can be silently clamped or cleared rather
    /// than rejected outright: matte cycles/self-mattes, sub-frame
    /// durations, negative starts, and source ranges outside a sane bound.
    /// `asset_durations` maps an asset to its probed native duration in
    /// seconds; clips whose asset has no entry are left unclamped (no
    /// decoder has inspected them yet). Idempotent:
    /// `sanitize(sanitize(c)) == sanitize(c)`.
    pub fn sanitize(&self, one_frame: f64, asset_durations: &HashMap<AssetRef, f64>) -> Composition {
        let mut out = self.clone();

        for clip in &mut out.clips {
            if clip.dst_start < 0.0 || !clip.dst_start.is_finite() {
                clip.dst_start = 0.0;
            }
            if clip.src_range.start < 0.0 || !clip.src_range.start.is_finite() {
                clip.src_range.start = 0.0;
            }
            if !clip.src_range.duration.is_finite() || clip.src_range.duration < one_frame {
                clip.src_range.duration = one_frame;
            }
            if !clip.speed.is_finite() || clip.speed <= 0.0 {
                clip.speed = 1.0;
            }

            if let Some(&native) = asset_durations.get(&clip.asset) {
                if native.is_finite() && native > 0.0 {
                    clip.src_range.start = clip.src_range.start.min(native);
                    let max_duration = (native - clip.src_range.start).max(one_frame);
                    clip.src_range.duration = clip.src_range.duration.min(max_duration);
                }
            }
        }

        sanitize_mattes(&mut out.clips);
        out
    }
}

/// Clear any matte binding that is a self-reference, a mutual reference
/// (A claims B and B claims A), or part of a longer cycle. `use_layer_above`
/// bindings are resolved relative to the draw order by the mapper, not
/// here, so they are never flagged as self/mutual by this pass — only
/// explicit `source_clip_id` bindings can form a cycle this function can see.
fn sanitize_mattes(clips: &mut [Clip]) {
    let ids: Vec<Uuid> = clips.iter().map(|c| c.id).collect();

    loop {
        let mut to_clear: HashSet<Uuid> = HashSet::new();

        for clip in clips.iter() {
            if clip.matte.mode == MatteMode::None {
                continue;
            }
            if let Some(src) = clip.matte.source_clip_id {
                if src == clip.id {
                    to_clear.insert(clip.id);
                    continue;
                }
                if !ids.contains(&src) {
                    // Dangling reference (source removed elsewhere).
                    to_clear.insert(clip.id);
                    continue;
                }
                // Mutual reference: the source also claims us as its matte.
                if let Some(other) = clips.iter().find(|c| c.id == src) {
                    if other.matte.source_clip_id == Some(clip.id) {
                        to_clear.insert(clip.id);
                        to_clear.insert(src);
                    }
                }
            }
        }

        if to_clear.is_empty() {
            // No mutual/self edges left among explicit bindings; check for
            // longer cycles via simple path-following.
            if !has_longer_cycle(clips) {
                break;
            }
            // Clearing one edge per detected cycle guarantees progress.
            if let Some(id) = find_one_cycle_member(clips) {
                for clip in clips.iter_mut() {
                    if clip.id == id {
                        clip.matte.mode = MatteMode::None;
                        clip.matte.source_clip_id = None;
                    }
                }
                continue;
            }
            break;
        }

        for clip in clips.iter_mut() {
            if to_clear.contains(&clip.id) {
                clip.matte.mode = MatteMode::None;
                clip.matte.source_clip_id = None;
            }
        }
    }
}

fn has_longer_cycle(clips: &[Clip]) -> bool {
    find_one_cycle_member(clips).is_some()
}

/// Returns the id of one clip participating in a matte-reference cycle of
/// length > 2 (self and mutual cycles are already handled by the caller
/// before this runs), or `None` if the graph is acyclic.
fn find_one_cycle_member(clips: &[Clip]) -> Option<Uuid> {
    for start in clips {
        if start.matte.mode == MatteMode::None {
            continue;
        }
        let mut visited = HashSet::new();
        let mut current = start.id;
        loop {
            if !visited.insert(current) {
                return Some(start.id);
            }
            let next = clips
                .iter()
                .find(|c| c.id == current)
                .and_then(|c| if c.matte.mode != MatteMode::None { c.matte.source_clip_id } else { None });
            match next {
                Some(n) => current = n,
                None => break,
            }
        }
    }
    None
}
