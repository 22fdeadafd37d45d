// crates/playcut-core/src/mapper.rs
//
// Pure composition -> playback graph derivation. No I/O, no clocks; given
// the same Composition and version this always produces byte-identical
// output (mapper determinism is a tested invariant).

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::composition::{Clip, Composition, Track};
use crate::graph::{CompositeSlice, PlaybackGraph, SliceEntry, TimelineSegment};
use crate::timebase::FrameTimebase;
use crate::trace_mapper;

/// Per-track segment lists: clip/gap runs within a single layer, in track
/// order. Keyed by track id; a track with no clips still gets an entry
/// (an empty Vec, or a single Gap spanning the composition if `duration`
/// is known by the caller — left empty here since layer duration is only
/// meaningful relative to the global timeline).
pub fn build_layer_segments(comp: &Composition) -> HashMap<Uuid, Vec<TimelineSegment>> {
    let mut by_track: HashMap<Uuid, Vec<&Clip>> = HashMap::new();
    for track in &comp.tracks {
        by_track.entry(track.id).or_default();
    }
    for clip in &comp.clips {
        by_track.entry(clip.track_id).or_default().push(clip);
    }

    let mut out = HashMap::new();
    for (track_id, mut clips) in by_track {
        clips.sort_by(|a, b| a.dst_start.partial_cmp(&b.dst_start).unwrap().then(a.id.cmp(&b.id)));

        let mut segments = Vec::new();
        let mut cursor = 0.0_f64;
        for clip in clips {
            if clip.dst_start > cursor + f64::EPSILON {
                segments.push(TimelineSegment::Gap { start: cursor, end: clip.dst_start });
            }
            let end = clip.dst_end();
            segments.push(TimelineSegment::Clip {
                clip_ids: vec![clip.id],
                start: clip.dst_start.max(cursor),
                end,
            });
            cursor = cursor.max(end);
        }
        out.insert(track_id, segments);
    }
    out
}

/// All distinct dstStart/dstEnd boundary points across every clip, sorted
/// ascending and deduplicated. The empty-composition case yields an empty
/// vec; callers treat that as a zero-duration timeline.
fn boundary_points(comp: &Composition) -> Vec<f64> {
    let mut points: Vec<f64> = Vec::with_capacity(comp.clips.len() * 2);
    for clip in &comp.clips {
        points.push(clip.dst_start);
        points.push(clip.dst_end());
    }
    points.sort_by(|a, b| a.partial_cmp(b).unwrap());
    points.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    points
}

/// Clips active at `t`, defined as `dstStart <= t < dstEnd`.
fn active_at<'a>(clips: &'a [Clip], t: f64) -> Vec<&'a Clip> {
    clips.iter().filter(|c| c.dst_start <= t && t < c.dst_end()).collect()
}

/// The merged, gap-coalesced global timeline: one segment per maximal
/// interval of constant active-clip-id-set, sampled at interval midpoints
/// to stay clear of boundary ties.
pub fn build_global_segments(comp: &Composition) -> (Vec<TimelineSegment>, f64) {
    let points = boundary_points(comp);
    let duration = points.last().copied().unwrap_or(0.0);
    if points.len() < 2 {
        return (Vec::new(), duration);
    }

    let mut raw = Vec::new();
    for window in points.windows(2) {
        let (start, end) = (window[0], window[1]);
        let mid = (start + end) / 2.0;
        let mut ids: Vec<Uuid> = active_at(&comp.clips, mid).iter().map(|c| c.id).collect();
        ids.sort();
        raw.push(if ids.is_empty() {
            TimelineSegment::Gap { start, end }
        } else {
            TimelineSegment::Clip { clip_ids: ids, start, end }
        });
    }

    let mut merged: Vec<TimelineSegment> = Vec::with_capacity(raw.len());
    for seg in raw {
        match (merged.last_mut(), &seg) {
            (Some(TimelineSegment::Gap { end, .. }), TimelineSegment::Gap { end: new_end, .. }) => {
                *end = *new_end;
            }
            (
                Some(TimelineSegment::Clip { clip_ids, end, .. }),
                TimelineSegment::Clip { clip_ids: new_ids, end: new_end, .. },
            ) if clip_ids == new_ids => {
                *end = *new_end;
            }
            _ => merged.push(seg),
        }
    }

    (merged, duration)
}

/// Resolve each active clip's matte source (explicit id or "layer above"),
/// rejecting self, mutual, and dangling references at this slice's draw
/// order. `sorted` is top-first (highest z-order first).
fn resolve_slice_mattes(sorted: &[&Clip]) -> HashMap<Uuid, Uuid> {
    let index_of: HashMap<Uuid, usize> =
        sorted.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

    let mut tentative: HashMap<Uuid, Uuid> = HashMap::new();
    for (idx, clip) in sorted.iter().enumerate() {
        if clip.matte.mode == crate::composition::MatteMode::None {
            continue;
        }
        let candidate = if clip.matte.use_layer_above {
            idx.checked_sub(1).map(|above| sorted[above].id)
        } else {
            clip.matte.source_clip_id.filter(|src| index_of.contains_key(src))
        };
        if let Some(src) = candidate {
            if src != clip.id {
                tentative.insert(clip.id, src);
            }
        }
    }

    let mutual: Vec<Uuid> = tentative
        .iter()
        .filter(|(id, src)| tentative.get(*src) == Some(id))
        .map(|(id, _)| *id)
        .collect();
    for id in mutual {
        tentative.remove(&id);
    }

    tentative
}

/// The composite-slice timeline: one slice per maximal interval of
/// constant draw-list-and-matte-map content, with adjacent equal-content
/// slices merged (opacity within 1e-3, end-time within half a frame).
pub fn build_slices(comp: &Composition, timebase: &FrameTimebase) -> Vec<CompositeSlice> {
    let points = boundary_points(comp);
    if points.len() < 2 {
        return Vec::new();
    }

    let stack_index: HashMap<Uuid, i32> =
        comp.tracks.iter().map(|t: &Track| (t.id, t.stack_index)).collect();

    let mut raw = Vec::new();
    for window in points.windows(2) {
        let (start, end) = (window[0], window[1]);
        let mid = (start + end) / 2.0;
        let mut active = active_at(&comp.clips, mid);
        active.sort_by(|a, b| {
            let za = stack_index.get(&a.track_id).copied().unwrap_or(0);
            let zb = stack_index.get(&b.track_id).copied().unwrap_or(0);
            zb.cmp(&za)
                .then(a.dst_start.partial_cmp(&b.dst_start).unwrap())
                .then(a.id.cmp(&b.id))
        });

        let mattes = resolve_slice_mattes(&active);
        let hidden: HashSet<Uuid> = mattes.values().copied().collect();

        let entries: Vec<SliceEntry> = active
            .iter()
            .filter(|c| !hidden.contains(&c.id))
            .map(|c| SliceEntry {
                clip_id: c.id,
                matte_source: mattes.get(&c.id).copied(),
                opacity: c.transform.opacity,
            })
            .collect();

        raw.push(CompositeSlice { start, end, entries });
    }

    let one_frame = 1.0 / timebase.fps().max(1e-6);
    let half_frame = one_frame / 2.0;

    let mut merged: Vec<CompositeSlice> = Vec::with_capacity(raw.len());
    for slice in raw {
        if let Some(last) = merged.last_mut() {
            if last.mergeable_with(&slice, half_frame) {
                last.end = slice.end;
                continue;
            }
        }
        merged.push(slice);
    }
    merged
}

/// Derive the full playback graph for one composition version.
pub fn build_graph(comp: &Composition, version: u64, timebase: &FrameTimebase) -> PlaybackGraph {
    let (segments, duration) = build_global_segments(comp);
    let slices = build_slices(comp, timebase);
    trace_mapper!(
        version,
        segments = segments.len(),
        slices = slices.len(),
        duration,
        "rebuilt playback graph"
    );
    PlaybackGraph { version, segments, duration, slices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{
        AssetRef, MatteBinding, MatteMode, SourceRange, Track, TrackKind, Transform2D,
    };

    fn track(id: u128, stack_index: i32) -> Track {
        Track {
            id: Uuid::from_u128(id),
            stack_index,
            kind: TrackKind::Video,
            name: "t".into(),
            muted: false,
            solo: false,
            locked: false,
        }
    }

    fn clip(id: u128, track_id: u128, dst_start: f64, duration: f64) -> Clip {
        Clip {
            id: Uuid::from_u128(id),
            asset: AssetRef("a".into()),
            src_range: SourceRange { start: 0.0, duration },
            dst_start,
            speed: 1.0,
            transform: Transform2D::default(),
            track_id: Uuid::from_u128(track_id),
            matte: MatteBinding::default(),
        }
    }

    fn tb() -> FrameTimebase {
        FrameTimebase::from_fps(24.0)
    }

    #[test]
    fn gap_traversal_segments() {
        let comp = Composition {
            tracks: vec![track(1, 0)],
            clips: vec![clip(1, 1, 0.0, 1.0), clip(2, 1, 2.0, 1.0)],
            fps_num: 24,
            fps_den: 1,
            ..Default::default()
        };
        let (segs, duration) = build_global_segments(&comp);
        assert_eq!(
            segs,
            vec![
                TimelineSegment::Clip { clip_ids: vec![Uuid::from_u128(1)], start: 0.0, end: 1.0 },
                TimelineSegment::Gap { start: 1.0, end: 2.0 },
                TimelineSegment::Clip { clip_ids: vec![Uuid::from_u128(2)], start: 2.0, end: 3.0 },
            ]
        );
        assert!((duration - 3.0).abs() < 1e-9);
    }

    #[test]
    fn overlapping_tracks_merge_into_one_clip_segment() {
        let comp = Composition {
            tracks: vec![track(1, 0), track(2, 1)],
            clips: vec![clip(1, 1, 0.0, 2.0), clip(2, 2, 1.0, 2.0)],
            fps_num: 24,
            fps_den: 1,
            ..Default::default()
        };
        let (segs, _) = build_global_segments(&comp);
        // [0,1) clip1 only, [1,2) both, [2,3) clip2 only.
        assert_eq!(segs.len(), 3);
        match &segs[1] {
            TimelineSegment::Clip { clip_ids, .. } => {
                assert_eq!(clip_ids, &vec![Uuid::from_u128(1), Uuid::from_u128(2)])
            }
            _ => panic!("expected clip segment"),
        }
    }

    #[test]
    fn slice_z_order_by_track_stack_index() {
        let comp = Composition {
            tracks: vec![track(1, 0), track(2, 5)],
            clips: vec![clip(1, 1, 0.0, 2.0), clip(2, 2, 0.0, 2.0)],
            fps_num: 24,
            fps_den: 1,
            ..Default::default()
        };
        let slices = build_slices(&comp, &tb());
        assert_eq!(slices.len(), 1);
        // track 2 has the higher stack_index, so its clip draws first (top).
        assert_eq!(slices[0].entries[0].clip_id, Uuid::from_u128(2));
        assert_eq!(slices[0].entries[1].clip_id, Uuid::from_u128(1));
    }

    #[test]
    fn explicit_matte_hides_source_and_records_binding() {
        let mut top = clip(2, 2, 0.0, 2.0);
        top.matte = MatteBinding {
            mode: MatteMode::Alpha,
            source_clip_id: Some(Uuid::from_u128(1)),
            use_layer_above: false,
        };
        let comp = Composition {
            tracks: vec![track(1, 0), track(2, 5)],
            clips: vec![clip(1, 1, 0.0, 2.0), top],
            fps_num: 24,
            fps_den: 1,
            ..Default::default()
        };
        let slices = build_slices(&comp, &tb());
        assert_eq!(slices[0].entries.len(), 1);
        assert_eq!(slices[0].entries[0].clip_id, Uuid::from_u128(2));
        assert_eq!(slices[0].entries[0].matte_source, Some(Uuid::from_u128(1)));
    }

    #[test]
    fn layer_above_resolves_to_next_higher_clip() {
        let mut middle = clip(2, 2, 0.0, 2.0);
        middle.matte = MatteBinding {
            mode: MatteMode::Luma,
            source_clip_id: None,
            use_layer_above: true,
        };
        let comp = Composition {
            tracks: vec![track(1, 0), track(2, 5), track(3, 10)],
            clips: vec![clip(1, 1, 0.0, 2.0), middle, clip(3, 3, 0.0, 2.0)],
            fps_num: 24,
            fps_den: 1,
            ..Default::default()
        };
        let slices = build_slices(&comp, &tb());
        // top-first order: clip3 (stack 10), clip2 (stack 5), clip1 (stack 0).
        // clip2's "layer above" is clip3, which gets hidden.
        let ids: Vec<Uuid> = slices[0].entries.iter().map(|e| e.clip_id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(2), Uuid::from_u128(1)]);
        assert_eq!(slices[0].entries[0].matte_source, Some(Uuid::from_u128(3)));
    }

    #[test]
    fn mutual_layer_above_matte_is_rejected_at_slice_level() {
        // Two clips on adjacent stack positions each claiming "layer above" —
        // composition-level sanitize never sees this (it only inspects
        // explicit source_clip_id), so the mapper must reject it itself.
        let mut lower = clip(1, 1, 0.0, 2.0);
        lower.matte = MatteBinding { mode: MatteMode::Alpha, source_clip_id: None, use_layer_above: true };
        let mut upper = clip(2, 2, 0.0, 2.0);
        upper.matte = MatteBinding { mode: MatteMode::Alpha, source_clip_id: None, use_layer_above: true };
        let comp = Composition {
            tracks: vec![track(1, 0), track(2, 5)],
            clips: vec![lower, upper],
            fps_num: 24,
            fps_den: 1,
            ..Default::default()
        };
        let slices = build_slices(&comp, &tb());
        assert_eq!(slices[0].entries.len(), 2);
        assert!(slices[0].entries.iter().all(|e| e.matte_source.is_none()));
    }

    #[test]
    fn mapper_is_deterministic() {
        let comp = Composition {
            tracks: vec![track(1, 0), track(2, 5)],
            clips: vec![clip(1, 1, 0.0, 2.0), clip(2, 2, 1.0, 3.0)],
            fps_num: 24,
            fps_den: 1,
            ..Default::default()
        };
        let a = build_graph(&comp, 1, &tb());
        let b = build_graph(&comp, 1, &tb());
        assert_eq!(a.segments, b.segments);
        assert_eq!(a.slices, b.slices);
    }

    #[test]
    fn adjacent_equal_slices_merge() {
        // clip1 and clip2 both span the whole range on stacked tracks with
        // no mattes: every boundary sample yields the same draw list, so
        // the whole range collapses to one slice even though clip1 and
        // clip2 don't share identical dst ranges.
        let comp = Composition {
            tracks: vec![track(1, 0), track(2, 5)],
            clips: vec![clip(1, 1, 0.0, 4.0), clip(2, 2, 0.0, 4.0)],
            fps_num: 24,
            fps_den: 1,
            ..Default::default()
        };
        let slices = build_slices(&comp, &tb());
        assert_eq!(slices.len(), 1);
        assert!((slices[0].start - 0.0).abs() < 1e-9);
        assert!((slices[0].end - 4.0).abs() < 1e-9);
    }
}
