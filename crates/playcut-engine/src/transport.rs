// crates/playcut-engine/src/transport.rs
//
// TransportController: the single-writer state machine that owns the
// PlaybackGraph, the cursor, and the frame-selection contract queried by
// the renderer. A driver-agnostic state machine with explicit
// paused/playing/scrubbing states, versioned cache inserts, and an
// anti-flicker frame-selection gate.

use std::collections::HashMap;

use uuid::Uuid;

use playcut_core::{trace_transport, DecodedFrame, FrameTimebase, PlaybackGraph, TimelineSegment};
use playcut_media::{Bias, FrameCache};

use crate::clock::PlaybackClock;
use crate::scrub::ScrubTarget;
use crate::ticker::TimelineTicker;
use crate::tuning::Tuning;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Paused,
    Playing,
    Scrubbing,
}

#[derive(Clone, Copy, Debug)]
pub struct Cursor {
    pub segment_index: usize,
}

/// Where a just-decoded frame's result should land, decided by how stale
/// its `scrub_version` stamp is against the controller's current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertTarget {
    Primary,
    Secondary,
    Discard,
}

/// What the ticker's tick produced, for the caller to act on (issue a
/// warmup decode, advance a gap timer display, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickEvent {
    Advanced,
    CrossedIntoGap,
    CrossedIntoClip,
    ApproachingClipBoundary,
    ReachedEnd,
}

struct Displayed {
    frame: DecodedFrame,
    selected_at_host: f64,
}

pub struct TransportController {
    state: TransportState,
    clock: PlaybackClock,
    graph: PlaybackGraph,
    cursor: Cursor,
    scrub_version: u64,
    tuning: Tuning,
    ticker: TimelineTicker,
    displayed: HashMap<Uuid, Displayed>,
    warmup_done_for_segment: Option<usize>,
    resume_after_scrub: bool,
    pre_scrub_rate: f64,
    resume_after_drag: bool,
    pre_drag_rate: f64,
}

impl TransportController {
    pub fn new(tuning: Tuning, fps_hint: f64, host_time: f64) -> Self {
        let hz = tuning.ticker_hz.max(fps_hint);
        Self {
            state: TransportState::Paused,
            clock: PlaybackClock::new(0.0, host_time),
            graph: PlaybackGraph::empty(0),
            cursor: Cursor { segment_index: 0 },
            scrub_version: 0,
            tuning,
            ticker: TimelineTicker::new(hz),
            displayed: HashMap::new(),
            warmup_done_for_segment: None,
            resume_after_scrub: false,
            pre_scrub_rate: 0.0,
            resume_after_drag: false,
            pre_drag_rate: 0.0,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn scrub_version(&self) -> u64 {
        self.scrub_version
    }

    pub fn latched_time(&self, host_time: f64) -> f64 {
        self.clock.current_time(host_time)
    }

    pub fn latched_playback_rate(&self) -> f64 {
        self.clock.rate()
    }

    pub fn is_scrubbing(&self) -> bool {
        self.state == TransportState::Scrubbing
    }

    pub fn is_gap_active(&self) -> bool {
        matches!(self.segment(), Some(TimelineSegment::Gap { .. }))
    }

    /// A blocking drag gesture unrelated to scrubbing (e.g. a trim handle):
    /// pauses playback if it was running, without entering `Scrubbing`.
    pub fn pause_for_drag(&mut self, host_time: f64) {
        self.resume_after_drag = self.state == TransportState::Playing;
        if self.resume_after_drag {
            self.pre_drag_rate = self.clock.rate();
            self.request_pause(host_time);
        }
    }

    pub fn resume_after_drag(&mut self, host_time: f64) {
        if self.resume_after_drag {
            self.resume_after_drag = false;
            self.request_play(self.pre_drag_rate.max(1.0), host_time);
        }
    }

    /// A new composition version replaces the graph outright; any cursor
    /// position is re-resolved against the new segment list.
    pub fn apply_graph(&mut self, graph: PlaybackGraph, host_time: f64) {
        let t = self.clock.current_time(host_time);
        self.graph = graph;
        self.cursor.segment_index = self.segment_index_at(t);
        self.warmup_done_for_segment = None;
    }

    fn segment_index_at(&self, t: f64) -> usize {
        self.graph
            .segments
            .iter()
            .position(|s| s.contains(t))
            .unwrap_or_else(|| self.graph.segments.len().saturating_sub(1))
    }

    /// Only meaningful from paused or scrubbing; playing again while
    /// already playing just re-anchors the clock at the new rate.
    pub fn request_play(&mut self, rate: f64, host_time: f64) {
        let from = self.clock.current_time(host_time);
        trace_transport!(from, rate, "request_play");
        self.clock.play(from, rate, host_time);
        self.state = TransportState::Playing;
        self.cursor.segment_index = self.segment_index_at(from);
        self.warmup_done_for_segment = None;
        match self.graph.segments.get(self.cursor.segment_index) {
            Some(TimelineSegment::Gap { .. }) | None => self.ticker.start(host_time),
            Some(TimelineSegment::Clip { .. }) => self.ticker.start(host_time),
        }
    }

    pub fn request_pause(&mut self, host_time: f64) {
        let at = self.clock.current_time(host_time);
        trace_transport!(at, "request_pause");
        self.clock.pause(at, host_time);
        self.ticker.stop();
        self.state = TransportState::Paused;
    }

    /// Clamps `t` into the graph's duration and pauses there; the caller
    /// is responsible for the synchronous "decode to first render" that
    /// follows — this only moves the authoritative clock.
    pub fn request_time(&mut self, t: f64, host_time: f64) -> f64 {
        let clamped = t.clamp(0.0, self.graph.duration.max(0.0));
        trace_transport!(requested = t, clamped, "request_time");
        self.clock.seek(clamped, host_time);
        self.ticker.stop();
        self.state = TransportState::Paused;
        self.cursor.segment_index = self.segment_index_at(clamped);
        self.warmup_done_for_segment = None;
        clamped
    }

    pub fn begin_scrub(&mut self, host_time: f64) {
        self.pre_scrub_rate = self.clock.rate();
        self.resume_after_scrub = self.state == TransportState::Playing;
        self.ticker.stop();
        self.state = TransportState::Scrubbing;
    }

    /// Bumps the monotonic `scrubVersion` and freezes the clock at `t`.
    pub fn scrub_seek(&mut self, t: f64, host_time: f64) -> u64 {
        self.scrub_version += 1;
        let clamped = t.clamp(0.0, self.graph.duration.max(0.0));
        self.clock.seek(clamped, host_time);
        self.cursor.segment_index = self.segment_index_at(clamped);
        self.scrub_version
    }

    pub fn end_scrub(&mut self, resume_if_wanted: bool, host_time: f64) {
        if resume_if_wanted && self.resume_after_scrub {
            let from = self.clock.current_time(host_time);
            self.request_play(self.pre_scrub_rate.max(1.0), host_time);
            let _ = from;
        } else {
            self.request_pause(host_time);
        }
    }

    /// Drives the ticker; returns `None` when the ticker doesn't fire this
    /// call (rate 0, not running, or inside the min interval).
    pub fn tick(&mut self, host_time: f64) -> Option<TickEvent> {
        if self.state != TransportState::Playing {
            return None;
        }
        self.ticker.poll(host_time)?;
        let t = self.clock.current_time(host_time);
        let idx = self.cursor.segment_index;
        let Some(segment) = self.graph.segments.get(idx) else {
            return Some(TickEvent::ReachedEnd);
        };

        if t >= self.graph.duration {
            self.request_pause(host_time);
            return Some(TickEvent::ReachedEnd);
        }

        if !segment.contains(t) {
            let new_idx = self.segment_index_at(t);
            let crossed_into_gap = matches!(self.graph.segments.get(new_idx), Some(TimelineSegment::Gap { .. }));
            self.cursor.segment_index = new_idx;
            self.warmup_done_for_segment = None;
            trace_transport!(new_idx, crossed_into_gap, "segment advance");
            return Some(if crossed_into_gap { TickEvent::CrossedIntoGap } else { TickEvent::CrossedIntoClip });
        }

        if let Some(next) = self.graph.segments.get(idx + 1) {
            if matches!(next, TimelineSegment::Clip { .. })
                && segment.end() - t <= self.tuning.warmup_lead_secs
                && self.warmup_done_for_segment != Some(idx)
            {
                self.warmup_done_for_segment = Some(idx);
                return Some(TickEvent::ApproachingClipBoundary);
            }
        }

        Some(TickEvent::Advanced)
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn segment(&self) -> Option<&TimelineSegment> {
        self.graph.segments.get(self.cursor.segment_index)
    }

    /// Where a just-completed decode belongs, per the version-delta rule:
    /// 0 -> primary, 1-2 -> secondary/history only, >2 -> discarded.
    pub fn classify_insert(&self, result_scrub_version: u64) -> InsertTarget {
        let delta = self.scrub_version.saturating_sub(result_scrub_version);
        match delta {
            0 => InsertTarget::Primary,
            1 | 2 => InsertTarget::Secondary,
            _ => InsertTarget::Discard,
        }
    }

    fn lead_budget_secs(&self, timebase: &FrameTimebase) -> f64 {
        let frames = match self.state {
            TransportState::Playing => self.tuning.lead_budget_playing_frames,
            TransportState::Paused => self.tuning.lead_budget_paused_frames,
            TransportState::Scrubbing => self.tuning.lead_budget_scrubbing_frames,
        };
        frames / timebase.fps().max(1.0)
    }

    /// The synchronous frame-selection contract. `sample_time` is the
    /// current playhead for `clip_id`; `cache` holds that clip's decoded
    /// frames.
    pub fn select_frame(
        &mut self,
        clip_id: Uuid,
        sample_time: f64,
        cache: &FrameCache,
        timebase: &FrameTimebase,
        host_time: f64,
    ) -> Option<DecodedFrame> {
        let budget = self.lead_budget_secs(timebase);
        let bias = match self.state {
            TransportState::Scrubbing => Bias::Neutral,
            _ => Bias::Neutral,
        };

        let candidate = cache
            .get(sample_time, budget, bias)
            .filter(|f| !(f.presentation_time > sample_time && f.presentation_time - sample_time > budget))
            .cloned();

        let gated = matches!(self.state, TransportState::Paused | TransportState::Scrubbing);
        if gated {
            if let Some(candidate) = candidate {
                let swap = match self.displayed.get(&clip_id) {
                    None => true,
                    Some(current) => self.should_swap(current, &candidate, sample_time, host_time),
                };
                if swap {
                    self.displayed.insert(clip_id, Displayed { frame: candidate.clone(), selected_at_host: host_time });
                    return Some(candidate);
                }
                return self.displayed.get(&clip_id).map(|d| d.frame.clone());
            }
            return self.hold_or_history(clip_id, sample_time, cache, bias);
        }

        match candidate {
            Some(candidate) => {
                self.displayed.insert(clip_id, Displayed { frame: candidate.clone(), selected_at_host: host_time });
                Some(candidate)
            }
            None => self.hold_or_history(clip_id, sample_time, cache, bias),
        }
    }

    fn hold_or_history(&self, clip_id: Uuid, sample_time: f64, cache: &FrameCache, bias: Bias) -> Option<DecodedFrame> {
        if let Some(current) = self.displayed.get(&clip_id) {
            return Some(current.frame.clone());
        }
        cache.get(sample_time, f64::INFINITY, bias).cloned()
    }

    fn should_swap(&self, current: &Displayed, candidate: &DecodedFrame, sample_time: f64, host_time: f64) -> bool {
        let held_ms = (host_time - current.selected_at_host) * 1000.0;
        if held_ms < self.tuning.min_hold_ms {
            return false;
        }
        let current_dist = (current.frame.presentation_time - sample_time).abs();
        let candidate_dist = (candidate.presentation_time - sample_time).abs();
        let hyst = self.tuning.hyst_ms / 1000.0;
        if current_dist - candidate_dist >= hyst {
            return true;
        }
        let age_ms = (host_time - current.selected_at_host) * 1000.0;
        if age_ms > self.tuning.stale_relax_threshold_ms {
            let improvement_ms = (current_dist - candidate_dist) * 1000.0;
            if improvement_ms >= self.tuning.stale_relax_min_improvement_ms {
                return true;
            }
        }
        false
    }

    /// Drops future frames beyond the per-state lead budget for every
    /// clip's cache. Called on pause/seek transitions, never on every
    /// scrub event.
    pub fn prune_future(&self, caches: &mut HashMap<Uuid, FrameCache>, timebase: &FrameTimebase, host_time: f64) {
        let budget = self.lead_budget_secs(timebase);
        let t = self.clock.current_time(host_time);
        for cache in caches.values_mut() {
            cache.prune_after(t + budget);
        }
    }

    pub fn apply_scrub_target(&mut self, target: ScrubTarget, host_time: f64) {
        self.scrub_seek(target.time, host_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playcut_core::FrameOrigin;

    fn tb() -> FrameTimebase {
        FrameTimebase::from_fps(24.0)
    }

    fn frame(t: f64, origin: FrameOrigin, scrub_version: u64) -> DecodedFrame {
        DecodedFrame {
            clip_id: Uuid::nil(),
            pixels: vec![0u8; 4].into(),
            width: 1,
            height: 1,
            presentation_time: t,
            source_version: 0,
            origin,
            scrub_version,
        }
    }

    fn transport() -> TransportController {
        let mut tuning = Tuning::default();
        tuning.lead_budget_playing_frames = 6.0;
        tuning.lead_budget_paused_frames = 7.0;
        let mut t = TransportController::new(tuning, 24.0, 0.0);
        t.graph = PlaybackGraph {
            version: 1,
            segments: vec![TimelineSegment::Clip { clip_ids: vec![Uuid::nil()], start: 0.0, end: 10.0 }],
            duration: 10.0,
            slices: vec![],
        };
        t
    }

    #[test]
    fn future_frame_beyond_lead_budget_is_rejected_with_empty_history() {
        let mut transport = transport();
        transport.state = TransportState::Playing;
        let cache = FrameCache::new(10_000_000, 1000.0, 1.0, Default::default());
        let result = transport.select_frame(Uuid::nil(), 0.0, &cache, &tb(), 0.0);
        assert!(result.is_none(), "no candidate and no history means no frame at all");
    }

    #[test]
    fn rejected_candidate_falls_back_to_nearest_history_when_no_current_frame() {
        let mut transport = transport();
        transport.state = TransportState::Playing;
        let mut cache = FrameCache::new(10_000_000, 1000.0, 1.0, Default::default());
        // Budget at 24fps, 6 frames ~= 0.25s; this frame is 1s ahead and so
        // fails the lead-budget gate, but with no currently-displayed frame
        // the contract falls back to nearest-in-history over showing black.
        cache.record(frame(1.0, FrameOrigin::Playback, 0), 0.0, 0.0);
        let result = transport.select_frame(Uuid::nil(), 0.0, &cache, &tb(), 0.0);
        assert!(result.is_some());
    }

    #[test]
    fn anti_flicker_gate_holds_until_hysteresis_cleared() {
        let mut transport = transport();
        transport.state = TransportState::Paused;
        let mut cache = FrameCache::new(10_000_000, 1000.0, 1.0, Default::default());
        cache.record(frame(5.0, FrameOrigin::Playback, 0), 0.0, 5.0);
        let first = transport.select_frame(Uuid::nil(), 5.0, &cache, &tb(), 1.0).unwrap();
        assert!((first.presentation_time - 5.0).abs() < 1e-9);

        // A marginally closer frame arrives, but within the hysteresis
        // distance and before min-hold elapses: must not swap.
        cache.record(frame(5.001, FrameOrigin::Playback, 0), 0.0, 5.0);
        let held = transport.select_frame(Uuid::nil(), 5.001, &cache, &tb(), 1.001).unwrap();
        assert!((held.presentation_time - 5.0).abs() < 1e-9, "held past min-hold+hysteresis gate");
    }

    #[test]
    fn version_delta_classifies_primary_secondary_discard() {
        let mut transport = transport();
        transport.scrub_version = 5;
        assert_eq!(transport.classify_insert(5), InsertTarget::Primary);
        assert_eq!(transport.classify_insert(4), InsertTarget::Secondary);
        assert_eq!(transport.classify_insert(3), InsertTarget::Secondary);
        assert_eq!(transport.classify_insert(2), InsertTarget::Discard);
        assert_eq!(transport.classify_insert(0), InsertTarget::Discard);
    }

    #[test]
    fn gap_traversal_does_not_request_decodes() {
        let mut transport = transport();
        transport.graph = PlaybackGraph {
            version: 1,
            segments: vec![
                TimelineSegment::Clip { clip_ids: vec![Uuid::nil()], start: 0.0, end: 1.0 },
                TimelineSegment::Gap { start: 1.0, end: 2.0 },
                TimelineSegment::Clip { clip_ids: vec![Uuid::nil()], start: 2.0, end: 3.0 },
            ],
            duration: 3.0,
            slices: vec![],
        };
        transport.request_play(1.0, 0.0);
        transport.clock.seek(0.9, 0.0);
        transport.cursor.segment_index = 0;

        let event = transport.tick(0.9 + 1.0 / 24.0 + 1e-4);
        assert_eq!(event, Some(TickEvent::CrossedIntoGap));
        assert!(matches!(transport.segment(), Some(TimelineSegment::Gap { .. })));
    }

    #[test]
    fn reaching_end_of_timeline_pauses() {
        let mut transport = transport();
        transport.request_play(1.0, 0.0);
        transport.clock.seek(9.99, 0.0);
        let event = transport.tick(10.1);
        assert_eq!(event, Some(TickEvent::ReachedEnd));
        assert_eq!(transport.state(), TransportState::Paused);
    }

    #[test]
    fn request_time_clamps_into_duration_and_pauses() {
        let mut transport = transport();
        let clamped = transport.request_time(100.0, 0.0);
        assert!((clamped - 10.0).abs() < 1e-9);
        assert_eq!(transport.state(), TransportState::Paused);
    }

    #[test]
    fn pause_for_drag_pauses_and_resume_after_drag_restores_playback() {
        let mut transport = transport();
        transport.request_play(2.0, 0.0);
        assert_eq!(transport.state(), TransportState::Playing);

        transport.pause_for_drag(1.0);
        assert_eq!(transport.state(), TransportState::Paused);

        transport.resume_after_drag(1.5);
        assert_eq!(transport.state(), TransportState::Playing);
        assert!((transport.latched_playback_rate() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn pause_for_drag_while_already_paused_is_a_no_op_on_resume() {
        let mut transport = transport();
        assert_eq!(transport.state(), TransportState::Paused);
        transport.pause_for_drag(0.0);
        transport.resume_after_drag(0.5);
        assert_eq!(transport.state(), TransportState::Paused);
    }
}
