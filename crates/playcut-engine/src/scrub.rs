// crates/playcut-engine/src/scrub.rs
//
// ScrubCoordinator: admission control and coalescing for scrub-driven
// decode jobs. Velocity-classified, epoch-stamped, GOP-coalesced
// admission control — pure bookkeeping, it never touches a decoder or a
// cache; the transport submits the jobs it decides to admit.

use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use playcut_core::{trace_decode, FrameTimebase};

use crate::tuning::Tuning;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VelocityClass {
    Slow,
    Medium,
    Fast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrubPhase {
    Idle,
    Active(VelocityClass),
    AwaitingDeadline,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct GopKey(u64);

impl GopKey {
    fn new(t: f64) -> Self {
        GopKey(t.to_bits())
    }
}

struct InFlightEntry {
    /// `None` for deadline decodes, which always cancel-and-replace rather
    /// than coalesce by GOP key.
    gop_key: Option<GopKey>,
    epoch: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Start { epoch: u64 },
    /// An in-flight job for the same clip and GOP key had its target
    /// updated in place; no new decode starts.
    Retarget { epoch: u64 },
    /// A different GOP key was in flight; the caller must cancel
    /// `cancel_epoch` before the newly-admitted `epoch` proceeds.
    Superseded { cancel_epoch: u64, epoch: u64 },
    /// Global in-flight budget exhausted.
    Dropped,
}

/// One admitted job's parameters, returned by `update_scrub` once the
/// gate interval has elapsed for a coalesced target.
#[derive(Clone, Copy, Debug)]
pub struct ScrubTarget {
    pub time: f64,
    pub direction: Direction,
    pub velocity_fps: f64,
}

pub struct ScrubCoordinator {
    phase: ScrubPhase,
    direction: Direction,
    velocity_fps: f64,
    history: VecDeque<(f64, f64)>,
    visible_clips: HashSet<Uuid>,
    anchor: f64,

    in_flight: HashMap<Uuid, InFlightEntry>,
    global_in_flight: u32,
    next_epoch: u64,
    critical_used: bool,

    pending_target: Option<f64>,
    last_emit_wall: Option<f64>,

    global_cap: u32,
    critical_bonus: u32,
    gate_slow_secs: f64,
    gate_medium_secs: f64,
    gate_fast_secs: f64,
    velocity_slow_fps: f64,
    velocity_medium_fps: f64,
    lookahead_alpha: f64,
}

const HISTORY_LEN: usize = 8;

impl ScrubCoordinator {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            phase: ScrubPhase::Idle,
            direction: Direction::Idle,
            velocity_fps: 0.0,
            history: VecDeque::with_capacity(HISTORY_LEN),
            visible_clips: HashSet::new(),
            anchor: 0.0,
            in_flight: HashMap::new(),
            global_in_flight: 0,
            next_epoch: 0,
            critical_used: false,
            pending_target: None,
            last_emit_wall: None,
            global_cap: tuning.global_in_flight_cap,
            critical_bonus: tuning.critical_in_flight_bonus,
            gate_slow_secs: tuning.scrub_gate_slow_ms / 1000.0,
            gate_medium_secs: tuning.scrub_gate_medium_ms / 1000.0,
            gate_fast_secs: tuning.scrub_gate_fast_ms / 1000.0,
            velocity_slow_fps: tuning.scrub_velocity_slow_fps,
            velocity_medium_fps: tuning.scrub_velocity_medium_fps,
            lookahead_alpha: tuning.scrub_lookahead_alpha,
        }
    }

    pub fn phase(&self) -> ScrubPhase {
        self.phase
    }

    pub fn velocity_fps(&self) -> f64 {
        self.velocity_fps
    }

    pub fn begin_scrub(&mut self, clips: HashSet<Uuid>, anchor: f64, wall: f64) {
        self.phase = ScrubPhase::Active(VelocityClass::Slow);
        self.direction = Direction::Idle;
        self.velocity_fps = 0.0;
        self.history.clear();
        self.history.push_back((anchor, wall));
        self.visible_clips = clips;
        self.anchor = anchor;
        self.critical_used = false;
        self.pending_target = None;
        self.last_emit_wall = None;
    }

    /// Classifies velocity from a short history of (time, wall) samples,
    /// gates emission by the state-dependent interval, and biases the
    /// emitted target forward/backward by `lookahead_alpha * v * dt`.
    /// Returns `None` while the request is coalesced into the pending
    /// target inside the current gate window.
    pub fn update_scrub(&mut self, t_now: f64, wall: f64, timebase: &FrameTimebase) -> Option<ScrubTarget> {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back((t_now, wall));
        self.anchor = t_now;
        self.pending_target = Some(t_now);

        let (velocity_fps, direction) = self.estimate_velocity(timebase.fps());
        self.velocity_fps = velocity_fps;
        self.direction = direction;
        let class = classify(velocity_fps.abs(), self.velocity_slow_fps, self.velocity_medium_fps);
        self.phase = ScrubPhase::Active(class);

        let gate = self.gate_secs(class);
        let due = match self.last_emit_wall {
            None => true,
            Some(last) => wall - last >= gate,
        };
        if !due {
            return None;
        }
        self.last_emit_wall = Some(wall);
        let target = self.pending_target.take()?;

        let biased = match direction {
            Direction::Forward => target + self.lookahead_alpha * velocity_fps.abs() / timebase.fps().max(1.0),
            Direction::Reverse => target - self.lookahead_alpha * velocity_fps.abs() / timebase.fps().max(1.0),
            Direction::Idle => target,
        };

        Some(ScrubTarget { time: biased, direction, velocity_fps })
    }

    fn estimate_velocity(&self, fps: f64) -> (f64, Direction) {
        let (Some(&(t0, w0)), Some(&(t1, w1))) = (self.history.front(), self.history.back()) else {
            return (0.0, Direction::Idle);
        };
        if w1 <= w0 {
            return (0.0, Direction::Idle);
        }
        let v_secs_per_sec = (t1 - t0) / (w1 - w0);
        let v_fps = v_secs_per_sec * fps;
        let direction = if v_fps.abs() < 1e-9 {
            Direction::Idle
        } else if v_fps > 0.0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        (v_fps, direction)
    }

    fn gate_secs(&self, class: VelocityClass) -> f64 {
        match class {
            VelocityClass::Slow => self.gate_slow_secs,
            VelocityClass::Medium => self.gate_medium_secs,
            VelocityClass::Fast => self.gate_fast_secs,
        }
    }

    /// GOP-keyed admission for one clip's scrub decode. `gop_key` is the
    /// caller-resolved nearest-IDR-at-or-before-target source time.
    pub fn admit_decode(&mut self, clip_id: Uuid, gop_key: f64, critical: bool) -> Admission {
        let key = GopKey::new(gop_key);
        if let Some(entry) = self.in_flight.get_mut(&clip_id) {
            if entry.gop_key == Some(key) {
                return Admission::Retarget { epoch: entry.epoch };
            }
            let cancel_epoch = entry.epoch;
            let epoch = self.bump_epoch();
            self.in_flight.insert(clip_id, InFlightEntry { gop_key: Some(key), epoch });
            return Admission::Superseded { cancel_epoch, epoch };
        }

        if !self.reserve_global_slot(critical) {
            trace_decode!(clip = %clip_id, global_in_flight = self.global_in_flight, "scrub admission dropped");
            return Admission::Dropped;
        }
        let epoch = self.bump_epoch();
        self.in_flight.insert(clip_id, InFlightEntry { gop_key: Some(key), epoch });
        Admission::Start { epoch }
    }

    /// The final, ungated, highest-priority decode issued on scrub end.
    /// Always cancels whatever was in flight for this clip.
    pub fn admit_deadline(&mut self, clip_id: Uuid) -> Admission {
        self.phase = ScrubPhase::AwaitingDeadline;
        if let Some(entry) = self.in_flight.remove(&clip_id) {
            let epoch = self.bump_epoch();
            self.in_flight.insert(clip_id, InFlightEntry { gop_key: None, epoch });
            return Admission::Superseded { cancel_epoch: entry.epoch, epoch };
        }
        if !self.reserve_global_slot(true) {
            return Admission::Dropped;
        }
        let epoch = self.bump_epoch();
        self.in_flight.insert(clip_id, InFlightEntry { gop_key: None, epoch });
        Admission::Start { epoch }
    }

    fn reserve_global_slot(&mut self, critical: bool) -> bool {
        if self.global_in_flight < self.global_cap {
            self.global_in_flight += 1;
            return true;
        }
        let padded_cap = self.global_cap + self.critical_bonus;
        if !critical || !self.critical_available() || self.global_in_flight >= padded_cap {
            return false;
        }
        self.critical_used = true;
        self.global_in_flight += 1;
        true
    }

    fn critical_available(&self) -> bool {
        !self.critical_used
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// True if `epoch` is no longer the current epoch for `clip_id` — the
    /// job should be dropped at this checkpoint without touching the cache.
    pub fn is_stale(&self, clip_id: Uuid, epoch: u64) -> bool {
        self.in_flight.get(&clip_id).map(|e| e.epoch) != Some(epoch)
    }

    /// Called when a job for `clip_id` completes or is cancelled, whether
    /// or not it was the one still current (a superseded job releases its
    /// own slot when it finishes, not when superseded).
    pub fn release(&mut self, clip_id: Uuid, epoch: u64) {
        if self.in_flight.get(&clip_id).map(|e| e.epoch) == Some(epoch) {
            self.in_flight.remove(&clip_id);
        }
        self.global_in_flight = self.global_in_flight.saturating_sub(1);
    }

    /// Drop bookkeeping for clips no longer in the active set; returns the
    /// clip ids whose in-flight jobs the caller must now cancel.
    pub fn retain_visible(&mut self, visible: &HashSet<Uuid>) -> Vec<Uuid> {
        let stale: Vec<Uuid> = self.in_flight.keys().filter(|id| !visible.contains(id)).copied().collect();
        for id in &stale {
            self.in_flight.remove(id);
            self.global_in_flight = self.global_in_flight.saturating_sub(1);
        }
        self.visible_clips = visible.clone();
        stale
    }

    pub fn end_scrub(&mut self) {
        self.phase = ScrubPhase::AwaitingDeadline;
    }

    pub fn settle(&mut self) {
        self.phase = ScrubPhase::Idle;
        self.direction = Direction::Idle;
        self.velocity_fps = 0.0;
    }
}

fn classify(v_abs_fps: f64, slow_threshold: f64, medium_threshold: f64) -> VelocityClass {
    if v_abs_fps <= slow_threshold {
        VelocityClass::Slow
    } else if v_abs_fps <= medium_threshold {
        VelocityClass::Medium
    } else {
        VelocityClass::Fast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tb() -> FrameTimebase {
        FrameTimebase::from_fps(24.0)
    }

    #[test]
    fn velocity_classification_thresholds() {
        assert_eq!(classify(0.1, 0.5, 3.0), VelocityClass::Slow);
        assert_eq!(classify(0.5, 0.5, 3.0), VelocityClass::Slow);
        assert_eq!(classify(1.0, 0.5, 3.0), VelocityClass::Medium);
        assert_eq!(classify(3.0, 0.5, 3.0), VelocityClass::Medium);
        assert_eq!(classify(3.1, 0.5, 3.0), VelocityClass::Fast);
    }

    #[test]
    fn rapid_scrub_seeks_are_coalesced_until_gate_elapses() {
        let tuning = Tuning::default();
        let mut coord = ScrubCoordinator::new(&tuning);
        coord.begin_scrub(HashSet::new(), 5.0, 0.0);

        // Fast velocity (big jumps within a few ms) gates at ~30ms.
        let a = coord.update_scrub(5.0, 0.0, &tb());
        assert!(a.is_some(), "first sample always emits (no prior gate)");

        let b = coord.update_scrub(4.9, 0.01, &tb());
        assert!(b.is_none(), "10ms after an emit is still inside the fast gate");

        let c = coord.update_scrub(4.8, 0.02, &tb());
        assert!(c.is_none(), "20ms after an emit is still inside the fast gate");

        let d = coord.update_scrub(4.8, 0.05, &tb());
        assert!(d.is_some(), "50ms after the last emit clears the fast gate");
        assert!((d.unwrap().time - 4.8).abs() < 0.05);
    }

    #[test]
    fn shared_gop_key_retargets_instead_of_cancelling() {
        let tuning = Tuning::default();
        let mut coord = ScrubCoordinator::new(&tuning);
        let clip = Uuid::from_u128(1);
        let first = coord.admit_decode(clip, 10.0, false);
        assert!(matches!(first, Admission::Start { .. }));
        let second = coord.admit_decode(clip, 10.0, false);
        assert!(matches!(second, Admission::Retarget { .. }));
    }

    #[test]
    fn different_gop_key_supersedes() {
        let tuning = Tuning::default();
        let mut coord = ScrubCoordinator::new(&tuning);
        let clip = Uuid::from_u128(1);
        let first = coord.admit_decode(clip, 10.0, false);
        let Admission::Start { epoch: first_epoch } = first else { panic!() };
        let second = coord.admit_decode(clip, 20.0, false);
        match second {
            Admission::Superseded { cancel_epoch, epoch } => {
                assert_eq!(cancel_epoch, first_epoch);
                assert_ne!(epoch, first_epoch);
            }
            _ => panic!("expected Superseded"),
        }
    }

    #[test]
    fn global_cap_drops_once_exhausted_without_critical() {
        let mut tuning = Tuning::default();
        tuning.global_in_flight_cap = 1;
        tuning.critical_in_flight_bonus = 2;
        let mut coord = ScrubCoordinator::new(&tuning);
        let a = coord.admit_decode(Uuid::from_u128(1), 1.0, false);
        assert!(matches!(a, Admission::Start { .. }));
        let b = coord.admit_decode(Uuid::from_u128(2), 1.0, false);
        assert!(matches!(b, Admission::Dropped));
        let c = coord.admit_decode(Uuid::from_u128(2), 1.0, true);
        assert!(matches!(c, Admission::Start { .. }), "critical bonus admits past the base cap");
    }

    #[test]
    fn critical_budget_is_not_spent_unless_actually_needed() {
        let mut tuning = Tuning::default();
        tuning.global_in_flight_cap = 1;
        tuning.critical_in_flight_bonus = 1;
        let mut coord = ScrubCoordinator::new(&tuning);
        coord.begin_scrub(HashSet::new(), 0.0, 0.0);
        // Fits under the base cap; marking it critical must not burn the
        // gesture's one-time bonus since the base cap alone was enough.
        let a = coord.admit_decode(Uuid::from_u128(1), 1.0, true);
        assert!(matches!(a, Admission::Start { .. }));
        // Base cap (1) is now used by clip 1; this admission needs the
        // bonus, which is still available because clip 1 never spent it.
        let b = coord.admit_decode(Uuid::from_u128(2), 2.0, true);
        assert!(matches!(b, Admission::Start { .. }), "bonus available for the clip that actually needs it");
        // Bonus is spent now; a third clip past cap+bonus is dropped.
        let c = coord.admit_decode(Uuid::from_u128(3), 3.0, true);
        assert!(matches!(c, Admission::Dropped));
    }

    #[test]
    fn critical_budget_is_used_once_per_gesture() {
        let mut tuning = Tuning::default();
        tuning.global_in_flight_cap = 1;
        tuning.critical_in_flight_bonus = 1;
        let mut coord = ScrubCoordinator::new(&tuning);
        coord.begin_scrub(HashSet::new(), 0.0, 0.0);
        let Admission::Start { epoch: e1 } = coord.admit_decode(Uuid::from_u128(1), 1.0, true) else { panic!() };
        let Admission::Start { epoch: e2 } = coord.admit_decode(Uuid::from_u128(2), 2.0, true) else {
            panic!("bonus should still be available for clip 2")
        };
        // cap (1) + bonus (1) are both spent; a third clip is dropped.
        let c = coord.admit_decode(Uuid::from_u128(3), 3.0, true);
        assert!(matches!(c, Admission::Dropped));

        coord.release(Uuid::from_u128(1), e1);
        coord.release(Uuid::from_u128(2), e2);
        coord.begin_scrub(HashSet::new(), 0.0, 0.0);
        let d = coord.admit_decode(Uuid::from_u128(3), 3.0, true);
        assert!(matches!(d, Admission::Start { .. }));
        let e = coord.admit_decode(Uuid::from_u128(4), 4.0, true);
        assert!(matches!(e, Admission::Start { .. }), "a fresh gesture resets the used flag");
    }

    #[test]
    fn stale_epoch_is_detected_after_supersede() {
        let tuning = Tuning::default();
        let mut coord = ScrubCoordinator::new(&tuning);
        let clip = Uuid::from_u128(1);
        let Admission::Start { epoch: old } = coord.admit_decode(clip, 10.0, false) else { panic!() };
        assert!(!coord.is_stale(clip, old));
        let Admission::Superseded { epoch: new, .. } = coord.admit_decode(clip, 20.0, false) else { panic!() };
        assert!(coord.is_stale(clip, old));
        assert!(!coord.is_stale(clip, new));
    }
}
