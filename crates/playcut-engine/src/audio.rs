// crates/playcut-engine/src/audio.rs
//
// AudioMixer: the engine-side interface boundary to an audio backend.
// `RodioAudioMixer` owns a `HashMap<ClipId, rodio::Sink>` plus an
// `exhausted` set so a track shorter than its clip doesn't rebuild its
// sink every frame, multiple simultaneous segments, an explicit ~20ms
// reschedule tolerance rather than always reseeking, and rate control via
// `Sink::set_speed`.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use rodio::{Decoder, OutputStream, Sink};
use uuid::Uuid;

use crate::clock::ClockState;

/// One clip's audio contribution to the current composite frame, as
/// resolved by the caller (the transport, from the active composite
/// slice) — deliberately decoupled from `playcut_core::Clip` since a
/// muted/video-only clip never reaches the mixer at all.
#[derive(Clone, Debug)]
pub struct ActiveAudioSegment {
    pub clip_id: Uuid,
    pub path: PathBuf,
    pub clip_start: f64,
    pub source_offset: f64,
}

pub trait AudioMixer {
    fn reset(&mut self);
    fn set_muted(&mut self, muted: bool);
    fn pause_all(&mut self);
    fn stop_all(&mut self);
    fn seek(&mut self, t: f64);
    fn update_clock_state(&mut self, snapshot: ClockState);
    fn activate(&mut self, segments: &[ActiveAudioSegment], timeline_time: f64, rate: f64, is_playing: bool);
}

/// Tolerance below which a repeated `activate` for the same clip is a
/// no-op rather than a reseek.
const RESCHEDULE_TOLERANCE_SECS: f64 = 0.020;

fn needs_reseek(last_source_time: Option<f64>, new_source_time: f64, tolerance: f64) -> bool {
    match last_source_time {
        None => true,
        Some(last) => (new_source_time - last).abs() > tolerance,
    }
}

pub struct RodioAudioMixer {
    /// Kept alive for the device thread to run; never read directly once
    /// open. `None` in headless environments with no audio device.
    _stream: Option<OutputStream>,
    sinks: HashMap<Uuid, Sink>,
    exhausted: HashSet<Uuid>,
    last_source_time: HashMap<Uuid, f64>,
    muted: bool,
    volume: f32,
}

impl RodioAudioMixer {
    pub fn new() -> Self {
        let stream = OutputStream::try_default().map(|(stream, _handle)| stream).ok();
        Self { _stream: stream, sinks: HashMap::new(), exhausted: HashSet::new(), last_source_time: HashMap::new(), muted: false, volume: 1.0 }
    }

    fn applied_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    fn drop_clip(&mut self, clip_id: Uuid) {
        self.sinks.remove(&clip_id);
        self.exhausted.remove(&clip_id);
        self.last_source_time.remove(&clip_id);
    }
}

impl Default for RodioAudioMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMixer for RodioAudioMixer {
    fn reset(&mut self) {
        self.sinks.clear();
        self.exhausted.clear();
        self.last_source_time.clear();
        self.muted = false;
        self.volume = 1.0;
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        let volume = self.applied_volume();
        for sink in self.sinks.values() {
            sink.set_volume(volume);
        }
    }

    fn pause_all(&mut self) {
        for sink in self.sinks.values() {
            sink.pause();
        }
    }

    fn stop_all(&mut self) {
        self.sinks.clear();
        self.exhausted.clear();
        self.last_source_time.clear();
    }

    fn seek(&mut self, _t: f64) {
        // A seek invalidates whatever source-time offsets every sink was
        // scheduled against; the next `activate` rebuilds from scratch.
        self.stop_all();
    }

    fn update_clock_state(&mut self, _snapshot: ClockState) {
        // No drift-correction loop yet: sinks are rescheduled wholesale by
        // `activate` rather than nudged sample-by-sample. The snapshot
        // exists in the trait so a future mixer can reference host time
        // the same way the video path's `PlaybackClock::ingest` does.
    }

    fn activate(&mut self, segments: &[ActiveAudioSegment], timeline_time: f64, rate: f64, is_playing: bool) {
        if !is_playing {
            self.pause_all();
            return;
        }

        let active_ids: HashSet<Uuid> = segments.iter().map(|s| s.clip_id).collect();
        let stale: Vec<Uuid> = self.sinks.keys().filter(|id| !active_ids.contains(id)).copied().collect();
        for id in stale {
            self.drop_clip(id);
        }

        let Some(stream) = &self._stream else { return };

        for segment in segments {
            if self.exhausted.contains(&segment.clip_id) {
                continue;
            }
            let source_time = (timeline_time - segment.clip_start + segment.source_offset).max(0.0);

            if let Some(sink) = self.sinks.get(&segment.clip_id) {
                if sink.empty() {
                    self.exhausted.insert(segment.clip_id);
                    continue;
                }
                if needs_reseek(self.last_source_time.get(&segment.clip_id).copied(), source_time, RESCHEDULE_TOLERANCE_SECS) {
                    let _ = sink.try_seek(Duration::from_secs_f64(source_time));
                    self.last_source_time.insert(segment.clip_id, source_time);
                }
                sink.set_speed(rate as f32);
                sink.set_volume(self.applied_volume());
                continue;
            }

            let Ok(file) = File::open(&segment.path) else { continue };
            let Ok(decoder) = Decoder::new(BufReader::new(file)) else { continue };
            let sink = Sink::connect_new(&stream.mixer());
            sink.append(decoder);
            let _ = sink.try_seek(Duration::from_secs_f64(source_time));
            sink.set_speed(rate as f32);
            sink.set_volume(self.applied_volume());
            sink.play();
            self.sinks.insert(segment.clip_id, sink);
            self.last_source_time.insert(segment.clip_id, source_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_activate_always_reseeks() {
        assert!(needs_reseek(None, 1.0, RESCHEDULE_TOLERANCE_SECS));
    }

    #[test]
    fn small_delta_is_idempotent() {
        assert!(!needs_reseek(Some(1.000), 1.010, RESCHEDULE_TOLERANCE_SECS));
    }

    #[test]
    fn delta_past_tolerance_reschedules() {
        assert!(needs_reseek(Some(1.000), 1.025, RESCHEDULE_TOLERANCE_SECS));
    }

    #[test]
    fn boundary_is_exclusive() {
        assert!(!needs_reseek(Some(1.000), 1.020, RESCHEDULE_TOLERANCE_SECS));
    }
}
