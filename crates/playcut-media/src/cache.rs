// crates/playcut-media/src/cache.rs
//
// Per-clip temporal frame ring: a scored, byte-budgeted, bias-aware
// eviction ring with no notion of bucket granularity or GPU textures,
// only presentation time and raw byte cost.

use std::collections::HashMap;

use playcut_core::{DecodedFrame, FrameOrigin};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bias {
    Neutral,
    Forward,
    Reverse,
}

/// Per-frame eviction-score weights. `priority`/`scrub` are *subtracted*
/// (higher value = less likely to be evicted); `age`/`bytes` are *added*
/// (higher value = more likely to be evicted).
#[derive(Clone, Copy, Debug)]
pub struct CacheWeights {
    pub age: f64,
    pub bytes: f64,
    pub priority: f64,
    pub scrub: f64,
}

impl Default for CacheWeights {
    fn default() -> Self {
        Self { age: 1.0, bytes: 1.0, priority: 2.0, scrub: 1.5 }
    }
}

struct Entry {
    frame: DecodedFrame,
    recorded_at: f64,
}

/// A bounded, time-indexed ring of recently-decoded frames for one clip.
pub struct FrameCache {
    entries: Vec<Entry>,
    byte_budget: usize,
    max_age_secs: f64,
    bias_window_secs: f64,
    weights: CacheWeights,
    bytes_in_use: usize,
    /// Presentation time of the most recently inserted frame. The cache
    /// itself has no concept of "what the renderer is currently showing"
    /// (that lives in the transport's primary slot) — this is a
    /// conservative stand-in so budget eviction never removes the frame
    /// most likely still on screen.
    newest: Option<f64>,
}

impl FrameCache {
    pub fn new(byte_budget: usize, max_age_secs: f64, bias_window_secs: f64, weights: CacheWeights) -> Self {
        Self {
            entries: Vec::new(),
            byte_budget,
            max_age_secs,
            bias_window_secs,
            weights,
            bytes_in_use: 0,
            newest: None,
        }
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a decoded frame at `now` (host-clock seconds, used only for
    /// age scoring) anchored around `anchor` (the scrub/playhead position
    /// defining the bias window), then enforce the byte budget.
    pub fn record(&mut self, frame: DecodedFrame, now: f64, anchor: f64) {
        let bytes = frame.byte_len();
        let time = frame.presentation_time;
        let idx = self
            .entries
            .binary_search_by(|e| e.frame.presentation_time.partial_cmp(&time).unwrap())
            .unwrap_or_else(|i| i);
        self.entries.insert(idx, Entry { frame, recorded_at: now });
        self.bytes_in_use += bytes;
        self.newest = Some(time);
        self.evict_over_budget(now, anchor);
    }

    fn evict_over_budget(&mut self, now: f64, anchor: f64) {
        // Unconditional max-age sweep first, skipping the protected slot.
        let max_age = self.max_age_secs;
        let protected = self.newest;
        self.entries.retain(|e| {
            let age = now - e.recorded_at;
            age <= max_age || Some(e.frame.presentation_time) == protected
        });
        self.recompute_bytes();

        while self.bytes_in_use > self.byte_budget {
            let Some(victim) = self.pick_eviction_victim(now, anchor, protected) else { break };
            let bytes = self.entries[victim].frame.byte_len();
            self.entries.remove(victim);
            self.bytes_in_use -= bytes;
        }
    }

    fn pick_eviction_victim(&self, now: f64, anchor: f64, protected: Option<f64>) -> Option<usize> {
        let half_window = self.bias_window_secs / 2.0;
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| Some(e.frame.presentation_time) != protected)
            .max_by(|(_, a), (_, b)| {
                self.score(a, now, anchor, half_window)
                    .partial_cmp(&self.score(b, now, anchor, half_window))
                    .unwrap()
            })
            .map(|(i, _)| i)
    }

    fn score(&self, e: &Entry, now: f64, anchor: f64, half_window: f64) -> f64 {
        let age = now - e.recorded_at;
        let bytes = e.frame.byte_len() as f64;
        let inside_bias_window = (e.frame.presentation_time - anchor).abs() <= half_window;
        let is_scrub = e.frame.origin == FrameOrigin::Scrub;
        self.weights.age * age + self.weights.bytes * bytes
            - self.weights.priority * if inside_bias_window { 1.0 } else { 0.0 }
            - self.weights.scrub * if is_scrub { 1.0 } else { 0.0 }
    }

    fn recompute_bytes(&mut self) {
        self.bytes_in_use = self.entries.iter().map(|e| e.frame.byte_len()).sum();
    }

    /// Nearest frame to `time` within `tolerance`, filtered by `bias`.
    pub fn get(&self, time: f64, tolerance: f64, bias: Bias) -> Option<&DecodedFrame> {
        self.entries
            .iter()
            .filter(|e| match bias {
                Bias::Neutral => true,
                Bias::Reverse => e.frame.presentation_time <= time + 1e-9,
                Bias::Forward => e.frame.presentation_time >= time - 1e-9,
            })
            .filter(|e| (e.frame.presentation_time - time).abs() <= tolerance)
            .min_by(|a, b| {
                (a.frame.presentation_time - time)
                    .abs()
                    .partial_cmp(&(b.frame.presentation_time - time).abs())
                    .unwrap()
            })
            .map(|e| &e.frame)
    }

    /// Nearest frame to `time` with no tolerance bound, preferring a match
    /// on `preferred_version` to break distance ties.
    pub fn best_frame(&self, time: f64, preferred_version: Option<u64>) -> Option<&DecodedFrame> {
        self.entries
            .iter()
            .min_by(|a, b| {
                let da = (a.frame.presentation_time - time).abs();
                let db = (b.frame.presentation_time - time).abs();
                da.partial_cmp(&db).unwrap().then_with(|| {
                    let pref = preferred_version.unwrap_or(u64::MAX);
                    let va = if a.frame.source_version == pref { 0 } else { 1 };
                    let vb = if b.frame.source_version == pref { 0 } else { 1 };
                    va.cmp(&vb)
                })
            })
            .map(|e| &e.frame)
    }

    pub fn frame(&self, time: f64, tolerance: f64) -> Option<&DecodedFrame> {
        self.get(time, tolerance, Bias::Neutral)
    }

    pub fn prune_before(&mut self, t: f64) {
        self.entries.retain(|e| e.frame.presentation_time >= t);
        self.recompute_bytes();
    }

    pub fn prune_after(&mut self, t: f64) {
        self.entries.retain(|e| e.frame.presentation_time <= t);
        self.recompute_bytes();
    }

    pub fn count(&self, start: f64, end: f64) -> usize {
        self.entries.iter().filter(|e| e.frame.presentation_time >= start && e.frame.presentation_time <= end).count()
    }

    pub fn times(&self, start: f64, end: f64, limit: usize) -> Vec<f64> {
        self.entries
            .iter()
            .map(|e| e.frame.presentation_time)
            .filter(|t| *t >= start && *t <= end)
            .take(limit)
            .collect()
    }
}

/// One `FrameCache` per clip, looked up by clip id. Owned by the transport
/// context, never touched directly by a decode worker thread — decoders
/// post results and the transport drains them onto the cache.
pub type CacheRegistry = HashMap<uuid::Uuid, FrameCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn frame(clip_id: Uuid, t: f64, version: u64, origin: FrameOrigin, bytes: usize) -> DecodedFrame {
        DecodedFrame {
            clip_id,
            pixels: vec![0u8; bytes].into(),
            width: 1,
            height: 1,
            presentation_time: t,
            source_version: version,
            origin,
            scrub_version: 0,
        }
    }

    #[test]
    fn byte_budget_is_enforced_after_insert() {
        let id = Uuid::nil();
        let mut cache = FrameCache::new(100, 1000.0, 1.0, CacheWeights::default());
        for i in 0..10 {
            cache.record(frame(id, i as f64, 0, FrameOrigin::Playback, 20), 0.0, 0.0);
        }
        assert!(cache.bytes_in_use() <= 100);
    }

    #[test]
    fn newest_frame_survives_budget_eviction() {
        let id = Uuid::nil();
        let mut cache = FrameCache::new(1, 1000.0, 1.0, CacheWeights::default());
        cache.record(frame(id, 5.0, 0, FrameOrigin::Playback, 50), 0.0, 5.0);
        assert_eq!(cache.len(), 1);
        assert!(cache.frame(5.0, 0.01).is_some());
    }

    #[test]
    fn max_age_evicts_unconditionally() {
        let id = Uuid::nil();
        let mut cache = FrameCache::new(10_000, 1.0, 1.0, CacheWeights::default());
        cache.record(frame(id, 0.0, 0, FrameOrigin::Playback, 10), 0.0, 0.0);
        cache.record(frame(id, 1.0, 0, FrameOrigin::Playback, 10), 5.0, 1.0);
        // the t=0.0 entry is 5s old at the second insert, older than max_age=1.0.
        assert!(cache.frame(0.0, 0.01).is_none());
    }

    #[test]
    fn bias_reverse_rejects_future_frames() {
        let id = Uuid::nil();
        let mut cache = FrameCache::new(10_000, 1000.0, 1.0, CacheWeights::default());
        cache.record(frame(id, 10.0, 0, FrameOrigin::Playback, 10), 0.0, 10.0);
        assert!(cache.get(9.0, 2.0, Bias::Reverse).is_some());
        cache.record(frame(id, 8.0, 0, FrameOrigin::Playback, 10), 0.0, 9.0);
        // Requesting at 9.0 with reverse bias must not return the 10.0 frame.
        let hit = cache.get(9.0, 2.0, Bias::Reverse).unwrap();
        assert!(hit.presentation_time <= 9.0 + 1e-9);
    }

    #[test]
    fn scrub_origin_gets_priority_boost_against_eviction() {
        let id = Uuid::nil();
        let weights = CacheWeights { age: 0.0, bytes: 1.0, priority: 0.0, scrub: 1000.0 };
        // Budget for two 10-byte frames; three inserts force exactly one
        // eviction among the two non-protected (non-newest) entries.
        let mut cache = FrameCache::new(20, 1000.0, 0.0, weights);
        cache.record(frame(id, 0.0, 0, FrameOrigin::Scrub, 10), 0.0, 50.0);
        cache.record(frame(id, 50.0, 0, FrameOrigin::Playback, 10), 0.0, 50.0);
        cache.record(frame(id, 100.0, 0, FrameOrigin::Playback, 10), 0.0, 100.0);
        // The 100.0 insert is protected as newest; between the scrub frame
        // at 0.0 and the playback frame at 50.0, the scrub weight must
        // outweigh equal byte cost and keep the scrub frame resident.
        assert!(cache.frame(0.0, 0.01).is_some());
        assert!(cache.frame(50.0, 0.01).is_none());
    }
}
