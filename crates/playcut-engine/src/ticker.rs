// crates/playcut-engine/src/ticker.rs
//
// TimelineTicker: drives the clock at display cadence during playback.
// No egui coupling and no internal thread: the host (a UI frame callback,
// a test harness, anything with a host clock) calls `poll` once per
// iteration and reacts to the `Some(dt)` it gets back.

/// `start`/`poll`/`stop` are driven by whatever owns the actual event loop
/// (an eframe `update()`, a test driver). The ticker itself never spawns a
/// thread — the caller's own loop is the transport thread.
pub struct TimelineTicker {
    min_interval_secs: f64,
    running: bool,
    last_host_time: Option<f64>,
}

impl TimelineTicker {
    /// `hz` should be `max(60.0, composition_fps)` — "whichever is finer".
    pub fn new(hz: f64) -> Self {
        let hz = if hz > 0.0 { hz } else { 60.0 };
        Self { min_interval_secs: 1.0 / hz, running: false, last_host_time: None }
    }

    pub fn set_hz(&mut self, hz: f64) {
        if hz > 0.0 {
            self.min_interval_secs = 1.0 / hz;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, host_time: f64) {
        self.running = true;
        self.last_host_time = Some(host_time);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.last_host_time = None;
    }

    /// Idempotent: resets the phase of the next tick to `host_time` without
    /// changing `running`. Used when a seek changes the timeline time but
    /// playback state itself doesn't change.
    pub fn resync(&mut self, host_time: f64) {
        self.last_host_time = Some(host_time);
    }

    /// A no-op at `rate == 0`: the caller simply never calls `start`, or
    /// calls `stop`, when rate is zero — the ticker has no rate of its own,
    /// it only paces *when* `onTick` fires, not what it does.
    ///
    /// Returns `Some(dt)` once at least `min_interval_secs` of host time has
    /// elapsed since the last fired tick. Never returns more than one tick
    /// per call regardless of how many intervals elapsed — the caller's own
    /// `last_host_time` is always snapped forward to `host_time`, so a slow
    /// `onTick` skips the backlog instead of queuing catch-up ticks.
    pub fn poll(&mut self, host_time: f64) -> Option<f64> {
        if !self.running {
            return None;
        }
        let last = match self.last_host_time {
            Some(last) => last,
            None => {
                self.last_host_time = Some(host_time);
                return None;
            }
        };
        let elapsed = host_time - last;
        if elapsed + 1e-9 < self.min_interval_secs {
            return None;
        }
        self.last_host_time = Some(host_time);
        Some(elapsed)
    }
}
