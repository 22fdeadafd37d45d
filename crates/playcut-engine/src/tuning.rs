// crates/playcut-engine/src/tuning.rs
//
// Every numeric constant the engine depends on, collected so a host can
// override them (e.g. for a 120 Hz display, or slower storage) without an
// engine code change. Every subsystem takes a `Tuning` by shared reference
// instead of hard-coding its constants.

#[derive(Clone, Debug)]
pub struct Tuning {
    // FrameCache
    pub cache_byte_budget: usize,
    pub cache_max_age_secs: f64,
    pub cache_bias_window_secs: f64,

    // ScrubCoordinator
    pub scrub_gate_slow_ms: f64,
    pub scrub_gate_medium_ms: f64,
    pub scrub_gate_fast_ms: f64,
    pub scrub_velocity_slow_fps: f64,
    pub scrub_velocity_medium_fps: f64,
    pub global_in_flight_cap: u32,
    pub critical_in_flight_bonus: u32,
    pub scrub_lookahead_alpha: f64,

    // VideoSource
    pub preroll_budget_secs: f64,

    // TransportController — lead budgets (frame-durations) and anti-flicker
    pub lead_budget_playing_frames: f64,
    pub lead_budget_paused_frames: f64,
    pub lead_budget_scrubbing_frames: f64,
    pub hyst_ms: f64,
    pub min_hold_ms: f64,
    pub stale_relax_threshold_ms: f64,
    pub stale_relax_min_improvement_ms: f64,
    pub warmup_lead_secs: f64,

    // TimelineTicker
    pub ticker_hz: f64,

    // Decode pool
    pub decode_pool_workers: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            cache_byte_budget: 256 * 1024 * 1024,
            cache_max_age_secs: 10.0,
            cache_bias_window_secs: 1.0,

            scrub_gate_slow_ms: 60.0,
            scrub_gate_medium_ms: 45.0,
            scrub_gate_fast_ms: 30.0,
            scrub_velocity_slow_fps: 0.5,
            scrub_velocity_medium_fps: 3.0,
            global_in_flight_cap: 6,
            critical_in_flight_bonus: 2,
            scrub_lookahead_alpha: 0.25,

            preroll_budget_secs: 0.5,

            lead_budget_playing_frames: 6.0,
            lead_budget_paused_frames: 7.0,
            lead_budget_scrubbing_frames: 3.0,
            hyst_ms: 14.0,
            min_hold_ms: 25.0,
            stale_relax_threshold_ms: 350.0,
            stale_relax_min_improvement_ms: 3.0,
            warmup_lead_secs: 0.2,

            ticker_hz: 60.0,

            decode_pool_workers: 4,
        }
    }
}
