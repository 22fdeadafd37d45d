// crates/playcut-core/src/timebase.rs
//
// Rational frame-rate arithmetic. Every time that crosses a frame boundary
// anywhere in the engine is rounded through here — no other module is
// allowed to do its own seconds<->frame conversion, so there is exactly one
// place floating-point drift can creep in.

use serde::{Deserialize, Serialize};

/// Canonical rationals a constructed fps snaps to within 5e-4.
/// Order matters only for readability; lookup is linear over nine entries.
const CANONICAL: &[(i64, i64)] = &[
    (24, 1),
    (25, 1),
    (30, 1),
    (48, 1),
    (50, 1),
    (60, 1),
    (24000, 1001),
    (30000, 1001),
    (60000, 1001),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rounding {
    Floor,
    Nearest,
    Ceil,
}

/// A drift-free seconds <-> frame-index conversion for one rational fps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTimebase {
    num: i64,
    den: i64,
}

impl FrameTimebase {
    /// Construct from a floating-point fps, snapping to the nearest
    /// canonical rational within 5e-4, otherwise forming an n/1000
    /// approximation reduced by gcd.
    pub fn from_fps(fps: f64) -> Self {
        if !fps.is_finite() || fps <= 0.0 {
            // A non-finite or non-positive fps has no sane rational; fall
            // back to a safe default rather than producing a timebase that
            // divides by zero on every call.
            return Self { num: 30, den: 1 };
        }
        for &(num, den) in CANONICAL {
            let candidate = num as f64 / den as f64;
            if (candidate - fps).abs() < 5e-4 {
                return Self { num, den };
            }
        }
        let n = (fps * 1000.0).round() as i64;
        let d = 1000_i64;
        let g = gcd(n, d).max(1);
        Self { num: n / g, den: d / g }
    }

    /// Construct directly from an already-known rational (e.g. loaded from
    /// a persisted project). Reduces by gcd; zero/negative denominators
    /// fall back to the same default as `from_fps`.
    pub fn from_rational(num: i64, den: i64) -> Self {
        if num <= 0 || den <= 0 {
            return Self { num: 30, den: 1 };
        }
        let g = gcd(num, den).max(1);
        Self { num: num / g, den: den / g }
    }

    pub fn numerator(&self) -> i64 { self.num }
    pub fn denominator(&self) -> i64 { self.den }

    /// Frames per second as a float, for display only.
    pub fn fps(&self) -> f64 { self.num as f64 / self.den as f64 }

    /// Convert a time in seconds to a frame index.
    ///
    /// Negative times clamp to zero; non-finite times return zero. `time` is
    /// quantized to whole nanoseconds once at the boundary; the
    /// frames = time_ns * num / (den * 1e9) division itself runs in i128
    /// integer arithmetic so long timelines at high frame rates never
    /// accumulate float rounding across repeated conversions.
    pub fn frame_index(&self, time: f64, rounding: Rounding) -> i64 {
        if !time.is_finite() || time <= 0.0 {
            return 0;
        }
        const NANOS_PER_SEC: i128 = 1_000_000_000;
        let time_ns = (time * NANOS_PER_SEC as f64).round() as i128;
        let numerator = time_ns * self.num as i128;
        let denominator = self.den as i128 * NANOS_PER_SEC;
        let frames = match rounding {
            Rounding::Floor => numerator / denominator,
            Rounding::Ceil => (numerator + denominator - 1) / denominator,
            Rounding::Nearest => (numerator + denominator / 2) / denominator,
        };
        frames as i64
    }

    /// Convert a frame index back to a time in seconds.
    pub fn time(&self, frame_index: i64) -> f64 {
        let frame_index = frame_index.max(0);
        frame_index as f64 * self.den as f64 / self.num as f64
    }

    /// Round-trip a time through `frame_index` and back via `time`,
    /// snapping it onto the frame grid.
    pub fn quantize(&self, time: f64, rounding: Rounding) -> f64 {
        self.time(self.frame_index(time, rounding))
    }
}

impl Default for FrameTimebase {
    fn default() -> Self {
        Self::from_fps(30.0)
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snaps_to_canonical_rationals() {
        let tb = FrameTimebase::from_fps(23.976);
        assert_eq!((tb.numerator(), tb.denominator()), (24000, 1001));

        let tb = FrameTimebase::from_fps(29.97);
        assert_eq!((tb.numerator(), tb.denominator()), (30000, 1001));

        let tb = FrameTimebase::from_fps(59.94);
        assert_eq!((tb.numerator(), tb.denominator()), (60000, 1001));

        let tb = FrameTimebase::from_fps(24.0);
        assert_eq!((tb.numerator(), tb.denominator()), (24, 1));
    }

    #[test]
    fn non_canonical_reduces_by_gcd() {
        // 15 fps has no canonical match; n/1000 = 15000/1000 -> 15/1.
        let tb = FrameTimebase::from_fps(15.0);
        assert_eq!((tb.numerator(), tb.denominator()), (15, 1));
    }

    #[test]
    fn round_trip_invariant() {
        let tb = FrameTimebase::from_fps(24.0);
        for n in 0..10_000_i64 {
            let t = tb.time(n);
            assert_eq!(tb.frame_index(t, Rounding::Nearest), n);
        }
    }

    #[test]
    fn negative_and_nonfinite_clamp_to_zero() {
        let tb = FrameTimebase::from_fps(30.0);
        assert_eq!(tb.frame_index(-5.0, Rounding::Nearest), 0);
        assert_eq!(tb.frame_index(f64::NAN, Rounding::Nearest), 0);
        assert_eq!(tb.frame_index(f64::INFINITY, Rounding::Nearest), 0);
    }

    #[test]
    fn quantize_snaps_onto_frame_grid() {
        let tb = FrameTimebase::from_fps(24.0);
        let q = tb.quantize(1.0041, Rounding::Nearest);
        assert!((q - tb.time(tb.frame_index(1.0041, Rounding::Nearest))).abs() < 1e-12);
    }

    #[test]
    fn bad_fps_falls_back_to_default() {
        let tb = FrameTimebase::from_fps(0.0);
        assert_eq!((tb.numerator(), tb.denominator()), (30, 1));
        let tb = FrameTimebase::from_fps(-10.0);
        assert_eq!((tb.numerator(), tb.denominator()), (30, 1));
    }
}
