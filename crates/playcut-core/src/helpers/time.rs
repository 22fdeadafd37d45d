// crates/playcut-core/src/helpers/time.rs
//
// Shared time-formatting utilities for timecode display in host UIs.

/// Format a duration in seconds as `MM:SS:FF` (minutes, seconds, frames at
/// 30 fps). Used where frame-level precision matters, e.g. a ruler readout.
///
/// ```
/// use playcut_core::helpers::time::format_timecode;
/// assert_eq!(format_timecode(0.0),    "00:00:00");
/// assert_eq!(format_timecode(61.5),   "01:01:15");
/// assert_eq!(format_timecode(3599.0), "59:59:00");
/// ```
pub fn format_timecode(s: f64) -> String {
    let s = s.max(0.0);
    let m = (s / 60.0) as u32;
    let sc = (s % 60.0) as u32;
    let fr = ((s * 30.0) as u32) % 30;
    format!("{m:02}:{sc:02}:{fr:02}")
}

/// Compact human-readable duration, e.g. for a media bin listing.
///
/// ```
/// use playcut_core::helpers::time::format_duration;
/// assert_eq!(format_duration(4.2),    "4.2s");
/// assert_eq!(format_duration(187.0),  "3:07");
/// assert_eq!(format_duration(3875.0), "1:04:35");
/// ```
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0);
    if secs >= 3600.0 {
        format!(
            "{}:{:02}:{:02}",
            secs as u64 / 3600,
            (secs as u64 % 3600) / 60,
            secs as u64 % 60,
        )
    } else if secs >= 60.0 {
        format!("{}:{:02}", secs as u64 / 60, secs as u64 % 60)
    } else {
        format!("{secs:.1}s")
    }
}
