// crates/playcut-media/src/helpers/seek.rs
//
// Wraps ffmpeg's avformat seek with the backward-seek convention every
// VideoSource call site relies on.
//
// A forward seek (`target..`) lands on the keyframe at or after the
// target. When the target falls mid-GOP the next keyframe can be whole
// seconds away, and every source frame between the target and that
// keyframe is simply absent from the decoded stream — exactly what this
// seek strategy exists to avoid. A backward seek (`..=target`)
// lands on the keyframe at or before the target; the caller's PTS filter
// discards the pre-roll frames, so the first frame handed back is still
// at the right spot.
//
// Seeking to 0.0 is skipped outright: some containers return EPERM from
// `avformat_seek_file` when called with max_ts=0 on a just-opened context,
// and the demuxer already starts at position 0.

use ffmpeg_the_third as ffmpeg;

pub fn seek_to_secs(ictx: &mut ffmpeg::format::context::Input, target_secs: f64, label: &str) -> bool {
    if target_secs <= 0.0 {
        return true;
    }
    let seek_ts = (target_secs * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
    match ictx.seek(seek_ts, ..=seek_ts) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(target_secs, label, error = %e, "seek failed, decoding from current position");
            false
        }
    }
}
