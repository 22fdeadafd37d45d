// crates/playcut-media/src/probe.rs
//
// Cheap, read-only inspection of a media file: natural frame size and the
// keyframe table VideoSource needs for its seek strategy. Thumbnailing and
// waveform extraction are out of scope here.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type;
use uuid::Uuid;

use playcut_core::EngineError;

fn decode_error(clip_id: Uuid, message: impl Into<String>) -> EngineError {
    EngineError::DecodeError { clip_id, message: message.into() }
}

/// The video stream's coded dimensions, read directly off the stream
/// parameters so this doesn't need to stand up a decoder.
pub fn natural_size(path: &Path, clip_id: Uuid) -> Result<(u32, u32), EngineError> {
    let ictx = input(path).map_err(|e| decode_error(clip_id, e.to_string()))?;
    let stream = ictx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| decode_error(clip_id, "no video stream"))?;
    let (w, h) = unsafe {
        let p = stream.parameters().as_ptr();
        ((*p).width as u32, (*p).height as u32)
    };
    if w == 0 || h == 0 {
        return Err(decode_error(clip_id, "video stream has zero-sized frames"));
    }
    Ok((w, h))
}

/// Sorted source-time (seconds) list of IDR/keyframe packets on the best
/// video stream. Scans the whole file once; `VideoSource` calls this
/// lazily on first use and caches the result for the source's lifetime.
pub fn scan_keyframes(path: &Path, clip_id: Uuid) -> Result<Vec<f64>, EngineError> {
    let mut ictx = input(path).map_err(|e| decode_error(clip_id, e.to_string()))?;
    let video_idx = ictx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| decode_error(clip_id, "no video stream"))?
        .index();
    let time_base = ictx.stream(video_idx).unwrap().time_base();
    let (tb_num, tb_den) = (time_base.numerator() as f64, time_base.denominator() as f64);

    let mut keyframes = Vec::new();
    for (stream, packet) in ictx.packets().flatten() {
        if stream.index() != video_idx {
            continue;
        }
        if packet.is_key() {
            if let Some(pts) = packet.pts() {
                keyframes.push(pts as f64 * tb_num / tb_den);
            }
        }
    }
    keyframes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if keyframes.is_empty() {
        // Every container has at least one IDR at t=0; an empty result
        // means the stream is unreadable for seeking purposes.
        return Err(decode_error(clip_id, "no keyframes found"));
    }
    Ok(keyframes)
}

/// The largest keyframe time `<= ts`, or the first keyframe if none
/// precede `ts` (e.g. `ts` before the first IDR due to float slop).
pub fn floor_keyframe(table: &[f64], ts: f64) -> f64 {
    match table.binary_search_by(|k| k.partial_cmp(&ts).unwrap()) {
        Ok(i) => table[i],
        Err(0) => table[0],
        Err(i) => table[i - 1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_keyframe_picks_largest_leq() {
        let table = vec![0.0, 2.0, 4.0, 6.0];
        assert_eq!(floor_keyframe(&table, 5.0), 4.0);
        assert_eq!(floor_keyframe(&table, 4.0), 4.0);
        assert_eq!(floor_keyframe(&table, -1.0), 0.0);
        assert_eq!(floor_keyframe(&table, 100.0), 6.0);
    }
}
