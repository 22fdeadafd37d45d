// crates/playcut-media/src/source.rs
//
// VideoSource: one decoder per clip. Keeps at most one "live" ffmpeg
// reader positioned near the last-requested source time so sequential
// requests (playback, slow scrub) avoid a reopen+seek; a jump outside the
// preroll window tears the reader down and reopens at the nearest
// keyframe instead of paying for a long forward decode. The reopen-vs-
// reuse decision and the keyframe table are owned here rather than by the
// call site.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use uuid::Uuid;

use playcut_core::composition::SourceRange;
use playcut_core::{trace_decode, DecodedFrame, EngineError, FrameOrigin, FrameTimebase, Rounding};

use crate::helpers::seek::seek_to_secs;
use crate::probe;

fn decode_error(clip_id: Uuid, message: impl Into<String>) -> EngineError {
    EngineError::DecodeError { clip_id, message: message.into() }
}

struct LiveReader {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::video::Video,
    video_idx: usize,
    scaler: SwsContext,
    tb_num: i64,
    tb_den: i64,
    last_pts: i64,
    last_delivered_secs: f64,
    out_w: u32,
    out_h: u32,
}

impl LiveReader {
    fn open(path: &Path, seek_secs: f64, clip_id: Uuid) -> Result<Self, EngineError> {
        let mut ictx = input(path).map_err(|e| decode_error(clip_id, e.to_string()))?;
        let video_idx = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| decode_error(clip_id, "no video stream"))?
            .index();
        let (tb_num, tb_den) = {
            let tb = ictx.stream(video_idx).unwrap().time_base();
            (tb.numerator() as i64, tb.denominator() as i64)
        };
        seek_to_secs(&mut ictx, seek_secs, "video-source");

        // Second context for the decoder: Parameters borrows from the
        // Stream it came from, which would otherwise conflict with the
        // mutable borrow of `ictx` used for packet iteration below.
        let ictx2 = input(path).map_err(|e| decode_error(clip_id, e.to_string()))?;
        let stream2 = ictx2
            .stream(video_idx)
            .ok_or_else(|| decode_error(clip_id, "stream missing on reopen"))?;
        let dec_ctx = ffmpeg::codec::context::Context::from_parameters(stream2.parameters())
            .map_err(|e| decode_error(clip_id, e.to_string()))?;
        let decoder = dec_ctx.decoder().video().map_err(|e| decode_error(clip_id, e.to_string()))?;

        let out_w = decoder.width().max(2);
        let out_h = decoder.height().max(2);
        let scaler = SwsContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGBA,
            out_w,
            out_h,
            Flags::BILINEAR,
        )
        .map_err(|e| decode_error(clip_id, e.to_string()))?;

        Ok(Self {
            ictx,
            decoder,
            video_idx,
            scaler,
            tb_num,
            tb_den,
            last_pts: i64::MIN,
            last_delivered_secs: f64::NEG_INFINITY,
            out_w,
            out_h,
        })
    }

    /// Decode forward until a frame at or past `target_secs`, discarding
    /// everything before it. Returns the last frame seen if EOF is hit
    /// first (e.g. the clip's final frame was requested).
    fn advance_to(&mut self, target_secs: f64, clip_id: Uuid) -> Result<(Vec<u8>, u32, u32, f64), EngineError> {
        let target_pts = (target_secs * self.tb_den as f64 / self.tb_num as f64) as i64;
        let mut last_good: Option<(Vec<u8>, f64)> = None;

        for (stream, packet) in self.ictx.packets().flatten() {
            if stream.index() != self.video_idx {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            let mut decoded = ffmpeg::util::frame::video::Video::empty();
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.pts().unwrap_or(self.last_pts + 1);
                self.last_pts = pts;
                let secs = pts as f64 * self.tb_num as f64 / self.tb_den as f64;

                let mut out = ffmpeg::util::frame::video::Video::empty();
                self.scaler
                    .run(&decoded, &mut out)
                    .map_err(|e| decode_error(clip_id, e.to_string()))?;
                let data = destride(&out, self.out_w, self.out_h);
                self.last_delivered_secs = secs;
                last_good = Some((data.clone(), secs));

                if pts < target_pts {
                    continue;
                }
                return Ok((data, self.out_w, self.out_h, secs));
            }
        }

        last_good
            .map(|(data, secs)| (data, self.out_w, self.out_h, secs))
            .ok_or(EngineError::EndOfStream { clip_id })
    }
}

fn destride(frame: &ffmpeg::util::frame::video::Video, w: u32, h: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let raw = frame.data(0);
    let row_bytes = w as usize * 4;
    (0..h as usize).flat_map(|row| { let s = row * stride; &raw[s..s + row_bytes] }).copied().collect()
}

pub struct VideoSource {
    clip_id: Uuid,
    path: PathBuf,
    keyframes: Option<Vec<f64>>,
    natural_size: Option<(u32, u32)>,
    live: Option<LiveReader>,
    last_frame: Option<DecodedFrame>,
    /// Bumped on `invalidate`; lets a caller holding a stale reference to
    /// this source tell that its cached state no longer applies.
    version: u64,
}

impl VideoSource {
    pub fn new(clip_id: Uuid, path: PathBuf) -> Self {
        Self { clip_id, path, keyframes: None, natural_size: None, live: None, last_frame: None, version: 0 }
    }

    pub fn clip_id(&self) -> Uuid {
        self.clip_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn natural_size(&mut self) -> Result<(u32, u32), EngineError> {
        if let Some(size) = self.natural_size {
            return Ok(size);
        }
        let size = probe::natural_size(&self.path, self.clip_id)?;
        self.natural_size = Some(size);
        Ok(size)
    }

    fn ensure_keyframes(&mut self) -> Result<(), EngineError> {
        if self.keyframes.is_none() {
            self.keyframes = Some(probe::scan_keyframes(&self.path, self.clip_id)?);
        }
        Ok(())
    }

    /// Drop the live reader and cached frame; used when a clip's file or
    /// src range changed under it (re-edit) or the clip left the timeline.
    pub fn invalidate(&mut self) {
        self.live = None;
        self.last_frame = None;
        self.version += 1;
    }

    pub fn latest_frame(&self) -> Option<&DecodedFrame> {
        self.last_frame.as_ref()
    }

    /// `sourceSeconds = srcRange.start + (timelineTime - dstStart) * speed`,
    /// clamped into `srcRange`.
    pub fn map_source_time(dst_start: f64, speed: f64, src_range: SourceRange, timeline_time: f64) -> f64 {
        let t = src_range.start + (timeline_time - dst_start) * speed;
        t.clamp(src_range.start, src_range.end())
    }

    /// Produce the frame for `timeline_time` (already mapped to
    /// `source_time` by the caller via `map_source_time`). Reuses the live
    /// reader when `source_time` is reachable within `preroll_secs` of the
    /// last delivered time and no backward seek is needed; otherwise
    /// reopens positioned at the nearest keyframe at or before the target.
    pub fn copy_frame(
        &mut self,
        timeline_time: f64,
        source_time: f64,
        timebase: &FrameTimebase,
        origin: FrameOrigin,
        source_version: u64,
        scrub_version: u64,
        preroll_secs: f64,
    ) -> Result<DecodedFrame, EngineError> {
        self.ensure_keyframes()?;
        let keyframes = self.keyframes.as_ref().unwrap();
        let keyframe = probe::floor_keyframe(keyframes, source_time);

        let needs_reopen = match &self.live {
            Some(live) => {
                source_time + 1e-9 < live.last_delivered_secs
                    || (source_time - live.last_delivered_secs) >= preroll_secs
            }
            None => true,
        };

        if needs_reopen {
            trace_decode!(clip_id = %self.clip_id, source_time, keyframe, "reopening video source");
            self.live = Some(LiveReader::open(&self.path, keyframe, self.clip_id)?);
        }

        let live = self.live.as_mut().expect("just opened or already live");
        let (pixels, w, h, _actual_secs) = live.advance_to(source_time, self.clip_id)?;

        let rounded_time = timebase.time(timebase.frame_index(timeline_time, Rounding::Nearest));
        let frame = DecodedFrame {
            clip_id: self.clip_id,
            pixels: pixels.into(),
            width: w,
            height: h,
            presentation_time: rounded_time,
            source_version,
            origin,
            scrub_version,
        };
        self.last_frame = Some(frame.clone());
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_source_time_applies_speed_and_offset() {
        let range = SourceRange { start: 10.0, duration: 5.0 };
        // dstStart=2, speed=2: timelineTime=3 -> sourceSeconds = 10 + (3-2)*2 = 12
        let t = VideoSource::map_source_time(2.0, 2.0, range, 3.0);
        assert!((t - 12.0).abs() < 1e-9);
    }

    #[test]
    fn map_source_time_clamps_to_range() {
        let range = SourceRange { start: 10.0, duration: 5.0 };
        let t = VideoSource::map_source_time(0.0, 1.0, range, 1000.0);
        assert!((t - range.end()).abs() < 1e-9);
        let t2 = VideoSource::map_source_time(0.0, 1.0, range, -1000.0);
        assert!((t2 - range.start).abs() < 1e-9);
    }
}
