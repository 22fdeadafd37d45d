// crates/playcut-demo/src/app.rs
//
// Canvas + transport bar driving one TransportController against a single
// clip loaded from disk: a play/pause toggle and a scrub slider, nothing
// else — no timeline, library, export, or undo, since this harness exists
// to drive the engine, not to edit.

use std::path::PathBuf;
use std::sync::Arc;

use eframe::egui;
use parking_lot::Mutex as PlMutex;
use uuid::Uuid;

use playcut_core::{
    build_graph, AssetRef, Clip, Composition, FrameOrigin, FrameTimebase, MatteBinding,
    SourceRange, Track, TrackKind, Transform2D,
};
use playcut_engine::{Tuning, TransportController, TransportState};
use playcut_media::{DecodeJob, DecodePool, FrameCache, VideoSource};

const TRACK_ID: u128 = 1;
const CLIP_ID: u128 = 1;

pub struct DemoApp {
    transport: TransportController,
    tuning: Tuning,
    timebase: FrameTimebase,
    source: Option<Arc<PlMutex<VideoSource>>>,
    cache: FrameCache,
    pool: DecodePool,
    texture: Option<egui::TextureHandle>,
    start_instant: std::time::Instant,
    status: String,
    source_version: u64,
    next_epoch: u64,
}

impl DemoApp {
    pub fn new() -> Self {
        let tuning = Tuning::default();
        let timebase = FrameTimebase::from_fps(30.0);
        Self {
            transport: TransportController::new(tuning.clone(), timebase.fps(), 0.0),
            tuning,
            timebase,
            source: None,
            cache: FrameCache::new(64 * 1024 * 1024, 10.0, 1.0, Default::default()),
            pool: DecodePool::new(2, 8),
            texture: None,
            start_instant: std::time::Instant::now(),
            status: "no file loaded".into(),
            source_version: 0,
            next_epoch: 0,
        }
    }

    fn host_time(&self) -> f64 {
        self.start_instant.elapsed().as_secs_f64()
    }

    fn load(&mut self, path: PathBuf) {
        let clip_id = Uuid::from_u128(CLIP_ID);
        let track_id = Uuid::from_u128(TRACK_ID);

        match load_duration(&path) {
            Ok(duration) => {
                let asset = AssetRef(path.display().to_string());
                let comp = Composition {
                    tracks: vec![Track { id: track_id, stack_index: 0, kind: TrackKind::Video, name: "V1".into(), muted: false, solo: false, locked: false }],
                    clips: vec![Clip {
                        id: clip_id,
                        asset: asset.clone(),
                        src_range: SourceRange { start: 0.0, duration },
                        dst_start: 0.0,
                        speed: 1.0,
                        transform: Transform2D::default(),
                        track_id,
                        matte: MatteBinding::default(),
                    }],
                    fps_num: self.timebase.numerator(),
                    fps_den: self.timebase.denominator(),
                    work_area_start: None,
                    work_area_duration: None,
                };
                let asset_durations = std::collections::HashMap::from([(asset, duration)]);
                let sanitized = comp.sanitize(self.timebase.time(1), &asset_durations);
                self.source_version += 1;
                let graph = build_graph(&sanitized, self.source_version, &self.timebase);
                self.transport.apply_graph(graph, self.host_time());
                let source = VideoSource::new(clip_id, path.clone());
                self.source = Some(Arc::new(PlMutex::new(source)));
                self.cache = FrameCache::new(64 * 1024 * 1024, 10.0, 1.0, Default::default());
                self.status = format!("loaded {}", path.display());
            }
            Err(e) => self.status = format!("probe failed: {e}"),
        }
    }

    fn request_decode(&mut self, timeline_time: f64, origin: FrameOrigin, wait_if_busy: bool) {
        let Some(source) = self.source.clone() else { return };
        self.next_epoch += 1;
        let job = DecodeJob {
            clip_id: Uuid::from_u128(CLIP_ID),
            source,
            timeline_time,
            source_time: timeline_time,
            timebase: self.timebase,
            origin,
            source_version: self.source_version,
            scrub_version: self.transport.scrub_version(),
            preroll_secs: self.tuning.preroll_budget_secs,
            epoch: self.next_epoch,
            wait_if_busy,
        };
        self.pool.submit(job);
    }

    fn drain_results(&mut self) {
        while let Ok(result) = self.pool.result_rx.try_recv() {
            if let Ok(frame) = result.outcome {
                let target = self.transport.classify_insert(result.scrub_version);
                if target != playcut_engine::InsertTarget::Discard {
                    self.cache.record(frame, self.host_time(), self.transport.clock().current_time(self.host_time()));
                }
            }
        }
    }

    fn update_texture(&mut self, ctx: &egui::Context, frame: &playcut_core::DecodedFrame) {
        let image = egui::ColorImage::from_rgba_unmultiplied([frame.width as usize, frame.height as usize], &frame.pixels);
        match &mut self.texture {
            Some(tex) => tex.set(image, egui::TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("preview", image, egui::TextureOptions::LINEAR)),
        }
    }
}

fn load_duration(path: &std::path::Path) -> Result<f64, String> {
    let ictx = ffmpeg_the_third::format::input(path).map_err(|e| e.to_string())?;
    let duration = ictx.duration() as f64 / ffmpeg_the_third::ffi::AV_TIME_BASE as f64;
    if duration <= 0.0 {
        return Err("non-positive duration".into());
    }
    Ok(duration)
}

impl eframe::App for DemoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let host_time = self.host_time();

        if let Some(TickEventSeen::Decode) = self.transport.tick(host_time).map(classify_tick) {
            let t = self.transport.clock().current_time(host_time);
            self.request_decode(t, FrameOrigin::Playback, true);
        }
        self.drain_results();

        egui::TopBottomPanel::top("transport").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Open…").clicked() {
                    if let Some(path) = rfd::FileDialog::new().pick_file() {
                        self.load(path);
                    }
                }
                let playing = self.transport.state() == TransportState::Playing;
                if ui.button(if playing { "Pause" } else { "Play" }).clicked() {
                    if playing {
                        self.transport.request_pause(host_time);
                    } else {
                        self.transport.request_play(1.0, host_time);
                        let t = self.transport.clock().current_time(host_time);
                        self.request_decode(t, FrameOrigin::Playback, true);
                    }
                }
                let mut t = self.transport.clock().current_time(host_time);
                if ui.add(egui::Slider::new(&mut t, 0.0..=60.0).text("time")).changed() {
                    let clamped = self.transport.request_time(t, host_time);
                    self.request_decode(clamped, FrameOrigin::Scrub, true);
                }
                ui.label(&self.status);
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let sample_time = self.transport.clock().current_time(host_time);
            let selected = self.transport.select_frame(Uuid::from_u128(CLIP_ID), sample_time, &self.cache, &self.timebase, host_time);
            if let Some(frame) = selected {
                self.update_texture(ctx, &frame);
            }
            match &self.texture {
                Some(tex) => {
                    ui.add(egui::Image::new(tex).shrink_to_fit());
                }
                None => {
                    ui.centered_and_justified(|ui| ui.label("no frame decoded yet"));
                }
            }
        });

        if self.transport.state() == TransportState::Playing {
            ctx.request_repaint();
        }
    }
}

enum TickEventSeen {
    Decode,
    NoDecode,
}

/// Every in-clip tick (steady-state or just-crossed-in) asks for a fresh
/// frame; a gap has nothing to decode and `ReachedEnd` already paused.
fn classify_tick(event: playcut_engine::TickEvent) -> TickEventSeen {
    use playcut_engine::TickEvent::*;
    match event {
        Advanced | CrossedIntoClip | ApproachingClipBoundary => TickEventSeen::Decode,
        CrossedIntoGap | ReachedEnd => TickEventSeen::NoDecode,
    }
}
