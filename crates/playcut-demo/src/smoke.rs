// crates/playcut-demo/src/smoke.rs
//
// In-process smoke harness for `CIN_RUN_TESTS=1`: builds a small
// composition entirely in memory (no real media files, so it runs on a
// headless CI box) and drives a `TransportController` through
// play/scrub/seek, asserting the core playback invariants. This
// complements `cargo test` rather than replacing it — it exists so a
// machine with no display can still exercise the transport end to end.

use uuid::Uuid;

use playcut_core::{
    build_graph, AssetRef, Clip, Composition, FrameTimebase, MatteBinding, SourceRange, Track,
    TrackKind, Transform2D,
};
use playcut_engine::{Tuning, TransportController, TransportState};

fn clip(id: u128, track_id: Uuid, dst_start: f64, duration: f64) -> Clip {
    Clip {
        id: Uuid::from_u128(id),
        asset: AssetRef("smoke".into()),
        src_range: SourceRange { start: 0.0, duration },
        dst_start,
        speed: 1.0,
        transform: Transform2D::default(),
        track_id,
        matte: MatteBinding::default(),
    }
}

pub fn run() -> Result<(), String> {
    let track_id = Uuid::from_u128(1);
    let comp = Composition {
        tracks: vec![Track { id: track_id, stack_index: 0, kind: TrackKind::Video, name: "V1".into(), muted: false, solo: false, locked: false }],
        clips: vec![
            clip(1, track_id, 0.0, 1.0),
            // a one-second gap between 1.0 and 2.0
            clip(2, track_id, 2.0, 1.0),
        ],
        fps_num: 24,
        fps_den: 1,
        work_area_start: None,
        work_area_duration: None,
    };
    comp.validate().map_err(|e| e.to_string())?;
    let sanitized = comp.sanitize(1.0 / 24.0, &std::collections::HashMap::new());
    let timebase = FrameTimebase::from_rational(sanitized.fps_num, sanitized.fps_den);
    let graph = build_graph(&sanitized, 1, &timebase);

    if graph.duration < 2.99 || graph.duration > 3.01 {
        return Err(format!("expected ~3s duration, got {}", graph.duration));
    }

    let mut transport = TransportController::new(Tuning::default(), timebase.fps(), 0.0);
    transport.apply_graph(graph, 0.0);

    transport.request_play(1.0, 0.0);
    if transport.state() != TransportState::Playing {
        return Err("requestPlay did not enter Playing".into());
    }

    let clamped = transport.request_time(1_000.0, 1.0);
    if (clamped - 3.0).abs() > 1e-6 {
        return Err(format!("requestTime did not clamp into duration, got {clamped}"));
    }
    if transport.state() != TransportState::Paused {
        return Err("requestTime did not return to Paused".into());
    }

    transport.begin_scrub(2.0);
    let v1 = transport.scrub_seek(0.5, 2.0);
    let v2 = transport.scrub_seek(0.6, 2.01);
    if v2 <= v1 {
        return Err("scrubVersion did not increase monotonically".into());
    }
    transport.end_scrub(false, 2.02);
    if transport.state() != TransportState::Paused {
        return Err("endScrub(resume=false) did not pause".into());
    }

    Ok(())
}
