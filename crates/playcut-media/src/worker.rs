// crates/playcut-media/src/worker.rs
//
// DecodePool: N worker threads pulling DecodeJobs off a bounded channel
// and posting DecodeResults back. A single pool whose size is the
// coordinator's global in-flight cap, shared across every clip rather
// than dedicated per-concern threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use uuid::Uuid;

use playcut_core::{DecodedFrame, EngineError, FrameOrigin, FrameTimebase};

use crate::source::VideoSource;

pub struct DecodeJob {
    pub clip_id: Uuid,
    pub source: Arc<Mutex<VideoSource>>,
    pub timeline_time: f64,
    pub source_time: f64,
    pub timebase: FrameTimebase,
    pub origin: FrameOrigin,
    pub source_version: u64,
    pub scrub_version: u64,
    pub preroll_secs: f64,
    /// Scrub epoch this job was stamped with; the submitter uses this to
    /// drop stale results rather than the pool, which knows nothing about
    /// epochs.
    pub epoch: u64,
    /// Playback jobs wait for a busy source (at most one decode in flight
    /// per source); fast-scrub jobs drop instead of queuing behind a slow
    /// decode.
    pub wait_if_busy: bool,
}

pub struct DecodeResult {
    pub clip_id: Uuid,
    pub epoch: u64,
    pub scrub_version: u64,
    pub origin: FrameOrigin,
    pub outcome: Result<DecodedFrame, EngineError>,
}

/// Bounded pool of decode worker threads. The job channel's capacity is
/// the admission budget: a full pool backs up `submit` rather than
/// growing an unbounded queue.
pub struct DecodePool {
    job_tx: Sender<DecodeJob>,
    pub result_rx: Receiver<DecodeResult>,
    shutdown: Arc<AtomicBool>,
}

impl DecodePool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let (job_tx, job_rx) = bounded::<DecodeJob>(queue_capacity.max(1));
        let (result_tx, result_rx) = bounded::<DecodeResult>(queue_capacity.max(1) * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        for _ in 0..worker_count.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    let clip_id = job.clip_id;
                    let epoch = job.epoch;
                    let scrub_version = job.scrub_version;
                    let origin = job.origin;
                    let outcome = run_job(job);
                    if result_tx.send(DecodeResult { clip_id, epoch, scrub_version, origin, outcome }).is_err() {
                        break;
                    }
                }
            });
        }

        Self { job_tx, result_rx, shutdown }
    }

    /// Admit a job. Returns `false` if it was dropped (queue full and
    /// `wait_if_busy` is false, or the pool channel is disconnected).
    pub fn submit(&self, job: DecodeJob) -> bool {
        if job.wait_if_busy {
            self.job_tx.send(job).is_ok()
        } else {
            self.job_tx.try_send(job).is_ok()
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

fn run_job(job: DecodeJob) -> Result<DecodedFrame, EngineError> {
    let mut source = if job.wait_if_busy {
        job.source.lock()
    } else {
        match job.source.try_lock() {
            Some(guard) => guard,
            None => return Err(EngineError::Cancelled { clip_id: job.clip_id }),
        }
    };
    source.copy_frame(
        job.timeline_time,
        job.source_time,
        &job.timebase,
        job.origin,
        job.source_version,
        job.scrub_version,
        job.preroll_secs,
    )
}
