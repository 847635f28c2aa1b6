use super::cache::CacheManager;
use crate::config;
use crate::error::{Result, TsMergeError};
use crate::filter::Segment;
use crate::format::ts::scanner;
use crate::format::ts::signature::SignatureExtractor;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Notify;

/// Result delivered through the completion callback: the merged output
/// path, or the error that terminated the job. Never both.
pub type MergeOutcome = std::result::Result<PathBuf, TsMergeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl MergeState {
    fn is_active(&self) -> bool {
        matches!(self, MergeState::Running | MergeState::Paused)
    }
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeState::Idle => "idle",
            MergeState::Running => "running",
            MergeState::Paused => "paused",
            MergeState::Completed => "completed",
            MergeState::Cancelled => "cancelled",
            MergeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One merge invocation over one compatible segment run.
struct MergeJob {
    id: String,
    work_dir: PathBuf,
    output_path: PathBuf,
    bytes_written: u64,
    total_bytes: u64,
}

struct MergerInner {
    segments: Vec<Segment>,
    dir: Mutex<Option<PathBuf>>,
    state: Mutex<MergeState>,
    // Cancellation request. Terminal state transitions are made by the
    // worker only, once it has drained; until then the job stays active
    // so start/clear_cache cannot race the draining worker.
    cancel_requested: AtomicBool,
    notify: Notify,
    progress: Box<dyn Fn(f32) + Send + Sync>,
    completion: Box<dyn Fn(MergeOutcome) + Send + Sync>,
}

impl MergerInner {
    fn resolved_dir(&self) -> PathBuf {
        self.dir
            .lock()
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("tsmerge"))
    }

    fn report_progress(&self, bytes_written: u64, total_bytes: u64) {
        let p = if total_bytes == 0 {
            1.0
        } else {
            (bytes_written as f64 / total_bytes as f64).clamp(0.0, 1.0)
        };
        (self.progress)(p as f32);
    }
}

/// Streams one compatible run of TS segments into a single output file.
///
/// State machine: `Idle → Running → {Paused ⇄ Running} → {Completed |
/// Cancelled | Failed}`. The copy runs on a background tokio task; the
/// control surface is fire-and-forget and thread-safe, and the worker
/// observes it at segment boundaries only, so the partial output is never
/// left mid-packet. Progress is monotone in [0, 1] and reaches 1.0 only
/// on completion; the completion callback fires exactly once per started
/// job with either the output path or an error.
///
/// `start` must be called from within a tokio runtime.
pub struct TsMerger {
    inner: Arc<MergerInner>,
}

impl TsMerger {
    /// Builds a merger over an ordered, mutually compatible segment list
    /// (one [`CompatibilityGroup`](crate::filter::CompatibilityGroup) as
    /// produced by [`TsFilter`](crate::filter::TsFilter)).
    pub fn merge_ts_files<I, P, F, C>(ts_files: I, progress: F, completion: C) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
        F: Fn(f32) + Send + Sync + 'static,
        C: Fn(MergeOutcome) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(MergerInner {
                segments: ts_files.into_iter().map(Segment::new).collect(),
                dir: Mutex::new(None),
                state: Mutex::new(MergeState::Idle),
                cancel_requested: AtomicBool::new(false),
                notify: Notify::new(),
                progress: Box::new(progress),
                completion: Box::new(completion),
            }),
        }
    }

    /// Working directory for cache and output files. Defaults to a
    /// `tsmerge` directory under the system temp dir; created on demand.
    pub fn set_dir<P: AsRef<Path>>(&self, dir: P) {
        *self.inner.dir.lock() = Some(dir.as_ref().to_owned());
    }

    pub fn dir(&self) -> Option<PathBuf> {
        self.inner.dir.lock().clone()
    }

    pub fn state(&self) -> MergeState {
        *self.inner.state.lock()
    }

    /// Starts (or, after cancellation/failure, restarts) the merge on a
    /// background task. A no-op while a job is already active.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            match *state {
                MergeState::Idle | MergeState::Cancelled | MergeState::Failed => {
                    *state = MergeState::Running;
                    self.inner.cancel_requested.store(false, Ordering::SeqCst);
                }
                other => {
                    log::warn!("start ignored in state {}", other);
                    return;
                }
            }
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = run_merge(&inner).await;

            let outcome = {
                let mut state = inner.state.lock();
                match result {
                    Ok(path) => {
                        *state = MergeState::Completed;
                        Ok(path)
                    }
                    Err(TsMergeError::Cancelled) => {
                        *state = MergeState::Cancelled;
                        Err(TsMergeError::Cancelled)
                    }
                    Err(e) => {
                        log::warn!("merge failed: {}", e);
                        *state = MergeState::Failed;
                        Err(e)
                    }
                }
            };

            (inner.completion)(outcome);
        });
    }

    /// Suspends the worker at the next segment boundary. The partially
    /// written output stays open.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if *state == MergeState::Running {
            *state = MergeState::Paused;
        } else {
            log::warn!("pause ignored in state {}", state);
        }
    }

    /// Continues from the next unprocessed segment; bytes already flushed
    /// are never rewritten.
    pub fn resume(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == MergeState::Paused {
                *state = MergeState::Running;
            } else {
                log::warn!("resume ignored in state {}", state);
                return;
            }
        }
        self.inner.notify.notify_one();
    }

    /// Requests cancellation. The worker finishes flushing the current
    /// segment, transitions to `Cancelled` itself, and delivers the
    /// completion; until then the job counts as active, so `start` and
    /// `clear_cache` are rejected while it drains. The partial output
    /// and cache entry are kept, so a later invocation can resume unless
    /// the cache is cleared.
    pub fn stop(&self) {
        {
            let state = self.inner.state.lock();
            if !state.is_active() {
                log::warn!("stop ignored in state {}", state);
                return;
            }
            self.inner.cancel_requested.store(true, Ordering::SeqCst);
        }
        self.inner.notify.notify_one();
    }

    /// Removes cache entries and partial outputs in the working
    /// directory. Rejected (warn-logged no-op) while a job is active, to
    /// avoid deleting a file the worker is appending to.
    pub fn clear_cache(&self) {
        if self.inner.state.lock().is_active() {
            log::warn!("clear_cache ignored while a merge job is active");
            return;
        }

        let dir = self.inner.resolved_dir();
        if let Err(e) = CacheManager::new(&dir).clear() {
            log::warn!("clear_cache failed in {}: {}", dir.display(), e);
        }
    }
}

/// Blocks at a segment boundary while the job is paused; fails with
/// `Cancelled` once a stop has been requested.
async fn boundary_checkpoint(inner: &MergerInner) -> Result<()> {
    loop {
        if inner.cancel_requested.load(Ordering::SeqCst) {
            return Err(TsMergeError::Cancelled);
        }
        match *inner.state.lock() {
            MergeState::Running => return Ok(()),
            MergeState::Paused => {}
            _ => return Err(TsMergeError::Cancelled),
        }
        inner.notify.notified().await;
    }
}

async fn run_merge(inner: &MergerInner) -> MergeOutcome {
    if inner.segments.is_empty() {
        return Err(TsMergeError::InvalidData("no segments to merge".into()));
    }

    let work_dir = inner.resolved_dir();
    tokio::fs::create_dir_all(&work_dir).await?;

    let paths: Vec<&Path> = inner.segments.iter().map(|s| s.path()).collect();
    let mut cache = CacheManager::new(&work_dir);
    let job_id = CacheManager::job_id(&paths);

    let mut lengths = Vec::with_capacity(inner.segments.len());
    for segment in &inner.segments {
        lengths.push(segment.byte_len().await?);
    }

    let mut job = MergeJob {
        id: job_id.clone(),
        work_dir,
        output_path: cache.output_path(&job_id),
        bytes_written: 0,
        total_bytes: lengths.iter().sum(),
    };

    let resume_index = match cache.probe(&job_id, &lengths).await {
        Ok(i) => i,
        Err(e @ TsMergeError::CacheInconsistent { .. }) => {
            log::warn!("{}; restarting merge from scratch", e);
            0
        }
        Err(e) => return Err(e),
    };

    let partial = cache.partial_path(&job_id);
    let mut out = if resume_index > 0 {
        job.bytes_written = lengths[..resume_index].iter().sum();
        log::info!(
            "job {} resuming at segment {} ({} bytes cached)",
            job.id,
            resume_index,
            job.bytes_written
        );
        OpenOptions::new().append(true).open(&partial).await?
    } else {
        File::create(&partial).await?
    };

    let extractor = SignatureExtractor::new();
    let reference = extractor.extract(inner.segments[0].path()).await?;
    let buf_size = config::get().copy_buffer_size.max(4096);
    let mut buf = vec![0u8; buf_size];

    for (i, segment) in inner.segments.iter().enumerate().skip(resume_index) {
        boundary_checkpoint(inner).await?;

        // Defensive re-check: the classifier should have excluded any
        // mismatch, but a file can change between partition and merge.
        if i != 0 {
            let signature = extractor.extract(segment.path()).await?;
            if !reference.is_compatible(&signature) {
                return Err(TsMergeError::IncompatibleSegment {
                    path: segment.path().display().to_string(),
                    expected: reference.to_string(),
                    found: signature.to_string(),
                });
            }
        }

        let mut file = File::open(segment.path()).await?;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            job.bytes_written += n as u64;
            // 1.0 is reported only after the validity pass and rename
            if job.bytes_written < job.total_bytes {
                inner.report_progress(job.bytes_written, job.total_bytes);
            }
        }

        out.flush().await?;
        cache.update(&job_id, job.bytes_written);
        log::debug!(
            "job {} appended segment {}/{} ({}/{} bytes)",
            job.id,
            i + 1,
            inner.segments.len(),
            job.bytes_written,
            job.total_bytes
        );
    }

    // A stop that lands during the last segment still cancels, after the
    // segment's bytes are flushed.
    boundary_checkpoint(inner).await?;
    drop(out);

    if !scanner::is_ts_file_valid(&partial).await {
        return Err(TsMergeError::malformed(
            &partial,
            "merged output failed the packet alignment check",
        ));
    }

    tokio::fs::rename(&partial, &job.output_path).await?;
    cache.remove(&job_id);
    inner.report_progress(job.total_bytes, job.total_bytes);

    log::info!(
        "job {} completed: {} ({} bytes) in {}",
        job.id,
        job.output_path.display(),
        job.total_bytes,
        job.work_dir.display()
    );
    Ok(job.output_path)
}
