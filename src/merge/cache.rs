use crate::error::{Result, TsMergeError};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const PARTIAL_SUFFIX: &str = ".ts.part";

/// Bookkeeping for one job's partially merged output.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub job_id: String,
    pub last_written_offset: u64,
    pub partial_output_path: PathBuf,
    pub updated_at: DateTime<Utc>,
}

/// Tracks partial merge output per job id within one working directory.
///
/// The partial `.ts.part` file itself is the durable state; the in-memory
/// entries only mirror it. A partial file is resumable iff its length
/// equals the cumulative length of a strict prefix of the job's segment
/// list — anything else is treated as cache corruption.
pub struct CacheManager {
    work_dir: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl CacheManager {
    pub fn new<P: AsRef<Path>>(work_dir: P) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_owned(),
            entries: HashMap::new(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Stable job id for an ordered segment path list.
    pub fn job_id<P: AsRef<Path>>(paths: &[P]) -> String {
        let mut hasher = Md5::new();
        for p in paths {
            hasher.update(p.as_ref().as_os_str().as_encoded_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn partial_path(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(format!("{}{}", job_id, PARTIAL_SUFFIX))
    }

    pub fn output_path(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(format!("{}.ts", job_id))
    }

    /// Looks up resumable work for a job. Returns the number of segments
    /// already fully written, or 0 when there is no partial file.
    ///
    /// Fails with `CacheInconsistent` when a partial file exists whose
    /// length matches no segment prefix; the caller restarts from zero.
    pub async fn probe(&mut self, job_id: &str, segment_lengths: &[u64]) -> Result<usize> {
        let partial = self.partial_path(job_id);
        let len = match tokio::fs::metadata(&partial).await {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(0),
        };

        let resume_index = consistent_prefix(len, segment_lengths).ok_or_else(|| {
            TsMergeError::CacheInconsistent {
                path: partial.display().to_string(),
                len,
            }
        })?;

        self.entries.insert(
            job_id.to_string(),
            CacheEntry {
                job_id: job_id.to_string(),
                last_written_offset: len,
                partial_output_path: partial,
                updated_at: Utc::now(),
            },
        );

        Ok(resume_index)
    }

    /// Records a flush at the given output offset.
    pub fn update(&mut self, job_id: &str, offset: u64) {
        let partial = self.partial_path(job_id);
        let entry = self
            .entries
            .entry(job_id.to_string())
            .or_insert_with(|| CacheEntry {
                job_id: job_id.to_string(),
                last_written_offset: 0,
                partial_output_path: partial,
                updated_at: Utc::now(),
            });
        entry.last_written_offset = offset;
        entry.updated_at = Utc::now();
        log::debug!(
            "cache entry {} at offset {} ({})",
            job_id,
            offset,
            entry.updated_at
        );
    }

    pub fn entry(&self, job_id: &str) -> Option<&CacheEntry> {
        self.entries.get(job_id)
    }

    /// Drops a completed job's entry. The partial file is expected to
    /// have been renamed to the final output already.
    pub fn remove(&mut self, job_id: &str) {
        self.entries.remove(job_id);
    }

    /// Removes every cache entry and partial file in the working
    /// directory. Callers must ensure no worker is appending.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();

        let dir = match std::fs::read_dir(&self.work_dir) {
            Ok(d) => d,
            // A directory that was never created holds no cache
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for item in dir {
            let path = item?.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX))
            {
                log::debug!("removing partial output {}", path.display());
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Number of whole segments covered by `len` bytes, or `None` when the
/// length falls inside or past the segment sequence.
fn consistent_prefix(len: u64, segment_lengths: &[u64]) -> Option<usize> {
    let mut acc = 0u64;
    if len == 0 {
        return Some(0);
    }
    for (i, l) in segment_lengths.iter().enumerate() {
        acc += l;
        if acc == len {
            return Some(i + 1);
        }
        if acc > len {
            return None;
        }
    }
    None
}
