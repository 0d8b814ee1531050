//! Scoped scratch directory of one pipeline run.

use std::io;
use std::path::Path;

use storyreel_core::types::JobId;
use tempfile::TempDir;

/// Exclusive temporary directory for a job.
///
/// The directory and everything in it is removed when the workspace is
/// dropped, so cleanup happens on every exit path including panics and
/// early returns. [`JobWorkspace::close`] removes it eagerly and reports
/// failures.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create `storyreel-{job_id}-XXXX` under `work_dir`.
    pub fn create(work_dir: &Path, job_id: JobId) -> io::Result<Self> {
        std::fs::create_dir_all(work_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("storyreel-{job_id}-"))
            .tempdir_in(work_dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}
