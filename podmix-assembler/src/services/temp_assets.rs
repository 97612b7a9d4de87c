//! Run-scoped scratch files
//!
//! Every intermediate file of a run is allocated here, under
//! `<scratch_root>/<run_id>/`, and recorded in an explicit manifest.
//! `release_all` deletes whatever is still tracked when the run ends,
//! whether it succeeded or not.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// What an allocated file is for (becomes part of its name)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPurpose {
    NormalizedChunk,
    Section,
    NormalizedSection,
    Music,
    Mix,
    ConcatList,
    Episode,
    NormalizedEpisode,
}

impl AssetPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetPurpose::NormalizedChunk => "chunk-norm",
            AssetPurpose::Section => "section",
            AssetPurpose::NormalizedSection => "section-norm",
            AssetPurpose::Music => "music",
            AssetPurpose::Mix => "mix",
            AssetPurpose::ConcatList => "concat",
            AssetPurpose::Episode => "episode",
            AssetPurpose::NormalizedEpisode => "episode-norm",
        }
    }
}

/// Outcome of a `release_all`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub removed: usize,
    pub failed: usize,
}

/// Allocates and tracks every transient file of one run
#[derive(Debug)]
pub struct TemporaryAssetManager {
    run_id: Uuid,
    run_dir: PathBuf,
    sequence: AtomicUsize,
    manifest: Mutex<BTreeSet<PathBuf>>,
}

impl TemporaryAssetManager {
    /// Create `<scratch_root>/<run_id>/`
    pub async fn create(scratch_root: &Path, run_id: Uuid) -> std::io::Result<Self> {
        let run_dir = scratch_root.join(run_id.to_string());
        tokio::fs::create_dir_all(&run_dir).await?;
        debug!(run_id = %run_id, dir = %run_dir.display(), "Scratch directory ready");

        Ok(Self {
            run_id,
            run_dir,
            sequence: AtomicUsize::new(0),
            manifest: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn manifest(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        // A panicked holder cannot leave the set inconsistent
        self.manifest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve a unique, tracked path: `<run_id>-<seq>-<purpose>.<ext>`
    ///
    /// Nothing is created on disk; the caller writes the file.
    pub fn allocate(&self, purpose: AssetPurpose, extension: &str) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}-{:04}-{}.{}",
            self.run_id,
            seq,
            purpose.as_str(),
            extension.trim_start_matches('.')
        );
        let path = self.run_dir.join(name);
        self.manifest().insert(path.clone());
        path
    }

    /// Track a file created outside the manager (e.g. consumed input chunks)
    pub fn adopt(&self, path: &Path) {
        self.manifest().insert(path.to_path_buf());
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.manifest().contains(path)
    }

    pub fn tracked_count(&self) -> usize {
        self.manifest().len()
    }

    /// Delete one asset early and stop tracking it
    ///
    /// A file that was never written is not an error. A file that could not
    /// be deleted stays tracked so `release_all` retries and reports it.
    pub async fn release(&self, path: &Path) -> std::io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.manifest().remove(path);
        Ok(())
    }

    /// [`release`](Self::release), logging instead of returning a failure
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = self.release(path).await {
            warn!(
                run_id = %self.run_id,
                path = %path.display(),
                error = %e,
                "Failed to release scratch file, retrying at run end"
            );
        }
    }

    /// Move a tracked file out of scratch and stop tracking it
    ///
    /// Falls back to copy + delete when `dest` is on another filesystem. The
    /// copy goes to a sibling of `dest` first, so `dest` only ever holds a
    /// complete file.
    pub async fn persist(&self, path: &Path, dest: &Path) -> std::io::Result<()> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        if tokio::fs::rename(path, dest).await.is_err() {
            let partial = self.partial_path(dest);
            let copied = match tokio::fs::copy(path, &partial).await {
                Ok(_) => tokio::fs::rename(&partial, dest).await,
                Err(e) => Err(e),
            };
            if let Err(e) = copied {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            run_id = %self.run_id,
                            path = %partial.display(),
                            error = %cleanup,
                            "Failed to remove partial episode copy"
                        );
                    }
                }
                return Err(e);
            }

            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(run_id = %self.run_id, path = %path.display(), error = %e, "Failed to remove persisted scratch file");
            }
        }

        self.manifest().remove(path);
        Ok(())
    }

    /// `<dest dir>/.<dest name>.<run_id>.part`
    fn partial_path(&self, dest: &Path) -> PathBuf {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "episode".to_string());
        dest.with_file_name(format!(".{}.{}.part", name, self.run_id))
    }

    /// Best-effort delete of every tracked file, then the run directory
    ///
    /// Failures are logged and counted, never returned.
    pub async fn release_all(&self) -> ReleaseReport {
        let paths: Vec<PathBuf> = std::mem::take(&mut *self.manifest()).into_iter().collect();
        let mut report = ReleaseReport::default();

        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        run_id = %self.run_id,
                        path = %path.display(),
                        error = %e,
                        "Failed to remove scratch file"
                    );
                }
            }
        }

        // Only succeeds when empty, so foreign files are left alone
        match tokio::fs::remove_dir(&self.run_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(
                run_id = %self.run_id,
                dir = %self.run_dir.display(),
                error = %e,
                "Scratch directory left in place"
            ),
        }

        debug!(
            run_id = %self.run_id,
            removed = report.removed,
            failed = report.failed,
            "Scratch files released"
        );
        report
    }
}
