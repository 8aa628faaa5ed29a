//! Scratch file registry
//!
//! Each pipeline owns one private directory `<root>/sfxmix-<uuid>`. A file is
//! pipeline-owned iff its parent directory is that directory; everything
//! else belongs to the caller and is never deleted.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;

use log::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::RetryPolicy;
use crate::error::{Result, SfxError};

/// Prefix of every scratch directory name.
pub const TEMP_DIR_PREFIX: &str = "sfxmix-";

/// Process-wide counter for unique scratch names
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Scratch directories that have not been torn down yet
static LIVE_DIRS: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

/// Remove every live scratch directory of this process.
///
/// Meant for exit hooks (e.g. an interrupt handler) where `Drop` will not
/// run. Returns the number of directories removed.
pub fn purge_live_dirs() -> usize {
    let dirs = match LIVE_DIRS.lock() {
        Ok(mut live) => std::mem::take(&mut *live),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    let mut removed = 0;
    for dir in dirs {
        match fs::remove_dir_all(&dir) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to purge scratch directory {}: {}", dir.display(), e),
        }
    }
    removed
}

fn track_live(dir: &Path, live: bool) {
    if let Ok(mut dirs) = LIVE_DIRS.lock() {
        if live {
            dirs.insert(dir.to_path_buf());
        } else {
            dirs.remove(dir);
        }
    }
}

/// Kinds of scratch file the executor allocates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempKind {
    Concat,
    ConcatList,
    Mix,
    Silence,
    Filter,
    Trim,
}

impl TempKind {
    pub fn tag(&self) -> &'static str {
        match self {
            TempKind::Concat => "concat",
            TempKind::ConcatList => "concat-list",
            TempKind::Mix => "mix",
            TempKind::Silence => "silence",
            TempKind::Filter => "filter",
            TempKind::Trim => "trim",
        }
    }
}

/// Owner of one pipeline's scratch directory
#[derive(Debug)]
pub struct TempFileRegistry {
    /// Canonical path of the scratch directory
    dir: PathBuf,
    /// Extension of audio scratch files
    extension: String,
    retry: RetryPolicy,
    /// Files whose deletion gave up after all retries
    leaked: Vec<PathBuf>,
    torn_down: bool,
}

impl TempFileRegistry {
    /// Create a fresh scratch directory under `root`.
    ///
    /// # Errors
    /// * `TempDirUnavailable` - the directory cannot be created or resolved
    pub fn create(root: &Path, extension: &str, retry: RetryPolicy) -> Result<Self> {
        let dir = root.join(format!("{}{}", TEMP_DIR_PREFIX, Uuid::new_v4()));
        fs::create_dir_all(&dir).map_err(|source| SfxError::TempDirUnavailable {
            path: dir.clone(),
            source,
        })?;
        let dir = dir
            .canonicalize()
            .map_err(|source| SfxError::TempDirUnavailable {
                path: dir.clone(),
                source,
            })?;

        track_live(&dir, true);
        debug!("Created scratch directory {}", dir.display());

        Ok(Self {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
            retry,
            leaked: Vec::new(),
            torn_down: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh, unused path inside the scratch directory
    pub fn allocate(&self, kind: TempKind) -> PathBuf {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let extension = match kind {
            TempKind::ConcatList => "txt",
            _ => self.extension.as_str(),
        };
        self.dir.join(format!("{}_{}.{}", kind.tag(), id, extension))
    }

    /// True iff `path` lives directly inside this registry's directory
    pub fn is_owned(&self, path: &Path) -> bool {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => return false,
        };
        if parent == self.dir {
            return true;
        }
        parent
            .canonicalize()
            .map(|canonical| canonical == self.dir)
            .unwrap_or(false)
    }

    /// Delete `path` if it is pipeline-owned; foreign paths are left alone.
    ///
    /// Returns true when the file is gone afterwards. Exhausted retries are
    /// logged and remembered, never raised.
    pub fn discard(&mut self, path: &Path) -> bool {
        if !self.is_owned(path) {
            debug!("Keeping caller file {}", path.display());
            return false;
        }

        let attempts = self.retry.max_attempts.max(1);
        for attempt in 0..attempts {
            match fs::remove_file(path) {
                Ok(()) => return true,
                Err(e) if e.kind() == ErrorKind::NotFound => return true,
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.retry.delay_after(attempt);
                    debug!(
                        "Delete of {} failed ({}), retrying in {:?}",
                        path.display(),
                        e,
                        delay
                    );
                    thread::sleep(delay);
                }
                Err(e) => {
                    warn!(
                        "Giving up on deleting {} after {} attempts: {}",
                        path.display(),
                        attempts,
                        e
                    );
                }
            }
        }
        self.leaked.push(path.to_path_buf());
        false
    }

    /// Files that could not be deleted
    pub fn leaked(&self) -> &[PathBuf] {
        &self.leaked
    }

    /// Files currently present in the scratch directory
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Remove the whole scratch directory. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("Removed scratch directory {}", self.dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove scratch directory {}: {}",
                self.dir.display(),
                e
            ),
        }
        track_live(&self.dir, false);
        self.torn_down = true;
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for TempFileRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}
