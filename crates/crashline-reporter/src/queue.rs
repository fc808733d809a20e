//! Filesystem-backed crash file queue
//!
//! Every undelivered crash is one opaque file directly under the
//! crash-storage root, named after a monotonic timestamp so that name
//! order is discovery order:
//!
//! ```text
//! <root>/
//! ├── 01729238400123456789      # raw dump, one per undelivered crash
//! ├── 01729238400987654321
//! └── crashline.analyzer        # zero-byte marker, only during extraction
//! ```
//!
//! The directory is authoritative across restarts; [`CrashFileQueue`] only
//! keeps an in-memory projection that [`CrashFileQueue::refresh`] rebuilds.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, instrument, warn};

use crashline_core::domain::UserReport;
use crashline_core::ports::{CaptureBackend, CrashFormatter};

use crate::error::ReporterError;

/// Name of the marker present while a dump is being extracted.
pub const MARKER_FILE_NAME: &str = "crashline.analyzer";

/// Suffixes of files that live in the root but are never queued:
/// marker, descriptor, property list, raw capture data, metadata, and
/// temporaries of in-flight atomic writes.
pub const RESERVED_SUFFIXES: &[&str] = &[".analyzer", ".desc", ".plist", ".data", ".meta", ".tmp"];

/// Operating-system housekeeping files.
pub const HOUSEKEEPING_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".directory"];

/// Returns true if `name` may be a queued crash file
pub fn is_eligible_name(name: &str) -> bool {
    !name.is_empty()
        && !HOUSEKEEPING_FILES.contains(&name)
        && !RESERVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Lists the queued crash files under `dir`, oldest first.
///
/// Only non-empty regular files with an eligible name are returned. A
/// missing directory is an empty queue. Has no side effects.
pub fn scan(dir: &Path) -> Result<Vec<PathBuf>, ReporterError> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ReporterError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| ReporterError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_eligible_name(&name) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            // Deleted between listing and stat.
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(ReporterError::io(entry.path(), e)),
        };
        if metadata.is_file() && metadata.len() > 0 {
            files.push(entry.path());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Result of pulling a pending dump from the capture backend
#[derive(Debug, Clone)]
pub struct ExtractedDump {
    /// Where the dump now lives in the queue
    pub path: PathBuf,
    /// Report projected from the dump, if it could be formatted
    pub last_session: Option<UserReport>,
}

/// Ordered queue of crash files plus the extraction marker
#[derive(Debug)]
pub struct CrashFileQueue {
    root: PathBuf,
    files: Vec<PathBuf>,
    last_stamp: u128,
}

impl CrashFileQueue {
    /// Creates a queue over `root`; nothing is read until [`refresh`](Self::refresh).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
            last_stamp: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Rebuilds the in-memory projection from disk
    pub fn refresh(&mut self) -> Result<&[PathBuf], ReporterError> {
        self.files = scan(&self.root)?;
        debug!(root = %self.root.display(), count = self.files.len(), "Crash queue refreshed");
        Ok(&self.files)
    }

    // ========================================================================
    // Marker
    // ========================================================================

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(MARKER_FILE_NAME)
    }

    pub fn marker_exists(&self) -> bool {
        self.marker_path().exists()
    }

    fn create_marker(&self) -> Result<(), ReporterError> {
        let marker = self.marker_path();
        std::fs::File::create(&marker).map_err(|e| ReporterError::io(&marker, e))?;
        Ok(())
    }

    /// Deletes the marker; an absent marker is success
    pub fn remove_marker(&self) -> Result<(), ReporterError> {
        remove_if_present(&self.marker_path())
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Moves the capture backend's pending dump into the queue.
    ///
    /// Extraction is at-most-once: once the bytes are persisted, the
    /// marker is removed and the backend's pending state purged whether or
    /// not the dump could be formatted for the last-session report.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn enqueue_from_capture(
        &mut self,
        capture: &dyn CaptureBackend,
        formatter: &dyn CrashFormatter,
    ) -> Result<Option<ExtractedDump>, ReporterError> {
        if !capture.has_pending_dump() {
            debug!("No pending dump");
            return Ok(None);
        }
        if self.marker_exists() {
            warn!("Extraction already in progress, not starting another");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.root).map_err(|e| ReporterError::io(&self.root, e))?;
        self.create_marker()?;

        let bytes = match capture.load_pending_dump() {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                warn!("Pending dump is empty, purging it");
                self.finish_extraction(capture);
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "Pending dump unreadable, purging it");
                self.finish_extraction(capture);
                return Ok(None);
            }
        };

        let path = match self.write_dump(&bytes) {
            Ok(path) => path,
            Err(e) => {
                // Leave the dump with the backend so the next launch retries.
                let _ = self.remove_marker();
                return Err(e);
            }
        };

        let last_session = match formatter.format(&bytes) {
            Ok(log) => Some(formatter.to_user_report(&log)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not format last-session crash");
                None
            }
        };

        self.finish_extraction(capture);
        self.files.push(path.clone());
        info!(path = %path.display(), bytes = bytes.len(), "Queued crash from previous session");

        Ok(Some(ExtractedDump { path, last_session }))
    }

    fn finish_extraction(&self, capture: &dyn CaptureBackend) {
        if let Err(e) = self.remove_marker() {
            warn!(error = %e, "Failed to remove analyzer marker");
        }
        if let Err(e) = capture.purge_pending_dump() {
            warn!(error = %e, "Failed to purge pending dump");
        }
    }

    // Write to a sibling temporary file then rename into place.
    fn write_dump(&mut self, bytes: &[u8]) -> Result<PathBuf, ReporterError> {
        let path = self.next_dump_path();
        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        std::fs::write(&tmp_path, bytes).map_err(|e| ReporterError::io(&tmp_path, e))?;
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(ReporterError::io(&path, e));
        }
        Ok(path)
    }

    /// Next unused dump path, strictly newer than any timestamp name on
    /// disk or handed out before
    ///
    /// Reads the directory rather than the projection, which is still
    /// empty when extraction runs at enable.
    fn next_dump_path(&mut self) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let on_disk = scan(&self.root).unwrap_or_else(|e| {
            warn!(error = %e, "Could not list crash root, ordering by known files");
            self.files.clone()
        });
        let newest_queued = on_disk
            .iter()
            .chain(&self.files)
            .filter_map(|p| p.file_name()?.to_str()?.parse::<u128>().ok())
            .max()
            .unwrap_or(0);

        let mut stamp = now.max(self.last_stamp + 1).max(newest_queued + 1);
        loop {
            let path = self.root.join(format!("{stamp:020}"));
            if !path.exists() {
                self.last_stamp = stamp;
                return path;
            }
            stamp += 1;
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Deletes a crash file and drops it from the queue.
    ///
    /// A file that is already gone counts as removed. The record leaves the
    /// in-memory queue even when deletion fails.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn remove(&mut self, path: &Path) -> Result<(), ReporterError> {
        self.files.retain(|p| p != path);
        remove_if_present(path)
    }

    /// Deletes every queued file, continuing past failures.
    ///
    /// Returns the number of files deleted.
    pub fn purge_all(&mut self) -> usize {
        let mut targets = std::mem::take(&mut self.files);
        match scan(&self.root) {
            Ok(on_disk) => targets.extend(on_disk),
            Err(e) => warn!(error = %e, "Could not list crash root during purge"),
        }
        targets.sort();
        targets.dedup();

        let mut deleted = 0;
        for path in &targets {
            match remove_if_present(path) {
                Ok(()) => deleted += 1,
                Err(e) => warn!(error = %e, "Failed to delete crash file"),
            }
        }
        info!(count = deleted, "Purged crash files");
        deleted
    }
}

/// Deletes `path`, treating an absent file as success
fn remove_if_present(path: &Path) -> Result<(), ReporterError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ReporterError::io(path, e)),
    }
}
