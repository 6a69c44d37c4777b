//! The job spool store: durable, atomically-visible persistence of print
//! jobs under one private directory per user.
//!
//! Writes go to dot-prefixed temporary files created with `create_new`
//! (O_EXCL), so concurrent jobs can never share a write target. The rename
//! in [`WriteHandle::commit`] is the atomicity boundary: readers either see
//! a complete committed entry or nothing. A dropped handle removes its
//! temporaries, so a killed backend leaves no artifact under a final name.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SpoolError;
use crate::sanitize;

/// Committed entries carry this extension; anything dot-prefixed in a spool
/// directory is a temporary and never an entry.
pub const SPOOL_SUFFIX: &str = "pdf";

/// Creation attempts before giving up on a non-colliding temporary name.
const MAX_TOKEN_ATTEMPTS: usize = 16;

/// A committed spool artifact. Immutable once visible; consumed and deleted
/// by the combiner GUI (or retention cleanup) via [`SpoolStore::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolEntry {
    /// Final location of the converted PDF inside the user's spool dir.
    pub spool_path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Back-reference to the originating scheduler job id (lookup only).
    pub source_job_id: String,
}

pub struct SpoolStore {
    root: PathBuf,
}

impl SpoolStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The private spool directory for one user. Callers must pass a user
    /// name already validated against path traversal (see `PrintJob`).
    pub fn user_dir(&self, owning_user: &str) -> PathBuf {
        self.root.join(owning_user)
    }

    /// Opens a write handle for a new job. Creates the user's directory on
    /// demand (idempotent under concurrent first use) and a temporary file
    /// whose name is derived from a random token — never from the title.
    pub fn begin(
        &self,
        owning_user: &str,
        job_id: &str,
        title: &str,
    ) -> Result<WriteHandle, SpoolError> {
        let dir = self.user_dir(owning_user);
        ensure_private_directory(&dir)?;

        let created_at = Utc::now();
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        // The id component must stay underscore-free so `job_id_from_name`
        // can split the final name unambiguously.
        let safe_id = sanitize::safe_title(job_id).replace('_', "-");
        let safe_title = sanitize::safe_title(title);

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = short_token();
            let raw_path = dir.join(format!(".{token}.raw.tmp"));

            // create_new is the atomic claim on the token.
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&raw_path)
            {
                Ok(file) => {
                    restrict_permissions(&raw_path);
                    let pdf_tmp_path = dir.join(format!(".{token}.pdf.tmp"));
                    let final_path =
                        dir.join(format!("{stamp}_{safe_id}_{safe_title}_{token}.{SPOOL_SUFFIX}"));
                    debug!(temp = %raw_path.display(), "opened spool temporary");
                    return Ok(WriteHandle {
                        file: Some(file),
                        raw_path,
                        pdf_tmp_path,
                        final_path,
                        job_id: job_id.to_string(),
                        created_at,
                        bytes_written: 0,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(SpoolError::OpenFile {
                        path: raw_path,
                        source: e,
                    })
                }
            }
        }

        Err(SpoolError::OpenFile {
            path: dir.join(".<token>.raw.tmp"),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "could not find a free temporary name",
            ),
        })
    }

    /// Lists committed entries for one user, oldest first. A missing
    /// directory means no jobs yet, not an error.
    pub fn entries(&self, owning_user: &str) -> Result<Vec<SpoolEntry>, SpoolError> {
        let dir = self.user_dir(owning_user);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SpoolError::ListDirectory {
                    path: dir,
                    source: e,
                })
            }
        };

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| SpoolError::ListDirectory {
                path: dir.clone(),
                source: e,
            })?;
            let name = item.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') || !name.ends_with(&format!(".{SPOOL_SUFFIX}")) {
                continue;
            }
            let created_at = item
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            entries.push(SpoolEntry {
                spool_path: item.path(),
                created_at,
                source_job_id: job_id_from_name(name),
            });
        }

        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.spool_path.cmp(&b.spool_path))
        });
        Ok(entries)
    }

    /// Deletes a consumed entry.
    pub fn remove(&self, entry: &SpoolEntry) -> Result<(), SpoolError> {
        fs::remove_file(&entry.spool_path).map_err(|e| SpoolError::RemoveEntry {
            path: entry.spool_path.clone(),
            source: e,
        })
    }
}

/// In-flight spool write for one job. Holds two temporaries in the target
/// directory: the raw payload and the converted PDF. Dropping the handle
/// without committing removes both.
pub struct WriteHandle {
    file: Option<File>,
    raw_path: PathBuf,
    pdf_tmp_path: PathBuf,
    final_path: PathBuf,
    job_id: String,
    created_at: DateTime<Utc>,
    bytes_written: u64,
}

impl WriteHandle {
    /// Appends payload bytes to the raw temporary.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), SpoolError> {
        let file = self.file.as_mut().ok_or_else(|| SpoolError::WriteFile {
            path: self.raw_path.clone(),
            source: std::io::Error::other("payload already finished"),
        })?;
        file.write_all(bytes).map_err(|e| SpoolError::WriteFile {
            path: self.raw_path.clone(),
            source: e,
        })?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Flushes and fsyncs the raw payload, closing it for writing. Returns
    /// the path the converter should read from.
    pub fn finish_payload(&mut self) -> Result<&Path, SpoolError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .and_then(|_| file.sync_all())
                .map_err(|e| SpoolError::WriteFile {
                    path: self.raw_path.clone(),
                    source: e,
                })?;
        }
        Ok(&self.raw_path)
    }

    /// Where the converter must place the canonical PDF before `commit`.
    pub fn converted_path(&self) -> &Path {
        &self.pdf_tmp_path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Publishes the converted PDF under its final name. The rename is the
    /// only step that makes the entry visible; on any failure both
    /// temporaries are removed and nothing appears under the final name.
    pub fn commit(mut self) -> Result<SpoolEntry, SpoolError> {
        self.finish_payload()?;

        // The converted temp must exist and be durable before it is exposed.
        File::open(&self.pdf_tmp_path)
            .and_then(|f| f.sync_all())
            .map_err(|e| SpoolError::Commit {
                from: self.pdf_tmp_path.clone(),
                to: self.final_path.clone(),
                source: e,
            })?;

        fs::rename(&self.pdf_tmp_path, &self.final_path).map_err(|e| SpoolError::Commit {
            from: self.pdf_tmp_path.clone(),
            to: self.final_path.clone(),
            source: e,
        })?;
        restrict_permissions(&self.final_path);
        sync_parent_dir(&self.final_path);

        debug!(entry = %self.final_path.display(), bytes = self.bytes_written, "committed spool entry");
        Ok(SpoolEntry {
            spool_path: self.final_path.clone(),
            created_at: self.created_at,
            source_job_id: self.job_id.clone(),
        })
        // Drop removes the raw temporary; the pdf temp was renamed away.
    }

    /// Discards the in-flight job. Always safe, even mid-write.
    pub fn abort(self) {
        // Drop does the cleanup.
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        self.file.take();
        let _ = fs::remove_file(&self.raw_path);
        let _ = fs::remove_file(&self.pdf_tmp_path);
    }
}

fn short_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// `20260830_143012_7_Report_ab12cd34.pdf` → `7`. Lookup only; the id
/// component is written underscore-free (`begin` maps `_` to `-`), so
/// the split is unambiguous, but a rewritten id will not round-trip
/// exactly.
fn job_id_from_name(name: &str) -> String {
    name.split('_').nth(2).unwrap_or("").to_string()
}

fn ensure_private_directory(path: &Path) -> Result<(), SpoolError> {
    fs::create_dir_all(path).map_err(|e| SpoolError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Pre-existing dirs owned by another account can refuse this; the
        // installer is responsible for ownership, so don't fail the job.
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
            warn!(dir = %path.display(), error = %e, "could not restrict spool dir permissions");
        }
    }
    Ok(())
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(file = %path.display(), error = %e, "could not restrict spool file permissions");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Best-effort directory fsync so the rename itself survives a crash.
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn commit_one(store: &SpoolStore, user: &str, job_id: &str, data: &[u8]) -> SpoolEntry {
        let mut handle = store.begin(user, job_id, "Report").unwrap();
        handle.write_all(data).unwrap();
        let raw = handle.finish_payload().unwrap().to_path_buf();
        // Stand in for the converter: raw bytes become the "PDF".
        fs::copy(&raw, handle.converted_path()).unwrap();
        handle.commit().unwrap()
    }

    #[test]
    fn test_commit_makes_entry_visible() {
        let tmp = TempDir::new().unwrap();
        let store = SpoolStore::new(tmp.path());
        let entry = commit_one(&store, "alice", "7", b"%PDF-1.7 data");

        assert!(entry.spool_path.exists());
        assert_eq!(entry.source_job_id, "7");
        assert_eq!(fs::read(&entry.spool_path).unwrap(), b"%PDF-1.7 data");
        assert_eq!(entry.spool_path.extension().unwrap(), SPOOL_SUFFIX);
    }

    #[test]
    fn test_dropped_handle_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = SpoolStore::new(tmp.path());
        {
            let mut handle = store.begin("alice", "7", "Report").unwrap();
            handle.write_all(b"partial").unwrap();
            // Killed mid-job: handle dropped without commit.
        }
        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("alice"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_abort_discards_temporaries() {
        let tmp = TempDir::new().unwrap();
        let store = SpoolStore::new(tmp.path());
        let mut handle = store.begin("alice", "7", "Report").unwrap();
        handle.write_all(b"partial").unwrap();
        handle.abort();
        assert!(store.entries("alice").unwrap().is_empty());
    }

    #[test]
    fn test_entries_skip_temporaries_and_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let store = SpoolStore::new(tmp.path());
        assert!(store.entries("nobody").unwrap().is_empty());

        let _live = store.begin("alice", "9", "in-flight").unwrap();
        let entry = commit_one(&store, "alice", "7", b"data");
        let listed = store.entries("alice").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].spool_path, entry.spool_path);
    }

    #[test]
    fn test_remove_deletes_entry() {
        let tmp = TempDir::new().unwrap();
        let store = SpoolStore::new(tmp.path());
        let entry = commit_one(&store, "alice", "7", b"data");
        store.remove(&entry).unwrap();
        assert!(store.entries("alice").unwrap().is_empty());
    }

    #[test]
    fn test_title_never_escapes_user_dir() {
        let tmp = TempDir::new().unwrap();
        let store = SpoolStore::new(tmp.path());
        let entry = commit_one_with_title(&store, "alice", "../../../etc/cron.d/evil");
        assert!(entry.spool_path.starts_with(store.user_dir("alice")));
    }

    fn commit_one_with_title(store: &SpoolStore, user: &str, title: &str) -> SpoolEntry {
        let mut handle = store.begin(user, "7", title).unwrap();
        handle.write_all(b"data").unwrap();
        let raw = handle.finish_payload().unwrap().to_path_buf();
        fs::copy(&raw, handle.converted_path()).unwrap();
        handle.commit().unwrap()
    }

    #[test]
    fn test_underscore_in_job_id_recovers_whole_id() {
        let tmp = TempDir::new().unwrap();
        let store = SpoolStore::new(tmp.path());
        // Scheduler ids are free-form; underscores must not collide with
        // the name's field separators.
        let entry = commit_one(&store, "alice", "batch_42_final", b"data");
        assert_eq!(entry.source_job_id, "batch_42_final");

        let listed = store.entries("alice").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].source_job_id, "batch-42-final");
    }

    #[test]
    fn test_concurrent_jobs_get_distinct_names() {
        let tmp = TempDir::new().unwrap();
        let store = SpoolStore::new(tmp.path());
        let a = store.begin("bob", "1", "same title").unwrap();
        let b = store.begin("bob", "1", "same title").unwrap();
        assert_ne!(a.converted_path(), b.converted_path());
    }
}
