//! The notification/launch mediator.
//!
//! After a job commits, exactly one combiner GUI instance per user must
//! learn about the new entry. A running instance listens on a Unix socket
//! inside the user's spool directory; the wire protocol is one
//! newline-terminated absolute path per message. If nothing listens, the
//! GUI is launched with the path as its first argument. Two backends
//! finishing simultaneously are serialized through an exclusive lock file
//! (`create_new`), so at most one launch wins; the loser falls back to the
//! notify path or the pending-jobs file.
//!
//! Nothing in here can fail the print job: the PDF is already durable.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::NotificationError;
use crate::spool::SpoolEntry;

/// Rendezvous socket the GUI binds inside the user's spool directory.
pub const SOCKET_FILE: &str = "gui.sock";
/// Fallback handoff file a starting GUI drains: one absolute path per line.
pub const PENDING_FILE: &str = "pending.jobs";

const LAUNCH_LOCK_FILE: &str = "gui.launch.lock";
/// A lock older than this belongs to a launcher that died; reclaim it.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// What the mediator ended up doing for a committed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// A running GUI accepted the path over the socket.
    Notified,
    /// No GUI was reachable; one was launched with the path as argument.
    Launched,
    /// Neither worked; the path was appended to the pending-jobs file.
    Queued,
}

pub struct Mediator {
    user_dir: PathBuf,
    gui_command: String,
}

impl Mediator {
    pub fn new<P: AsRef<Path>>(user_dir: P, gui_command: impl Into<String>) -> Self {
        Self {
            user_dir: user_dir.as_ref().to_path_buf(),
            gui_command: gui_command.into(),
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.user_dir.join(SOCKET_FILE)
    }

    pub fn pending_path(&self) -> PathBuf {
        self.user_dir.join(PENDING_FILE)
    }

    /// Ensures one GUI instance learns about `entry`, without blocking on
    /// GUI startup. Errors are non-fatal by contract.
    pub fn notify_or_launch(&self, entry: &SpoolEntry) -> Result<NotifyOutcome, NotificationError> {
        match self.notify(entry) {
            Ok(()) => return Ok(NotifyOutcome::Notified),
            Err(e) => debug!(error = %e, "no running combiner, trying launch"),
        }

        match self.try_launch_lock() {
            Some(_guard) => match self.spawn_gui(entry) {
                Ok(()) => Ok(NotifyOutcome::Launched),
                Err(e) => {
                    warn!(error = %e, "combiner launch failed, queueing job");
                    self.queue_pending(entry)?;
                    Ok(NotifyOutcome::Queued)
                }
            },
            None => {
                // Another backend is launching right now. Its instance may
                // already be listening; otherwise leave a breadcrumb.
                if self.notify(entry).is_ok() {
                    Ok(NotifyOutcome::Notified)
                } else {
                    self.queue_pending(entry)?;
                    Ok(NotifyOutcome::Queued)
                }
            }
        }
    }

    fn notify(&self, entry: &SpoolEntry) -> Result<(), NotificationError> {
        let path = self.socket_path();
        let unreachable = |source| NotificationError::SocketUnreachable {
            path: path.clone(),
            source,
        };

        let mut stream = UnixStream::connect(&path).map_err(unreachable)?;
        let _ = stream.set_write_timeout(Some(SOCKET_TIMEOUT));
        stream
            .write_all(entry.spool_path.as_os_str().as_bytes())
            .and_then(|_| stream.write_all(b"\n"))
            .and_then(|_| stream.flush())
            .map_err(unreachable)?;
        debug!(entry = %entry.spool_path.display(), "notified running combiner");
        Ok(())
    }

    /// Non-blocking exclusive acquisition; `create_new` is the atomic claim.
    fn try_launch_lock(&self) -> Option<LockGuard> {
        let path = self.user_dir.join(LAUNCH_LOCK_FILE);
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Some(LockGuard { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !lock_is_stale(&path) {
                        return None;
                    }
                    // Move the lock aside instead of unlinking it in place;
                    // unlinking could race another reclaimer and delete the
                    // lock that reclaimer just created.
                    let aside = self
                        .user_dir
                        .join(format!("{LAUNCH_LOCK_FILE}.{}", std::process::id()));
                    if fs::rename(&path, &aside).is_ok() {
                        if lock_is_stale(&aside) {
                            let _ = fs::remove_file(&aside);
                        } else {
                            // A contender re-created it between the check and
                            // the rename; put it back and yield.
                            let _ = fs::rename(&aside, &path);
                            return None;
                        }
                    }
                    // Re-contend for the reclaimed lock on the next pass.
                }
                Err(_) => return None,
            }
        }
        None
    }

    fn spawn_gui(&self, entry: &SpoolEntry) -> Result<(), NotificationError> {
        Command::new(&self.gui_command)
            .arg(&entry.spool_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map(|child| debug!(pid = child.id(), command = %self.gui_command, "launched combiner"))
            .map_err(|e| NotificationError::LaunchFailed {
                command: self.gui_command.clone(),
                source: e,
            })
    }

    fn queue_pending(&self, entry: &SpoolEntry) -> Result<(), NotificationError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.pending_path())
            .map_err(NotificationError::PendingFile)?;
        file.write_all(entry.spool_path.as_os_str().as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(NotificationError::PendingFile)?;
        debug!(entry = %entry.spool_path.display(), "queued for next combiner start");
        Ok(())
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
