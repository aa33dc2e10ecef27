use crate::error::{Result, SessionError};
use crate::identity::validate_session_name;
use crate::store::TEMP_SUFFIX;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Remove records for `session_name` whose modification time is older than
/// `max_age`, plus staging files left behind by interrupted atomic writes.
///
/// Best effort: per-file failures are logged and skipped. Only a failure to
/// list the directory itself is returned.
pub fn sweep(storage_dir: &Path, session_name: &str, max_age: Duration) -> Result<usize> {
    sweep_at(storage_dir, session_name, max_age, SystemTime::now())
}

pub fn sweep_at(
    storage_dir: &Path,
    session_name: &str,
    max_age: Duration,
    now: SystemTime,
) -> Result<usize> {
    sweep_with(storage_dir, session_name, max_age, now, |path| fs::remove_file(path))
}

fn sweep_with<F>(
    storage_dir: &Path,
    session_name: &str,
    max_age: Duration,
    now: SystemTime,
    mut remove: F,
) -> Result<usize>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    validate_session_name(session_name)?;
    let record_prefix = format!("{session_name}_");
    let staging_prefix = format!(".{session_name}_");

    let entries = match fs::read_dir(storage_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(SessionError::storage(storage_dir, e)),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_record = name.starts_with(&record_prefix);
        let is_staging = name.starts_with(&staging_prefix) && name.ends_with(TEMP_SUFFIX);
        if !is_record && !is_staging {
            continue;
        }

        let path = entry.path();
        let modified = match entry.metadata().and_then(|m| {
            if m.is_file() {
                m.modified()
            } else {
                Err(ErrorKind::InvalidInput.into())
            }
        }) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::InvalidInput => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "gc: cannot stat session file");
                continue;
            }
        };

        let expired = modified
            .checked_add(max_age)
            .map(|deadline| deadline < now)
            .unwrap_or(false);
        if !expired {
            continue;
        }

        match remove(&path) {
            Ok(()) => {
                if is_staging {
                    warn!(path = %path.display(), "gc: removed orphaned staging file");
                }
                removed += 1;
            }
            // Already gone: another sweeper or a destroy got there first.
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "gc: cannot remove session file"),
        }
    }

    info!(
        dir = %storage_dir.display(),
        session = session_name,
        removed,
        "session gc sweep finished"
    );
    Ok(removed)
}
