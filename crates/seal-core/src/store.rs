use crate::error::{Result, SessionError};
use crate::identity::SessionIdentity;
use crate::record::SessionRecord;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub(crate) const TEMP_SUFFIX: &str = ".tmp";
/// Random characters tempfile puts between the staging prefix and suffix.
pub(crate) const STAGING_RAND_LEN: usize = 6;

/// Flat-file persistence for session records, one file per identity at
/// `<storage_dir>/<name>_<id>`.
///
/// No locking is done here; concurrent writers to the same id race and the
/// last rename (or overwrite) wins.
#[derive(Debug, Clone)]
pub struct SessionStore {
    storage_dir: PathBuf,
    atomic_writes: bool,
}

impl SessionStore {
    pub fn new(storage_dir: impl Into<PathBuf>, atomic_writes: bool) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            atomic_writes,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn atomic_writes(&self) -> bool {
        self.atomic_writes
    }

    /// Create the storage directory if needed, owner-only on Unix.
    pub fn ensure_dir(&self) -> Result<()> {
        if self.storage_dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.storage_dir)
            .map_err(|e| SessionError::storage(&self.storage_dir, e))?;
        restrict_dir_permissions(&self.storage_dir);
        Ok(())
    }

    pub fn path_for(&self, identity: &SessionIdentity) -> PathBuf {
        identity.record_path(&self.storage_dir)
    }

    /// `Ok(None)` when no record exists yet. A file that is present but does
    /// not parse is `AuthenticationFailure`.
    pub fn load(&self, identity: &SessionIdentity) -> Result<Option<SessionRecord>> {
        let path = self.path_for(identity);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(SessionError::AuthenticationFailure)
            }
            Err(e) => return Err(SessionError::storage(path, e)),
        };
        SessionRecord::parse(&text).map(Some)
    }

    pub fn save(&self, identity: &SessionIdentity, record: &SessionRecord) -> Result<()> {
        let path = self.path_for(identity);
        let text = record.to_text();
        if self.atomic_writes {
            self.write_atomic(identity, &path, text.as_bytes())?;
        } else {
            write_in_place(&path, text.as_bytes())?;
        }
        debug!(file = %identity.file_name(), bytes = text.len(), "session record written");
        Ok(())
    }

    /// Remove the record. A missing file is not an error.
    pub fn remove(&self, identity: &SessionIdentity) -> Result<()> {
        let path = self.path_for(identity);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::storage(path, e)),
        }
    }

    fn write_atomic(&self, identity: &SessionIdentity, dest: &Path, bytes: &[u8]) -> Result<()> {
        let staging_prefix = format!(".{}.", identity.file_name());
        let mut staging = tempfile::Builder::new()
            .prefix(&staging_prefix)
            .rand_bytes(STAGING_RAND_LEN)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.storage_dir)
            .map_err(|e| SessionError::storage(&self.storage_dir, e))?;
        staging
            .write_all(bytes)
            .and_then(|_| staging.as_file().sync_all())
            .map_err(|e| SessionError::storage(staging.path(), e))?;
        staging
            .persist(dest)
            .map_err(|e| SessionError::storage(dest, e.error))?;
        fsync_dir(&self.storage_dir);
        Ok(())
    }
}

fn write_in_place(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|e| SessionError::storage(path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| SessionError::storage(path, e))
}

fn restrict_dir_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
}

fn fsync_dir(path: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = fs::File::open(path).and_then(|dir| dir.sync_all()) {
            warn!("cannot fsync {}: {}", path.display(), e);
        }
    }
}
