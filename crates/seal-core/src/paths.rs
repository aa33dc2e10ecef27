use crate::error::{Result, SessionError};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "darklock";
pub const APP_NAME: &str = "seal";

pub const SESSION_DIR_ENV: &str = "SEAL_SESSION_DIR";

pub fn data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| SessionError::Settings("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

/// Platform record directory. `load_settings` applies `SEAL_SESSION_DIR` on
/// top of whatever this or the config file says.
pub fn session_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("sessions"))
}

/// Non-empty `SEAL_SESSION_DIR`, if set.
pub fn session_dir_override() -> Option<PathBuf> {
    std::env::var_os(SESSION_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}
