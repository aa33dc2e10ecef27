use crate::cookie::CookieAttributes;
use crate::error::{Result, SessionError};
use crate::identity::validate_session_name;
use crate::paths::{session_dir, session_dir_override};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SESSION_NAME: &str = "SEALSESSID";
pub const DEFAULT_GC_MAX_AGE_SECS: u64 = 1440;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default = "default_session_name")]
    pub session_name: String,
    /// Temp file + rename instead of overwriting the record in place.
    #[serde(default = "default_atomic_writes")]
    pub atomic_writes: bool,
    #[serde(default = "default_gc_max_age_secs")]
    pub gc_max_age_secs: u64,
    #[serde(default)]
    pub cookie: CookieAttributes,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            session_name: default_session_name(),
            atomic_writes: default_atomic_writes(),
            gc_max_age_secs: default_gc_max_age_secs(),
            cookie: CookieAttributes::default(),
        }
    }
}

impl SessionSettings {
    pub fn gc_max_age(&self) -> Duration {
        Duration::from_secs(self.gc_max_age_secs)
    }

    pub fn validate(&self) -> Result<()> {
        validate_session_name(&self.session_name)?;
        if self.gc_max_age_secs == 0 {
            return Err(SessionError::Settings(
                "gc_max_age_secs must be greater than zero".into(),
            ));
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err(SessionError::Settings("storage_dir is empty".into()));
        }
        Ok(())
    }
}

fn default_storage_dir() -> PathBuf {
    session_dir().unwrap_or_else(|_| std::env::temp_dir().join("seal-sessions"))
}

fn default_session_name() -> String {
    DEFAULT_SESSION_NAME.to_string()
}

fn default_atomic_writes() -> bool {
    true
}

fn default_gc_max_age_secs() -> u64 {
    DEFAULT_GC_MAX_AGE_SECS
}

/// Load settings from a JSON file (or defaults), then apply the
/// `SEAL_SESSION_DIR` override and validate.
pub fn load_settings(path: Option<&Path>) -> Result<SessionSettings> {
    let mut settings = match path {
        Some(path) => {
            let data = std::fs::read(path).map_err(|e| SessionError::storage(path, e))?;
            serde_json::from_slice::<SessionSettings>(&data)?
        }
        None => SessionSettings::default(),
    };
    if let Some(dir) = session_dir_override() {
        settings.storage_dir = dir;
    }
    settings.validate()?;
    Ok(settings)
}
