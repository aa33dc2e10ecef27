use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// MAC mismatch, malformed record or bad padding. Deliberately carries no
    /// detail so callers cannot tell the cases apart.
    #[error("session record failed authentication")]
    AuthenticationFailure,

    #[error("secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid session identity: {0}")]
    InvalidIdentity(String),

    #[error("session backend not opened")]
    NotOpen,

    #[error("settings error: {0}")]
    Settings(String),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl SessionError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SessionError::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
