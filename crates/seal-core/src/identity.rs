//! Session identity: the (name, id) pair that selects both the record file
//! and the pair of key cookies.

use crate::error::{Result, SessionError};
use crate::store::{STAGING_RAND_LEN, TEMP_SUFFIX};
use std::path::{Path, PathBuf};

pub const ENC_COOKIE_PREFIX: &str = "KEY_";
pub const AUTH_COOKIE_PREFIX: &str = "AUTH_";

/// NAME_MAX on the filesystems records live on.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Bytes the atomic-write staging name `.<file>.XXXXXX.tmp` adds to the
/// record file name.
const STAGING_OVERHEAD: usize = 2 + STAGING_RAND_LEN + TEMP_SUFFIX.len();

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    session_name: String,
    session_id: String,
}

impl SessionIdentity {
    /// Validate both parts before anything touches the filesystem.
    pub fn new(session_name: &str, session_id: &str) -> Result<Self> {
        validate_session_name(session_name)?;
        validate_session_id(session_id)?;
        let staged_len = session_name.len() + 1 + session_id.len() + STAGING_OVERHEAD;
        if staged_len > MAX_FILE_NAME_LEN {
            return Err(SessionError::InvalidIdentity(format!(
                "session id too long for name {session_name:?}: at most {} chars",
                max_session_id_len(session_name)
            )));
        }
        Ok(Self {
            session_name: session_name.to_string(),
            session_id: session_id.to_string(),
        })
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// `<name>_<id>`, the record's file name inside the storage directory.
    pub fn file_name(&self) -> String {
        format!("{}_{}", self.session_name, self.session_id)
    }

    pub fn record_path(&self, storage_dir: &Path) -> PathBuf {
        storage_dir.join(self.file_name())
    }

    pub fn enc_cookie_name(&self) -> String {
        enc_cookie_name(&self.session_name)
    }

    pub fn auth_cookie_name(&self) -> String {
        auth_cookie_name(&self.session_name)
    }
}

/// Longest id whose record and staging file names still fit in a directory
/// entry next to `session_name`.
pub fn max_session_id_len(session_name: &str) -> usize {
    MAX_FILE_NAME_LEN.saturating_sub(session_name.len() + 1 + STAGING_OVERHEAD)
}

pub fn enc_cookie_name(session_name: &str) -> String {
    format!("{ENC_COOKIE_PREFIX}{session_name}")
}

pub fn auth_cookie_name(session_name: &str) -> String {
    format!("{AUTH_COOKIE_PREFIX}{session_name}")
}

pub fn validate_session_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
        return Err(SessionError::InvalidIdentity(format!(
            "session name {name:?} must be non-empty [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

// Same alphabet the common session id generators emit; rejects separators and dots.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id.len() > 256
        || !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b',' | b'-' | b'_'))
    {
        return Err(SessionError::InvalidIdentity(
            "session id must be 1-256 chars of [A-Za-z0-9,_-]".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_path_and_cookie_names() {
        let identity = SessionIdentity::new("SEALSESSID", "abc").unwrap();
        assert_eq!(identity.file_name(), "SEALSESSID_abc");
        assert_eq!(
            identity.record_path(Path::new("/var/sessions")),
            PathBuf::from("/var/sessions/SEALSESSID_abc")
        );
        assert_eq!(identity.enc_cookie_name(), "KEY_SEALSESSID");
        assert_eq!(identity.auth_cookie_name(), "AUTH_SEALSESSID");
    }

    #[test]
    fn rejects_traversal_ids() {
        for bad in ["", "../etc/passwd", "a/b", "a\\b", "..", "id.tmp", "a\0b"] {
            assert!(
                matches!(
                    SessionIdentity::new("S", bad),
                    Err(SessionError::InvalidIdentity(_))
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn id_length_is_bounded_by_file_name_limit() {
        assert_eq!(max_session_id_len("SEALSESSID"), 232);
        let longest = "a".repeat(232);
        let identity = SessionIdentity::new("SEALSESSID", &longest).unwrap();
        assert_eq!(identity.file_name().len() + STAGING_OVERHEAD, MAX_FILE_NAME_LEN);
        assert!(matches!(
            SessionIdentity::new("SEALSESSID", &"a".repeat(233)),
            Err(SessionError::InvalidIdentity(_))
        ));
        assert!(SessionIdentity::new("SEALSESSID", &"a".repeat(250)).is_err());
    }

    #[test]
    fn rejects_bad_names() {
        assert!(SessionIdentity::new("", "abc").is_err());
        assert!(SessionIdentity::new("a/b", "abc").is_err());
        assert!(SessionIdentity::new("a b", "abc").is_err());
    }
}
