//! Host-facing session backend.
//!
//! `SessionBackend` is the usual six-callback session handler shape.
//! `SecureSessionHandler` implements it on top of the key manager, codec,
//! record store and garbage collector.

use crate::codec;
use crate::cookie::{CookieAttributes, KeyStore};
use crate::error::{Result, SessionError};
use crate::gc;
use crate::identity::{validate_session_name, SessionIdentity};
use crate::keys::{KeyManager, KeyPair};
use crate::settings::SessionSettings;
use crate::store::SessionStore;
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use zeroize::Zeroizing;

pub trait SessionBackend {
    fn open(&mut self, storage_path: &Path, session_name: &str) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    /// Decrypted payload; empty when no record exists or it cannot be trusted.
    fn read(&mut self, session_id: &str) -> Result<Zeroizing<Vec<u8>>>;
    fn write(&mut self, session_id: &str, data: &[u8]) -> Result<()>;
    /// Succeeds when there was nothing to remove.
    fn destroy(&mut self, session_id: &str) -> Result<()>;
    /// Number of records removed.
    fn gc(&mut self, max_age: Duration) -> Result<usize>;
}

struct OpenState {
    store: SessionStore,
    session_name: String,
    keys: Option<KeyPair>,
}

pub struct SecureSessionHandler<K, R = OsRng> {
    key_store: K,
    key_manager: KeyManager<R>,
    cookie: CookieAttributes,
    atomic_writes: bool,
    state: Option<OpenState>,
}

impl<K: KeyStore> SecureSessionHandler<K, OsRng> {
    pub fn new(key_store: K, settings: &SessionSettings) -> Self {
        Self::with_rng(key_store, settings, OsRng)
    }
}

impl<K: KeyStore, R: RngCore + CryptoRng> SecureSessionHandler<K, R> {
    pub fn with_rng(key_store: K, settings: &SessionSettings, rng: R) -> Self {
        Self {
            key_store,
            key_manager: KeyManager::with_rng(rng),
            cookie: settings.cookie.clone(),
            atomic_writes: settings.atomic_writes,
            state: None,
        }
    }

    pub fn key_store(&self) -> &K {
        &self.key_store
    }

    pub fn key_store_mut(&mut self) -> &mut K {
        &mut self.key_store
    }

    pub fn into_key_store(self) -> K {
        self.key_store
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn identity(&self, session_id: &str) -> Result<SessionIdentity> {
        let state = self.state.as_ref().ok_or(SessionError::NotOpen)?;
        SessionIdentity::new(&state.session_name, session_id)
    }

    /// Pair from the cookies, or a fresh one. Malformed cookie keys are
    /// replaced; whatever they protected becomes unreadable.
    fn load_or_issue_keys(&mut self, session_name: &str) -> Result<KeyPair> {
        match self
            .key_manager
            .ensure_keys(session_name, &mut self.key_store, &self.cookie)
        {
            Ok(keys) => Ok(keys),
            Err(SessionError::InvalidKey(reason)) => {
                warn!(session = session_name, %reason, "discarding malformed key cookies");
                self.key_manager
                    .issue(session_name, &mut self.key_store, &self.cookie)
            }
            Err(e) => Err(e),
        }
    }

    /// Pair cached at open. Only re-ensured after a destroy dropped it.
    fn keys_for(&mut self) -> Result<KeyPair> {
        let state = self.state.as_ref().ok_or(SessionError::NotOpen)?;
        if let Some(keys) = &state.keys {
            return Ok(keys.clone());
        }
        let session_name = state.session_name.clone();
        let keys = self.load_or_issue_keys(&session_name)?;
        if let Some(state) = self.state.as_mut() {
            state.keys = Some(keys.clone());
        }
        Ok(keys)
    }

    fn store(&self) -> Result<&SessionStore> {
        self.state
            .as_ref()
            .map(|s| &s.store)
            .ok_or(SessionError::NotOpen)
    }
}

impl<K: KeyStore, R: RngCore + CryptoRng> SessionBackend for SecureSessionHandler<K, R> {
    fn open(&mut self, storage_path: &Path, session_name: &str) -> Result<()> {
        validate_session_name(session_name)?;
        let store = SessionStore::new(storage_path, self.atomic_writes);
        store.ensure_dir()?;
        let keys = self.load_or_issue_keys(session_name)?;
        self.state = Some(OpenState {
            store,
            session_name: session_name.to_string(),
            keys: Some(keys),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state = None;
        Ok(())
    }

    fn read(&mut self, session_id: &str) -> Result<Zeroizing<Vec<u8>>> {
        let identity = self.identity(session_id)?;
        let keys = self.keys_for()?;
        let loaded = self
            .store()?
            .load(&identity)
            .and_then(|record| record.map(|r| codec::decrypt(&r, &keys)).transpose());
        match loaded {
            Ok(Some(plaintext)) => Ok(plaintext),
            Ok(None) => Ok(Zeroizing::new(Vec::new())),
            Err(SessionError::AuthenticationFailure) => {
                warn!(file = %identity.file_name(), "session record failed authentication; serving empty session");
                Ok(Zeroizing::new(Vec::new()))
            }
            Err(SessionError::Storage { path, source }) => {
                warn!(path = %path.display(), error = %source, "cannot read session record; serving empty session");
                Ok(Zeroizing::new(Vec::new()))
            }
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, session_id: &str, data: &[u8]) -> Result<()> {
        let identity = self.identity(session_id)?;
        let keys = self.keys_for()?;
        let record = codec::encrypt(data, &keys, self.key_manager.rng_mut())?;
        self.store()?.save(&identity, &record)
    }

    fn destroy(&mut self, session_id: &str) -> Result<()> {
        let identity = self.identity(session_id)?;
        self.key_manager
            .expire(identity.session_name(), &mut self.key_store, &self.cookie);
        if let Some(state) = self.state.as_mut() {
            state.keys = None;
        }
        self.store()?.remove(&identity)
    }

    fn gc(&mut self, max_age: Duration) -> Result<usize> {
        let state = self.state.as_ref().ok_or(SessionError::NotOpen)?;
        gc::sweep(state.store.storage_dir(), &state.session_name, max_age)
    }
}
