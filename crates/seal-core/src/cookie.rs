//! Cookie collaborator.
//!
//! The HTTP layer owns the real cookie jar. The core only needs to look up an
//! incoming value by name and to emit a cookie, so that is all `KeyStore`
//! asks for.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attributes mirrored from the host's session cookie configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieAttributes {
    /// Seconds; 0 means the cookie lives for the browser session.
    #[serde(default)]
    pub lifetime_secs: u64,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_http_only")]
    pub http_only: bool,
}

impl Default for CookieAttributes {
    fn default() -> Self {
        Self {
            lifetime_secs: 0,
            path: default_path(),
            domain: String::new(),
            secure: false,
            http_only: default_http_only(),
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

fn default_http_only() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCookie {
    pub name: String,
    pub value: String,
    pub attributes: CookieAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl KeyCookie {
    pub fn new(name: String, value: String, attributes: &CookieAttributes) -> Self {
        let expires = match attributes.lifetime_secs {
            0 => None,
            secs => i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|d| Utc::now().checked_add_signed(d)),
        };
        Self {
            name,
            value,
            attributes: attributes.clone(),
            expires,
        }
    }

    /// An empty cookie dated an hour in the past, telling the client to drop it.
    pub fn expired(name: String, attributes: &CookieAttributes) -> Self {
        Self {
            name,
            value: String::new(),
            attributes: attributes.clone(),
            expires: Some(Utc::now() - Duration::hours(1)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires.map(|at| at <= Utc::now()).unwrap_or(false)
    }
}

pub trait KeyStore {
    /// Value of an incoming cookie, if the client sent one.
    fn get(&self, name: &str) -> Option<String>;
    /// Queue a cookie on the outgoing response.
    fn set(&mut self, cookie: KeyCookie);
}

/// Request/response cookie jar held in memory.
///
/// Emitted cookies are recorded in order and also update the jar, so a later
/// `get` in the same request sees what was just set.
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyStore {
    jar: HashMap<String, String>,
    emitted: Vec<KeyCookie>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookies<I, K, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            jar: cookies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            emitted: Vec::new(),
        }
    }

    pub fn emitted(&self) -> &[KeyCookie] {
        &self.emitted
    }

    pub fn take_emitted(&mut self) -> Vec<KeyCookie> {
        std::mem::take(&mut self.emitted)
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, name: &str) -> Option<String> {
        self.jar.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn set(&mut self, cookie: KeyCookie) {
        if cookie.is_expired() {
            self.jar.remove(&cookie.name);
        } else {
            self.jar.insert(cookie.name.clone(), cookie.value.clone());
        }
        self.emitted.push(cookie);
    }
}
