use crate::cookie::{CookieAttributes, KeyCookie, KeyStore};
use crate::error::{Result, SessionError};
use crate::identity::{auth_cookie_name, enc_cookie_name};
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256 key length.
pub const ENC_KEY_LEN: usize = 32;
/// HMAC-SHA256 key length.
pub const AUTH_KEY_LEN: usize = 32;

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    enc_key: [u8; ENC_KEY_LEN],
    auth_key: [u8; AUTH_KEY_LEN],
}

impl KeyPair {
    pub fn from_bytes(enc_key: [u8; ENC_KEY_LEN], auth_key: [u8; AUTH_KEY_LEN]) -> Self {
        Self { enc_key, auth_key }
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let mut pair = Self {
            enc_key: [0u8; ENC_KEY_LEN],
            auth_key: [0u8; AUTH_KEY_LEN],
        };
        fill_random(rng, &mut pair.enc_key)?;
        fill_random(rng, &mut pair.auth_key)?;
        Ok(pair)
    }

    /// Decode the base64 cookie values. Wrong lengths are rejected rather
    /// than truncated or padded.
    pub fn from_encoded(enc_b64: &str, auth_b64: &str) -> Result<Self> {
        Ok(Self {
            enc_key: decode_key::<ENC_KEY_LEN>(enc_b64, "encryption")?,
            auth_key: decode_key::<AUTH_KEY_LEN>(auth_b64, "authentication")?,
        })
    }

    pub fn enc_key(&self) -> &[u8; ENC_KEY_LEN] {
        &self.enc_key
    }

    pub fn auth_key(&self) -> &[u8; AUTH_KEY_LEN] {
        &self.auth_key
    }

    pub fn encoded_enc_key(&self) -> Zeroizing<String> {
        Zeroizing::new(general_purpose::STANDARD.encode(self.enc_key))
    }

    pub fn encoded_auth_key(&self) -> Zeroizing<String> {
        Zeroizing::new(general_purpose::STANDARD.encode(self.auth_key))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}

fn decode_key<const N: usize>(encoded: &str, which: &str) -> Result<[u8; N]> {
    let decoded = Zeroizing::new(
        general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| SessionError::InvalidKey(format!("{which} key: {e}")))?,
    );
    if decoded.len() != N {
        return Err(SessionError::InvalidKey(format!(
            "{which} key must be {N} bytes, got {}",
            decoded.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&decoded);
    Ok(out)
}

/// Fill `buf` from a CSPRNG. There is no fallback source.
pub fn fill_random<R: RngCore + CryptoRng>(rng: &mut R, buf: &mut [u8]) -> Result<()> {
    rng.try_fill_bytes(buf)
        .map_err(|e| SessionError::RandomnessUnavailable(e.to_string()))
}

/// Issues or recovers the per-session key pair carried in the `KEY_`/`AUTH_`
/// cookies.
pub struct KeyManager<R = OsRng> {
    rng: R,
}

impl KeyManager<OsRng> {
    pub fn new() -> Self {
        Self { rng: OsRng }
    }
}

impl Default for KeyManager<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore + CryptoRng> KeyManager<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Return the pair stored in the client's cookies, or generate and emit a
    /// new one when either cookie is missing. Cookie names depend only on the
    /// session name, so one pair covers every id under it.
    pub fn ensure_keys<K: KeyStore + ?Sized>(
        &mut self,
        session_name: &str,
        store: &mut K,
        attributes: &CookieAttributes,
    ) -> Result<KeyPair> {
        let enc = store.get(&enc_cookie_name(session_name)).map(Zeroizing::new);
        let auth = store.get(&auth_cookie_name(session_name)).map(Zeroizing::new);
        match (enc, auth) {
            (Some(enc), Some(auth)) => KeyPair::from_encoded(&enc, &auth),
            _ => self.issue(session_name, store, attributes),
        }
    }

    /// Generate a fresh pair and emit both cookies with the caller's attributes.
    pub fn issue<K: KeyStore + ?Sized>(
        &mut self,
        session_name: &str,
        store: &mut K,
        attributes: &CookieAttributes,
    ) -> Result<KeyPair> {
        let keys = KeyPair::generate(&mut self.rng)?;
        store.set(KeyCookie::new(
            enc_cookie_name(session_name),
            keys.encoded_enc_key().to_string(),
            attributes,
        ));
        store.set(KeyCookie::new(
            auth_cookie_name(session_name),
            keys.encoded_auth_key().to_string(),
            attributes,
        ));
        debug!(session = session_name, "issued new session key pair");
        Ok(keys)
    }

    /// Tell the client to drop both key cookies.
    pub fn expire<K: KeyStore + ?Sized>(
        &self,
        session_name: &str,
        store: &mut K,
        attributes: &CookieAttributes,
    ) {
        store.set(KeyCookie::expired(enc_cookie_name(session_name), attributes));
        store.set(KeyCookie::expired(auth_cookie_name(session_name), attributes));
    }

    pub(crate) fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cookie::MemoryKeyStore;
    use std::collections::HashSet;

    /// RNG that always reports failure, standing in for a missing OS source.
    pub(crate) struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            unreachable!("only try_fill_bytes is used")
        }
        fn next_u64(&mut self) -> u64 {
            unreachable!("only try_fill_bytes is used")
        }
        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            unreachable!("only try_fill_bytes is used")
        }
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand_core::Error> {
            Err(rand_core::Error::new("entropy source offline"))
        }
    }

    impl CryptoRng for BrokenRng {}

    const NAME: &str = "SEALSESSID";

    #[test]
    fn issues_and_emits_cookies_when_absent() {
        let mut store = MemoryKeyStore::new();
        let attrs = CookieAttributes {
            lifetime_secs: 600,
            path: "/app".into(),
            domain: "example.org".into(),
            secure: true,
            http_only: true,
        };
        let keys = KeyManager::new()
            .ensure_keys(NAME, &mut store, &attrs)
            .unwrap();
        let emitted = store.emitted();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].name, "KEY_SEALSESSID");
        assert_eq!(emitted[1].name, "AUTH_SEALSESSID");
        assert_eq!(emitted[0].attributes, attrs);
        assert_eq!(emitted[0].value, *keys.encoded_enc_key());
        assert_eq!(emitted[1].value, *keys.encoded_auth_key());
    }

    #[test]
    fn reuses_existing_cookie_keys() {
        let original = KeyPair::generate(&mut OsRng).unwrap();
        let mut store = MemoryKeyStore::with_cookies([
            ("KEY_SEALSESSID", original.encoded_enc_key().to_string()),
            ("AUTH_SEALSESSID", original.encoded_auth_key().to_string()),
        ]);
        let keys = KeyManager::new()
            .ensure_keys(NAME, &mut store, &CookieAttributes::default())
            .unwrap();
        assert_eq!(keys.enc_key(), original.enc_key());
        assert_eq!(keys.auth_key(), original.auth_key());
        assert!(store.emitted().is_empty());
    }

    #[test]
    fn one_missing_cookie_issues_fresh_pair() {
        let mut store = MemoryKeyStore::with_cookies([(
            "KEY_SEALSESSID",
            general_purpose::STANDARD.encode([7u8; 32]),
        )]);
        let keys = KeyManager::new()
            .ensure_keys(NAME, &mut store, &CookieAttributes::default())
            .unwrap();
        assert_ne!(keys.enc_key(), &[7u8; 32]);
        assert_eq!(store.emitted().len(), 2);
    }

    #[test]
    fn rejects_short_or_undecodable_cookie_keys() {
        let short = general_purpose::STANDARD.encode([1u8; 16]);
        let full = general_purpose::STANDARD.encode([1u8; 32]);
        assert!(matches!(
            KeyPair::from_encoded(&short, &full),
            Err(SessionError::InvalidKey(_))
        ));
        assert!(matches!(
            KeyPair::from_encoded(&full, "not base64!!"),
            Err(SessionError::InvalidKey(_))
        ));
    }

    #[test]
    fn broken_rng_is_fatal() {
        let mut store = MemoryKeyStore::new();
        let result = KeyManager::with_rng(BrokenRng).ensure_keys(
            NAME,
            &mut store,
            &CookieAttributes::default(),
        );
        assert!(matches!(result, Err(SessionError::RandomnessUnavailable(_))));
        assert!(store.emitted().is_empty());
    }

    #[test]
    fn generated_keys_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let keys = KeyPair::generate(&mut OsRng).unwrap();
            assert!(seen.insert(*keys.enc_key()));
            assert!(seen.insert(*keys.auth_key()));
        }
    }

    #[test]
    fn expire_emits_past_dated_cookies() {
        let mut store = MemoryKeyStore::new();
        KeyManager::new().expire(NAME, &mut store, &CookieAttributes::default());
        let names: Vec<_> = store.emitted().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["KEY_SEALSESSID", "AUTH_SEALSESSID"]);
        assert!(store.emitted().iter().all(|c| c.is_expired()));
    }

    #[test]
    fn debug_does_not_print_key_bytes() {
        let keys = KeyPair::from_bytes([0xAB; 32], [0xCD; 32]);
        assert_eq!(format!("{keys:?}"), "KeyPair { .. }");
    }
}
