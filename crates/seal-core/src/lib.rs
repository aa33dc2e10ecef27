//! seal-core: encrypted file-backed session storage
//!
//! Session payloads are sealed with AES-256-CBC and authenticated with
//! HMAC-SHA256 (encrypt-then-MAC) under a per-session key pair that lives in
//! the client's cookies. The server only ever holds ciphertext at rest.
//!
//! # Module layout
//! - `keys`      - key pair generation and recovery from cookies
//! - `cookie`    - cookie collaborator trait and in-memory jar
//! - `codec`     - encrypt-then-MAC / verify-then-decrypt
//! - `record`    - `<mac>:<iv>:<ciphertext>` text format
//! - `store`     - one file per session id, optional atomic writes
//! - `gc`        - mtime based sweep of expired records
//! - `backend`   - `SessionBackend` trait and `SecureSessionHandler`
//! - `locks`     - optional per-identity serialisation
//! - `settings`  - JSON configuration
//! - `paths`     - default directories

pub mod backend;
pub mod codec;
pub mod cookie;
pub mod error;
pub mod gc;
pub mod identity;
pub mod keys;
pub mod locks;
pub mod paths;
pub mod record;
pub mod settings;
pub mod store;

pub use backend::{SecureSessionHandler, SessionBackend};
pub use cookie::{CookieAttributes, KeyCookie, KeyStore, MemoryKeyStore};
pub use error::SessionError;
pub use identity::SessionIdentity;
pub use keys::{KeyManager, KeyPair};
pub use locks::IdentityLocks;
pub use record::SessionRecord;
pub use settings::{load_settings, SessionSettings};
pub use store::SessionStore;
