//! Per-identity serialisation for hosts that need it.
//!
//! The store itself never locks. A host that runs concurrent requests for the
//! same session id can wrap write/destroy in `IdentityLocks::with_lock` so the
//! last-writer-wins race becomes an ordered sequence.

use crate::identity::SessionIdentity;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct IdentityLocks {
    inner: Mutex<HashMap<SessionIdentity, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock<T>(&self, identity: &SessionIdentity, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut map = self.inner.lock();
            map.entry(identity.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let out = {
            let _guard = slot.lock();
            f()
        };
        self.release(identity, slot);
        out
    }

    /// Drop the map entry once nobody else holds or waits on it.
    fn release(&self, identity: &SessionIdentity, slot: Arc<Mutex<()>>) {
        let mut map = self.inner.lock();
        drop(slot);
        if map
            .get(identity)
            .map(|entry| Arc::strong_count(entry) == 1)
            .unwrap_or(false)
        {
            map.remove(identity);
        }
    }

    pub fn tracked(&self) -> usize {
        self.inner.lock().len()
    }
}
