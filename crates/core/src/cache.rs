use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::clock::Clock;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("lease cache unavailable: {0}")]
    Unavailable(String),
}

/// Shared TTL key-value cache holding lease maps.
///
/// Expiry is a property of the cache. Callers never rely on an entry being
/// gone, only on it not being returned after its TTL.
pub trait LeaseCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

struct CacheSlot {
    value: Vec<u8>,
    expires_at_ms: u64,
}

/// In-process cache for single-worker deployments and tests.
pub struct MemoryLeaseCache {
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl MemoryLeaseCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Forget every entry, as a cache restart would.
    pub fn clear(&self) {
        match self.slots.lock() {
            Ok(mut slots) => slots.clear(),
            Err(e) => tracing::error!("lease cache: lock poisoned on clear: {e}"),
        }
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        match self.slots.lock() {
            Ok(slots) => slots.values().filter(|s| s.expires_at_ms > now).count(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LeaseCache for MemoryLeaseCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now_ms();
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        match slots.get(key) {
            Some(slot) if slot.expires_at_ms > now => Ok(Some(slot.value.clone())),
            Some(_) => {
                slots.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at_ms = self.clock.now_ms().saturating_add(ttl_ms);
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        slots.insert(
            key.to_string(),
            CacheSlot {
                value: value.to_vec(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        slots.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn entries_expire_after_ttl() {
        let clock = ManualClock::new(0);
        let cache = MemoryLeaseCache::new(Arc::new(clock.clone()));
        cache.set("k", b"v", Duration::from_secs(5)).unwrap();
        clock.advance_ms(4_999);
        assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
        clock.advance_ms(1);
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let clock = ManualClock::new(1_700_000_000_000);
        let cache = MemoryLeaseCache::new(Arc::new(clock.clone()));
        cache.set("k", b"v", Duration::from_secs(u64::MAX)).unwrap();
        clock.advance_secs(365 * 24 * 3600);
        assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn clear_forgets_everything() {
        let cache = MemoryLeaseCache::new(Arc::new(ManualClock::new(0)));
        cache.set("a", b"1", Duration::from_secs(5)).unwrap();
        cache.set("b", b"2", Duration::from_secs(5)).unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
