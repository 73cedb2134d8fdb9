use std::{
    hash::Hash,
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
};

use alloy_primitives::{Address, Bytes, B256, U256};
use delegate::delegate;
use lru::LruCache;

use super::{ForkError, ForkSource};

/// Default number of entries in each table of a [`CachedSource`].
pub const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(4096) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

/// Memoizes the lookups of a [`ForkSource`] in LRU tables.
///
/// The underlying state is immutable for a fixed state root, so a cached source can be shared
/// between hosts.
#[derive(Debug)]
pub struct CachedSource<S> {
    inner: S,
    nonces: Mutex<LruCache<Address, u64>>,
    balances: Mutex<LruCache<Address, U256>>,
    storage: Mutex<LruCache<(Address, B256), B256>>,
    code: Mutex<LruCache<Address, Bytes>>,
}

impl<S: ForkSource> CachedSource<S> {
    /// Wraps `inner` with tables of [`DEFAULT_CACHE_SIZE`] entries.
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_SIZE)
    }

    /// Wraps `inner` with tables of `capacity` entries.
    pub fn with_capacity(inner: S, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            nonces: Mutex::new(LruCache::new(capacity)),
            balances: Mutex::new(LruCache::new(capacity)),
            storage: Mutex::new(LruCache::new(capacity)),
            code: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The wrapped source.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

fn cached<K: Hash + Eq, V: Clone>(
    table: &Mutex<LruCache<K, V>>,
    key: K,
    fetch: impl FnOnce() -> Result<V, ForkError>,
) -> Result<V, ForkError> {
    if let Some(value) = table.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
        return Ok(value.clone());
    }
    // Fetch without holding the lock; concurrent misses may both hit the source.
    let value = fetch()?;
    table.lock().unwrap_or_else(PoisonError::into_inner).put(key, value.clone());
    Ok(value)
}

impl<S: ForkSource> ForkSource for CachedSource<S> {
    delegate! {
        to self.inner {
            fn url_or_alias(&self) -> &str;
            fn state_root(&self) -> B256;
        }
    }

    fn nonce(&self, address: Address) -> Result<u64, ForkError> {
        cached(&self.nonces, address, || self.inner.nonce(address))
    }

    fn balance(&self, address: Address) -> Result<U256, ForkError> {
        cached(&self.balances, address, || self.inner.balance(address))
    }

    fn storage_at(&self, address: Address, key: B256) -> Result<B256, ForkError> {
        cached(&self.storage, (address, key), || self.inner.storage_at(address, key))
    }

    fn code(&self, address: Address) -> Result<Bytes, ForkError> {
        cached(&self.code, address, || self.inner.code(address))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy_primitives::address;

    use super::*;

    #[derive(Debug, Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    impl ForkSource for CountingSource {
        fn url_or_alias(&self) -> &str {
            "counting"
        }

        fn state_root(&self) -> B256 {
            B256::ZERO
        }

        fn nonce(&self, _address: Address) -> Result<u64, ForkError> {
            Ok(self.calls.fetch_add(1, Ordering::SeqCst) as u64)
        }

        fn balance(&self, _address: Address) -> Result<U256, ForkError> {
            Ok(U256::ZERO)
        }

        fn storage_at(&self, _address: Address, _key: B256) -> Result<B256, ForkError> {
            Ok(B256::ZERO)
        }

        fn code(&self, _address: Address) -> Result<Bytes, ForkError> {
            Ok(Bytes::new())
        }
    }

    #[test]
    fn test_lookups_are_memoized() {
        let source = CachedSource::with_capacity(
            CountingSource::default(),
            NonZeroUsize::new(1).unwrap(),
        );
        let alice = address!("0x00000000000000000000000000000000000a11ce");
        let bob = address!("0x0000000000000000000000000000000000000b0b");

        assert_eq!(source.nonce(alice).unwrap(), 0);
        assert_eq!(source.nonce(alice).unwrap(), 0);
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 1);

        // Capacity of one evicts alice.
        assert_eq!(source.nonce(bob).unwrap(), 1);
        assert_eq!(source.nonce(alice).unwrap(), 2);
    }
}
