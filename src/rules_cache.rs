//! TTL-bounded memoization of verified rules containers.
//!
//! Verifying a container means decoding a signature bundle and checking
//! ECDSA signatures under every configured SuperAdmin key; callers hit the
//! same container bytes on every envelope read, so the verified result is
//! cached keyed on `sha256(container_bytes || signature_bytes)`.
//!
//! Contract:
//! - an entry older than the TTL is never returned, under any concurrency;
//! - concurrent calls for the same key run the verifier at most once (the
//!   second caller waits on the first and reads its result), while calls for
//!   different keys proceed in parallel;
//! - a verification failure is not cached; the next call retries;
//! - a TTL of zero disables memoization entirely.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::SuperAdminSet;
use crate::crypto::{Sha256Digest, sha256};
use crate::error::IntegrityError;
use crate::rules::RulesContainer;
use crate::rules_verify::verify_rules;

#[derive(Default)]
struct Slot {
    value: Option<(Arc<RulesContainer>, Instant)>,
}

/// Process-wide cache of verified rules containers.
pub struct RulesCache {
    ttl: Duration,
    entries: DashMap<[u8; 32], Arc<Mutex<Slot>>>,
}

impl RulesCache {
    pub fn new(ttl: Duration) -> Self {
        RulesCache {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Return the cached verified container for these exact bytes if it is
    /// still fresh; otherwise verify, insert, and return the new entry.
    pub fn get_or_verify(
        &self,
        raw_container: &[u8],
        raw_signatures: &[u8],
        super_admins: &SuperAdminSet,
    ) -> Result<Arc<RulesContainer>, IntegrityError> {
        self.get_or_verify_with(raw_container, raw_signatures, || {
            verify_rules(raw_container, raw_signatures, super_admins)
        })
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn get_or_verify_with(
        &self,
        raw_container: &[u8],
        raw_signatures: &[u8],
        verify: impl FnOnce() -> Result<RulesContainer, IntegrityError>,
    ) -> Result<Arc<RulesContainer>, IntegrityError> {
        if self.ttl.is_zero() {
            return verify().map(Arc::new);
        }

        let key = cache_key(raw_container, raw_signatures);
        let slot = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone();

        // Per-key lock: one verification in flight per key, independent keys
        // in parallel.
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((container, cached_at)) = &slot.value {
            if cached_at.elapsed() <= self.ttl {
                return Ok(Arc::clone(container));
            }
            debug!(key = %Sha256Digest(key), "cached rules entry expired");
            slot.value = None;
        }

        let verified = Arc::new(verify()?);
        slot.value = Some((Arc::clone(&verified), Instant::now()));
        Ok(verified)
    }
}

fn cache_key(raw_container: &[u8], raw_signatures: &[u8]) -> [u8; 32] {
    let mut joined = Vec::with_capacity(raw_container.len() + raw_signatures.len());
    joined.extend_from_slice(raw_container);
    joined.extend_from_slice(raw_signatures);
    sha256(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn container() -> RulesContainer {
        RulesContainer::decode(&[]).unwrap()
    }

    #[test]
    fn second_call_hits_the_cache() {
        let cache = RulesCache::new(Duration::from_secs(5));
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_verify_with(b"container", b"signatures", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(container())
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_entry_is_reverified() {
        let cache = RulesCache::new(Duration::from_millis(20));
        let calls = AtomicUsize::new(0);
        let run = || {
            cache
                .get_or_verify_with(b"container", b"signatures", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(container())
                })
                .unwrap()
        };
        run();
        run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        thread::sleep(Duration::from_millis(40));
        run();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn distinct_keys_verify_separately() {
        let cache = RulesCache::new(Duration::from_secs(5));
        let calls = AtomicUsize::new(0);
        for raw in [b"alpha".as_slice(), b"beta".as_slice()] {
            cache
                .get_or_verify_with(raw, b"signatures", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(container())
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_is_not_cached() {
        let cache = RulesCache::new(Duration::from_secs(5));
        let calls = AtomicUsize::new(0);
        let err = cache.get_or_verify_with(b"container", b"signatures", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(IntegrityError::InsufficientSignatures {
                matched: 0,
                required: 1,
            })
        });
        assert!(err.is_err());
        cache
            .get_or_verify_with(b"container", b"signatures", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(container())
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_ttl_disables_memoization() {
        let cache = RulesCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .get_or_verify_with(b"container", b"signatures", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(container())
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = RulesCache::new(Duration::from_secs(5));
        let calls = AtomicUsize::new(0);
        let run = || {
            cache
                .get_or_verify_with(b"container", b"signatures", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(container())
                })
                .unwrap()
        };
        run();
        cache.clear();
        run();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_same_key_runs_verifier_once() {
        let cache = Arc::new(RulesCache::new(Duration::from_secs(5)));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(thread::spawn(move || {
                cache
                    .get_or_verify_with(b"container", b"signatures", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the slot long enough for the other threads to
                        // pile up behind the per-key lock.
                        thread::sleep(Duration::from_millis(30));
                        Ok(container())
                    })
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
