use crate::idempotency::key_generator::{CacheKey, RequestFingerprint};
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Response recorded for a cache key, replayed verbatim on matching retries.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub fingerprint: RequestFingerprint,
    pub status: StatusCode,
    /// Header names in first-seen order, each with its values in order.
    pub headers: Vec<(HeaderName, Vec<HeaderValue>)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(
        fingerprint: RequestFingerprint,
        status: StatusCode,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Self {
        let headers = headers
            .keys()
            .map(|name| {
                let values = headers.get_all(name).iter().cloned().collect();
                (name.clone(), values)
            })
            .collect();

        Self {
            fingerprint,
            status,
            headers,
            body,
        }
    }

    pub fn matches(&self, fingerprint: &RequestFingerprint) -> bool {
        &self.fingerprint == fingerprint
    }

    /// Rebuilds the HTTP response from the recorded parts.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, values) in &self.headers {
            for value in values {
                headers.append(name.clone(), value.clone());
            }
        }

        response
    }
}

/// Outcome of [`IdempotencyStore::put_if_absent`].
#[derive(Debug, Clone)]
pub enum PutOutcome {
    Stored(Arc<CachedResponse>),
    Existing(Arc<CachedResponse>),
}

/// Exclusive claim on a single cache key, released on drop.
///
/// Releasing the last claim on a key also removes its mutex from the store.
#[derive(Debug)]
pub struct KeyLock<'a> {
    locks: &'a DashMap<CacheKey, Arc<Mutex<()>>>,
    key: CacheKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the mutex, so only the map's own reference is left when idle.
        self.locks
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// In-memory map from cache key to recorded response.
///
/// Entries are written once and live for the lifetime of the store. Each key
/// also owns an async mutex so that the lookup, the protected call and the
/// write can run as a single critical section per key. A mutex only lives
/// while some call holds or waits on it.
#[derive(Debug, Default)]
pub struct IdempotencyStore {
    entries: DashMap<CacheKey, Arc<CachedResponse>>,
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded response for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedResponse>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Records `response` for `key` unless an entry already exists.
    /// An existing entry is returned untouched.
    pub fn put_if_absent(&self, key: CacheKey, response: CachedResponse) -> PutOutcome {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => PutOutcome::Existing(Arc::clone(existing.get())),
            Entry::Vacant(vacant) => {
                let response = Arc::new(response);
                vacant.insert(Arc::clone(&response));
                PutOutcome::Stored(response)
            }
        }
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &CacheKey) -> KeyLock<'_> {
        let slot = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let guard = slot.lock_owned().await;

        KeyLock {
            locks: &self.locks,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Number of recorded responses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
