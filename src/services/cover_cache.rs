//! TTL cache for live-stream covers.
//!
//! Generation is expensive (an ffmpeg run against the live source), so
//! concurrent misses on the same key share one generation. The generation
//! runs as its own task: callers that stop waiting do not cancel it, and the
//! task fills the cache for whoever asks next. It is bounded by the latest
//! deadline of the callers waiting on it.

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::cover::{CACHE_TTL, WAIT_TIMEOUT};

type Generation = Shared<BoxFuture<'static, Option<Bytes>>>;

struct CacheEntry {
    inserted_at: Instant,
    cover: Bytes,
}

struct InFlight {
    op: Generation,
    abort: AbortHandle,
    /// Moved forward by every caller that joins.
    deadline: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, InFlight>,
}

pub struct CoverCache {
    ttl: Duration,
    wait_timeout: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl std::fmt::Debug for CoverCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverCache")
            .field("ttl", &self.ttl)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for CoverCache {
    fn default() -> Self {
        Self::new(CACHE_TTL, WAIT_TIMEOUT)
    }
}

impl CoverCache {
    #[must_use]
    pub fn new(ttl: Duration, wait_timeout: Duration) -> Self {
        Self {
            ttl,
            wait_timeout,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Returns the cached cover for `key`, generating it on a miss.
    ///
    /// `generate` only runs when nothing is cached and no generation for
    /// `key` is in flight. `None` results are not cached.
    pub async fn get<F, Fut>(&self, key: &str, generate: F) -> Option<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Bytes>> + Send + 'static,
    {
        let op = {
            let mut state = lock(&self.state);

            if let Some(entry) = state.entries.get(key) {
                if entry.inserted_at.elapsed() < self.ttl {
                    metrics::counter!("cover_cache_hits_total").increment(1);
                    return Some(entry.cover.clone());
                }
                debug!(key = %key, "Cover expired");
                state.entries.remove(key);
            }

            metrics::counter!("cover_cache_misses_total").increment(1);

            if let Some(in_flight) = state.in_flight.get_mut(key) {
                debug!(key = %key, "Joining in-flight cover generation");
                in_flight.deadline = in_flight.deadline.max(Instant::now() + self.wait_timeout);
                in_flight.op.clone()
            } else {
                let in_flight = self.spawn_generation(key, generate());
                let op = in_flight.op.clone();
                state.in_flight.insert(key.to_string(), in_flight);
                op
            }
        };

        if let Ok(cover) = tokio::time::timeout(self.wait_timeout, op).await {
            cover
        } else {
            warn!(key = %key, timeout = ?self.wait_timeout, "Gave up waiting for cover");
            None
        }
    }

    /// Must be called with the state lock held so the marker is in place
    /// before the task can try to remove it.
    fn spawn_generation<Fut>(&self, key: &str, generation: Fut) -> InFlight
    where
        Fut: Future<Output = Option<Bytes>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let key = key.to_string();
        let deadline = Instant::now() + self.wait_timeout;

        let handle = tokio::spawn(async move {
            metrics::counter!("cover_generations_total").increment(1);

            let mut generation = std::pin::pin!(generation);
            let mut until = deadline;
            let cover = loop {
                if let Ok(cover) = tokio::time::timeout_at(until, &mut generation).await {
                    break cover;
                }
                let extended = lock(&state)
                    .in_flight
                    .get(&key)
                    .map_or(until, |in_flight| in_flight.deadline);
                if extended <= until {
                    warn!(key = %key, "Cover generation timed out");
                    break None;
                }
                until = extended;
            };

            let mut state = lock(&state);
            state.in_flight.remove(&key);
            if let Some(cover) = &cover {
                state.entries.insert(
                    key,
                    CacheEntry {
                        inserted_at: Instant::now(),
                        cover: cover.clone(),
                    },
                );
            }
            cover
        });

        let abort = handle.abort_handle();
        let op = handle.map(|joined| joined.ok().flatten()).boxed().shared();
        InFlight {
            op,
            abort,
            deadline,
        }
    }

    /// Aborts pending generations and drops every cached cover.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        let pending = state.in_flight.len();
        for (_, in_flight) in state.in_flight.drain() {
            in_flight.abort.abort();
        }
        state.entries.clear();
        info!(pending, "Cover cache shut down");
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
