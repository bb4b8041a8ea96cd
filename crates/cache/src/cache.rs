use crate::config::CacheConfig;
use crate::error::Result;
use crate::key::CacheKey;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped by capacity or TTL.
    pub evictions: u64,
    /// Ready entries currently held.
    pub current_size: usize,
    /// Callers that waited on another caller's computation.
    pub coalesced: u64,
    pub in_flight: usize,
}

type Publication<V, E> = Option<std::result::Result<V, E>>;

enum Slot<V, E> {
    Ready { value: V, expires_at: Instant },
    Pending {
        generation: u64,
        result: watch::Receiver<Publication<V, E>>,
    },
}

struct CacheState<V, E> {
    capacity: usize,
    entries: HashMap<CacheKey, Slot<V, E>>,
    lru: VecDeque<CacheKey>,
    next_generation: u64,
    stats: CacheStats,
}

impl<V, E> CacheState<V, E> {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.lru.iter().position(|k| k == key) {
            self.lru.remove(pos);
        }
        self.lru.push_back(key.clone());
    }

    fn forget(&mut self, key: &CacheKey) {
        if let Some(pos) = self.lru.iter().position(|k| k == key) {
            self.lru.remove(pos);
        }
    }

    fn remove_ready(&mut self, key: &CacheKey) {
        if matches!(self.entries.get(key), Some(Slot::Ready { .. })) {
            self.entries.remove(key);
            self.forget(key);
            self.stats.current_size = self.stats.current_size.saturating_sub(1);
        }
    }

    fn evict_if_needed(&mut self, now: Instant) {
        if self.stats.current_size > self.capacity {
            let expired: Vec<CacheKey> = self
                .entries
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready { expires_at, .. } if *expires_at <= now => Some(key.clone()),
                    _ => None,
                })
                .collect();
            for key in expired {
                self.remove_ready(&key);
                self.stats.evictions += 1;
            }
        }

        while self.stats.current_size > self.capacity {
            let Some(victim) = self.lru.pop_front() else {
                break;
            };
            if matches!(self.entries.get(&victim), Some(Slot::Ready { .. })) {
                self.entries.remove(&victim);
                self.stats.current_size = self.stats.current_size.saturating_sub(1);
                self.stats.evictions += 1;
                log::debug!("cache evicted {victim}");
            }
        }
    }
}

enum Lookup<V, E> {
    Hit(V),
    Wait(watch::Receiver<Publication<V, E>>),
    Lead(watch::Sender<Publication<V, E>>, u64),
}

/// In-memory cache with TTL expiry, LRU capacity bound, and per-key coalescing of
/// concurrent misses.
///
/// Failed computations reach the callers waiting on them but are never stored.
pub struct Cache<V, E> {
    config: CacheConfig,
    state: Arc<Mutex<CacheState<V, E>>>,
}

impl<V, E> Clone for Cache<V, E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            state: self.state.clone(),
        }
    }
}

impl<V, E> Cache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(CacheState {
                capacity: config.capacity,
                entries: HashMap::new(),
                lru: VecDeque::new(),
                next_generation: 0,
                stats: CacheStats::default(),
            })),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cached value, or runs `compute` once for all concurrent callers of `key`.
    ///
    /// `ttl` defaults to the configured TTL. If the computing caller is dropped before it
    /// finishes, one of the waiters runs its own `compute` instead.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
        ttl: Option<Duration>,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        loop {
            match self.lookup(key) {
                Lookup::Hit(value) => return Ok(value),
                Lookup::Wait(mut result) => {
                    let published = match result.wait_for(Option::is_some).await {
                        Ok(published) => (*published).clone(),
                        Err(_) => None,
                    };
                    match published {
                        Some(outcome) => return outcome,
                        // Leader went away without publishing; race for the slot again.
                        None => continue,
                    }
                }
                Lookup::Lead(publisher, generation) => {
                    let mut guard = LeaderGuard {
                        state: self.state.clone(),
                        key: key.clone(),
                        generation,
                        publisher: Some(publisher),
                    };
                    let outcome = compute().await;
                    guard.publish(&outcome, ttl);
                    return outcome;
                }
            }
        }
    }

    fn lookup(&self, key: &CacheKey) -> Lookup<V, E> {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        let mut expired = false;
        match state.entries.get(key) {
            Some(Slot::Ready { value, expires_at }) if *expires_at > now => {
                let value = value.clone();
                state.stats.hits += 1;
                state.touch(key);
                return Lookup::Hit(value);
            }
            Some(Slot::Ready { .. }) => expired = true,
            Some(Slot::Pending { result, .. }) => {
                let result = result.clone();
                state.stats.coalesced += 1;
                return Lookup::Wait(result);
            }
            None => {}
        }
        if expired {
            state.remove_ready(key);
            state.stats.evictions += 1;
        }

        state.stats.misses += 1;
        state.stats.in_flight += 1;
        state.next_generation += 1;
        let generation = state.next_generation;
        let (publisher, result) = watch::channel(None);
        state
            .entries
            .insert(key.clone(), Slot::Pending { generation, result });
        Lookup::Lead(publisher, generation)
    }

    /// Read-only lookup: no stats, no recency update, no computation.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        match self.lock().entries.get(key) {
            Some(Slot::Ready { value, expires_at }) if *expires_at > now => Some(value.clone()),
            _ => None,
        }
    }

    /// Drops every entry whose key equals `pattern` or starts with it. A trailing `*` is
    /// accepted and ignored. In-flight computations for matching keys still answer their
    /// waiters, but their results are not stored. Returns the number of entries dropped.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let mut state = self.lock();
        let doomed: Vec<CacheKey> = state
            .entries
            .keys()
            .filter(|key| key.as_str().starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(slot) = state.entries.remove(key) {
                if matches!(slot, Slot::Ready { .. }) {
                    state.stats.current_size = state.stats.current_size.saturating_sub(1);
                }
            }
            state.forget(key);
        }
        if !doomed.is_empty() {
            log::debug!("cache invalidated {} entries for {pattern:?}", doomed.len());
        }
        doomed.len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V, E>> {
        lock_state(&self.state)
    }
}

fn lock_state<V, E>(state: &Mutex<CacheState<V, E>>) -> MutexGuard<'_, CacheState<V, E>> {
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Owns the pending slot of one computation. Dropping it unpublished (the leader was
/// cancelled) frees the slot so a waiter can take over.
struct LeaderGuard<V, E> {
    state: Arc<Mutex<CacheState<V, E>>>,
    key: CacheKey,
    generation: u64,
    publisher: Option<watch::Sender<Publication<V, E>>>,
}

impl<V: Clone, E: Clone> LeaderGuard<V, E> {
    fn publish(&mut self, outcome: &std::result::Result<V, E>, ttl: Duration) {
        let Some(publisher) = self.publisher.take() else {
            return;
        };
        {
            let mut state = lock_state(&self.state);
            state.stats.in_flight = state.stats.in_flight.saturating_sub(1);
            if self.owns_slot(&state) {
                match outcome {
                    Ok(value) => {
                        let now = Instant::now();
                        state.entries.insert(
                            self.key.clone(),
                            Slot::Ready {
                                value: value.clone(),
                                expires_at: now + ttl,
                            },
                        );
                        state.stats.current_size += 1;
                        state.touch(&self.key);
                        state.evict_if_needed(now);
                    }
                    Err(_) => {
                        state.entries.remove(&self.key);
                    }
                }
            } else {
                log::debug!("cache result for {} dropped: invalidated in flight", self.key);
            }
        }
        publisher.send_replace(Some(outcome.clone()));
    }

    fn owns_slot(&self, state: &CacheState<V, E>) -> bool {
        matches!(
            state.entries.get(&self.key),
            Some(Slot::Pending { generation, .. }) if *generation == self.generation
        )
    }
}

impl<V, E> Drop for LeaderGuard<V, E> {
    fn drop(&mut self) {
        if self.publisher.is_none() {
            return;
        }
        let mut state = lock_state(&self.state);
        state.stats.in_flight = state.stats.in_flight.saturating_sub(1);
        let owns = matches!(
            state.entries.get(&self.key),
            Some(Slot::Pending { generation, .. }) if *generation == self.generation
        );
        if owns {
            state.entries.remove(&self.key);
        }
        // Dropping the sender wakes waiters with a closed channel.
        self.publisher = None;
    }
}
