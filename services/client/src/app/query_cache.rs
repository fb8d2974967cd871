//! services/client/src/app/query_cache.rs
//!
//! Keyed fetch-and-cache layer every read screen goes through.
//!
//! Each key owns one entry, modelled as an explicit state machine
//! (`Idle → Loading → Ready | Failed`) and published through a
//! `tokio::sync::watch` channel so subscribers always hold a complete
//! snapshot. A separate in-flight registry, keyed identically, holds the
//! shared future of the one fetch that may be running for a key.
//!
//! Fetches run on spawned tasks: a caller that stops waiting never cancels
//! a fetch, and its result still lands in the entry. Entries are never
//! evicted.

use daily_gk_core::ports::{PortError, PortResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Staleness window used when the caller does not pick one.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

type AnyData = Arc<dyn Any + Send + Sync>;
type FetchResult = Result<AnyData, PortError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

//=========================================================================================
// Keys, Options and Snapshots
//=========================================================================================

/// A resource tag plus ordered parameters. Compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tag: String,
    params: Vec<String>,
}

impl CacheKey {
    pub fn new<I, S>(tag: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag: tag.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.tag, self.params.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_after: Duration,
    /// When false, `get` answers `Idle` without fetching (e.g. no user id yet).
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            enabled: true,
        }
    }
}

impl QueryOptions {
    pub fn stale_after(stale_after: Duration) -> Self {
        Self {
            stale_after,
            ..Self::default()
        }
    }

    pub fn enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }
}

/// Type-erased entry record, replaced wholesale on every change.
#[derive(Clone)]
struct RawEntry {
    status: FetchStatus,
    data: Option<AnyData>,
    error: Option<PortError>,
    fetched_at: Option<Instant>,
    stale_after: Duration,
}

impl RawEntry {
    fn idle(stale_after: Duration) -> Self {
        Self {
            status: FetchStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            stale_after,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.fetched_at
            .is_some_and(|at| now.duration_since(at) < self.stale_after)
    }
}

/// A read-only snapshot of one cache entry.
///
/// `Ready` implies `data` is present; `Failed` implies `error` is present and
/// `data` still holds whatever was fetched before the failure.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    pub status: FetchStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<PortError>,
    pub fetched_at: Option<Instant>,
    pub stale_after: Duration,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            stale_after: self.stale_after,
        }
    }
}

impl<T: Send + Sync + 'static> CacheEntry<T> {
    fn from_raw(key: CacheKey, raw: RawEntry) -> Self {
        let data = match raw.data.map(|d| d.downcast::<T>()) {
            Some(Ok(data)) => Some(data),
            Some(Err(_)) => {
                warn!(key = %key, "Cached value has a different type than requested");
                return Self {
                    key,
                    status: FetchStatus::Failed,
                    data: None,
                    error: Some(PortError::Unknown("cached value type mismatch".to_string())),
                    fetched_at: raw.fetched_at,
                    stale_after: raw.stale_after,
                };
            }
            None => None,
        };
        Self {
            key,
            status: raw.status,
            data,
            error: raw.error,
            fetched_at: raw.fetched_at,
            stale_after: raw.stale_after,
        }
    }
}

impl<T> CacheEntry<T> {
    fn idle(key: CacheKey, stale_after: Duration) -> Self {
        Self {
            key,
            status: FetchStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            stale_after,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.status == FetchStatus::Ready
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        !self
            .fetched_at
            .is_some_and(|at| now.duration_since(at) < self.stale_after)
    }

    /// Turns the snapshot into a plain result: `Ready` data, or the error of
    /// a failed entry, or `Unknown` for anything still idle or loading.
    pub fn into_result(self) -> PortResult<Arc<T>> {
        match (self.status, self.data, self.error) {
            (FetchStatus::Ready, Some(data), _) => Ok(data),
            (FetchStatus::Failed, _, Some(error)) => Err(error),
            (status, _, _) => Err(PortError::Unknown(format!(
                "{} is not ready ({:?})",
                self.key, status
            ))),
        }
    }
}

//=========================================================================================
// The Cache
//=========================================================================================

struct Slot {
    state: watch::Sender<RawEntry>,
    /// The most recent fetcher, reused by `refetch` and by invalidation of
    /// observed keys.
    fetcher: Option<Fetcher>,
}

impl Slot {
    fn new(stale_after: Duration) -> Self {
        let (state, _) = watch::channel(RawEntry::idle(stale_after));
        Self {
            state,
            fetcher: None,
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Slot>,
    in_flight: HashMap<CacheKey, SharedFetch>,
}

enum Lookup {
    Cached(RawEntry),
    Await(SharedFetch),
}

/// Process-wide query cache. Cheap to clone; clones share the same entries.
#[derive(Clone, Default)]
pub struct QueryCache {
    state: Arc<Mutex<CacheState>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the entry for `key`, fetching it first when needed.
    ///
    /// - absent or `Idle`: fetch and wait for the result;
    /// - `Ready` and fresh: return it, no fetch;
    /// - `Ready` but stale, or `Failed` with earlier data: return it now and
    ///   refetch in the background;
    /// - a fetch already in flight: return the current data if there is any,
    ///   otherwise wait for that fetch instead of starting another.
    pub async fn get<T, F, Fut>(&self, key: CacheKey, fetcher: F, options: QueryOptions) -> CacheEntry<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PortResult<T>> + Send + 'static,
    {
        if !options.enabled {
            return CacheEntry::idle(key, options.stale_after);
        }
        let fetcher = erase(fetcher);

        let lookup = {
            let mut state = self.lock();
            let slot = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| Slot::new(options.stale_after));
            slot.fetcher = Some(fetcher.clone());
            slot.state.send_if_modified(|entry| {
                entry.stale_after = options.stale_after;
                false
            });
            let current = slot.state.borrow().clone();

            let pending = state.in_flight.get(&key).cloned();
            if let Some(pending) = pending {
                // Readers with data in hand never wait on a revalidation.
                if current.data.is_some() {
                    Lookup::Cached(current)
                } else {
                    Lookup::Await(pending)
                }
            } else {
                match current.status {
                    FetchStatus::Ready if current.is_fresh(Instant::now()) => {
                        Lookup::Cached(current)
                    }
                    FetchStatus::Ready => {
                        debug!(key = %key, "Serving stale entry, revalidating");
                        self.start_fetch(&mut state, &key, fetcher);
                        Lookup::Cached(current)
                    }
                    FetchStatus::Failed if current.data.is_some() => {
                        self.start_fetch(&mut state, &key, fetcher);
                        Lookup::Cached(current)
                    }
                    FetchStatus::Idle | FetchStatus::Loading | FetchStatus::Failed => {
                        Lookup::Await(self.start_fetch(&mut state, &key, fetcher))
                    }
                }
            }
        };

        match lookup {
            Lookup::Cached(raw) => CacheEntry::from_raw(key, raw),
            Lookup::Await(pending) => {
                // The outcome is recorded in the entry by the fetch itself.
                let _ = pending.await;
                let raw = self.raw(&key);
                CacheEntry::from_raw(key, raw)
            }
        }
    }

    /// The current snapshot of `key` without triggering a fetch.
    pub fn peek<T: Send + Sync + 'static>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let raw = self
            .lock()
            .entries
            .get(key)
            .map(|slot| slot.state.borrow().clone())?;
        Some(CacheEntry::from_raw(key.clone(), raw))
    }

    /// Watches `key`. The entry is created `Idle` if it does not exist yet.
    pub fn subscribe(&self, key: CacheKey) -> Subscription {
        let receiver = {
            let mut state = self.lock();
            state
                .entries
                .entry(key.clone())
                .or_insert_with(|| Slot::new(DEFAULT_STALE_AFTER))
                .state
                .subscribe()
        };
        Subscription {
            key,
            receiver,
            cache: self.clone(),
        }
    }

    /// Marks every matching entry as needing a fresh fetch.
    ///
    /// Entries with a fetch in flight are left alone; that fetch's result
    /// still lands. Entries somebody is subscribed to are refetched right
    /// away with their last fetcher; the rest go `Idle` until the next `get`.
    /// Returns the number of entries affected.
    pub fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut state = self.lock();
        let keys: Vec<CacheKey> = state
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();

        let mut affected = 0;
        for key in keys {
            if state.in_flight.contains_key(&key) {
                debug!(key = %key, "Invalidated while in flight, letting the fetch land");
                continue;
            }
            let Some(slot) = state.entries.get(&key) else {
                continue;
            };
            affected += 1;

            let refetch = if slot.state.receiver_count() > 0 {
                slot.fetcher.clone()
            } else {
                None
            };
            match refetch {
                Some(fetcher) => {
                    debug!(key = %key, "Invalidated observed entry, refetching");
                    self.start_fetch(&mut state, &key, fetcher);
                }
                None => {
                    let previous = slot.state.borrow().clone();
                    slot.state.send_replace(RawEntry {
                        status: FetchStatus::Idle,
                        error: None,
                        ..previous
                    });
                    debug!(key = %key, "Invalidated entry");
                }
            }
        }
        affected
    }

    /// Fetches `key` again with its last fetcher and waits for the outcome,
    /// joining a fetch already in flight. Returns false when the key has
    /// never been fetched.
    pub async fn refetch(&self, key: &CacheKey) -> bool {
        let pending = {
            let mut state = self.lock();
            let in_flight = state.in_flight.get(key).cloned();
            if let Some(pending) = in_flight {
                pending
            } else {
                let Some(fetcher) = state.entries.get(key).and_then(|s| s.fetcher.clone()) else {
                    return false;
                };
                self.start_fetch(&mut state, key, fetcher)
            }
        };
        let _ = pending.await;
        true
    }

    fn raw(&self, key: &CacheKey) -> RawEntry {
        self.lock()
            .entries
            .get(key)
            .map(|slot| slot.state.borrow().clone())
            .unwrap_or_else(|| RawEntry::idle(DEFAULT_STALE_AFTER))
    }

    /// Marks the entry `Loading`, registers the fetch and spawns it.
    /// Must be called with the state lock held and no fetch in flight for `key`.
    fn start_fetch(&self, state: &mut CacheState, key: &CacheKey, fetcher: Fetcher) -> SharedFetch {
        if let Some(slot) = state.entries.get(key) {
            let previous = slot.state.borrow().clone();
            slot.state.send_replace(RawEntry {
                status: FetchStatus::Loading,
                ..previous
            });
        }

        let cache = self.clone();
        let settle_key = key.clone();
        let fetch = async move {
            let result = fetcher().await;
            cache.settle(&settle_key, &result);
            result
        }
        .boxed()
        .shared();

        state.in_flight.insert(key.clone(), fetch.clone());
        tokio::spawn(fetch.clone());
        debug!(key = %key, "Fetch started");
        fetch
    }

    /// Records a fetch outcome and drops the in-flight registration.
    fn settle(&self, key: &CacheKey, result: &FetchResult) {
        let mut state = self.lock();
        state.in_flight.remove(key);
        let Some(slot) = state.entries.get(key) else {
            return;
        };
        let previous = slot.state.borrow().clone();
        let next = match result {
            Ok(data) => RawEntry {
                status: FetchStatus::Ready,
                data: Some(data.clone()),
                error: None,
                fetched_at: Some(Instant::now()),
                stale_after: previous.stale_after,
            },
            Err(error) => {
                warn!(key = %key, error = %error, "Fetch failed");
                RawEntry {
                    status: FetchStatus::Failed,
                    error: Some(error.clone()),
                    ..previous
                }
            }
        };
        slot.state.send_replace(next);
    }
}

fn erase<T, F, Fut>(fetcher: F) -> Fetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PortResult<T>> + Send + 'static,
{
    Arc::new(move || {
        let fetch = fetcher();
        async move { fetch.await.map(|data| Arc::new(data) as AnyData) }.boxed()
    })
}

//=========================================================================================
// Subscriptions
//=========================================================================================

/// A reader's handle on one key: snapshots, change notification, and the
/// refetch / invalidate capability. Dropping it detaches the reader; the
/// entry itself stays cached.
pub struct Subscription {
    key: CacheKey,
    receiver: watch::Receiver<RawEntry>,
    cache: QueryCache,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn snapshot<T: Send + Sync + 'static>(&self) -> CacheEntry<T> {
        let raw = self.receiver.borrow().clone();
        CacheEntry::from_raw(self.key.clone(), raw)
    }

    /// Waits for the next change of the entry.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    pub async fn refetch(&self) -> bool {
        self.cache.refetch(&self.key).await
    }

    pub fn invalidate(&self) -> usize {
        let key = self.key.clone();
        self.cache.invalidate(move |k| *k == key)
    }
}
