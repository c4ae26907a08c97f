use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::error::SyncError;
use crate::keys::{KeyFilter, QueryKey};

use super::entry::{ArcAny, Entry, FetchOutcome};
use super::{QueryResult, QueryStatus};

/// Type-erased fetch future stored in the cache
pub type FetchFuture = BoxFuture<'static, Result<ArcAny, SyncError>>;

/// Produces a fresh fetch for one key each time it is called.
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Successful entries older than this count as stale. `None` keeps them
    /// fresh until invalidated.
    pub stale_after: Option<Duration>,
    /// Unobserved entries not read for this long are dropped by
    /// `collect_garbage`.
    pub gc_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after: Some(Duration::minutes(5)),
            gc_after: Duration::minutes(10),
        }
    }
}

/// Session-wide query cache. Clone is cheap; clones share the same entries.
///
/// Fetches run on spawned Tokio tasks, so the engine must be used from
/// within a Tokio runtime. A reader that stops waiting does not cancel the
/// fetch; its result still lands in the cache.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    /// Identity the cached entries belong to.
    scope: Mutex<Option<String>>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                entries: Mutex::new(HashMap::new()),
                scope: Mutex::new(None),
            }),
        }
    }

    /// Read a key, fetching only when the entry is missing, stale or failed
    /// and invalidated. Concurrent readers of one key share a single fetch.
    pub async fn fetch<V>(&self, key: &QueryKey, fetcher: Fetcher) -> Result<Arc<V>, SyncError>
    where
        V: Send + Sync + 'static,
    {
        // A result we just waited for is accepted regardless of its age.
        let mut waited = false;
        loop {
            let pending = {
                let now = Utc::now();
                let stale_after = if waited { None } else { self.inner.config.stale_after };
                let mut entries = self.inner.entries.lock();
                let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
                entry.last_access = now;
                entry.fetcher = Some(fetcher.clone());

                if entry.is_fresh(now, stale_after) {
                    trace!(key = %key, "cache hit");
                    return entry.settled::<V>(key);
                }
                if let Some(pending) = entry.in_flight.clone() {
                    trace!(key = %key, "joining in-flight fetch");
                    pending
                } else {
                    self.start_fetch(key, entry, fetcher.clone())
                }
            };
            if let Some(error) = self.wait(key, pending).await {
                return Err(error);
            }
            waited = true;
        }
    }

    /// Start a fetch for `key` if it needs one, without waiting for it.
    pub fn ensure(&self, key: &QueryKey, fetcher: Fetcher) {
        let now = Utc::now();
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.last_access = now;
        entry.fetcher = Some(fetcher.clone());
        if entry.in_flight.is_none() && !entry.is_fresh(now, self.inner.config.stale_after) {
            self.start_fetch(key, entry, fetcher);
        }
    }

    /// Force a new fetch even if the entry is fresh. Joins a fetch that is
    /// already running rather than starting a second one.
    pub async fn refetch<V>(&self, key: &QueryKey, fetcher: Fetcher) -> Result<Arc<V>, SyncError>
    where
        V: Send + Sync + 'static,
    {
        {
            let mut entries = self.inner.entries.lock();
            if let Some(entry) = entries.get_mut(key) {
                entry.stale = true;
            }
        }
        self.fetch(key, fetcher).await
    }

    /// Current state of a key without triggering a fetch.
    pub fn snapshot<V>(&self, key: &QueryKey) -> QueryResult<V>
    where
        V: Send + Sync + 'static,
    {
        let entries = self.inner.entries.lock();
        entries
            .get(key)
            .map(|entry| entry.result(Utc::now(), self.inner.config.stale_after))
            .unwrap_or_else(QueryResult::idle)
    }

    /// Register an active reader of `key`. While the guard lives, invalidating
    /// the key refetches it immediately.
    pub fn observe(&self, key: &QueryKey, fetcher: Fetcher) -> ObserverGuard {
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.observers += 1;
        entry.fetcher = Some(fetcher);
        entry.last_access = Utc::now();
        debug!(key = %key, observers = entry.observers, "observer added");
        ObserverGuard {
            engine: self.clone(),
            key: key.clone(),
            changes: entry.subscribe(),
        }
    }

    /// Mark every matching entry stale. Observed entries refetch now;
    /// unobserved ones wait for their next read. Returns the number of
    /// entries touched.
    pub fn invalidate(&self, filter: &KeyFilter) -> usize {
        let mut entries = self.inner.entries.lock();
        let mut touched = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| filter.matches(key)) {
            touched += 1;
            entry.generation += 1;
            entry.stale = true;

            if entry.in_flight.is_some() {
                // The running fetch belongs to the old generation; its
                // completion discards the result and restarts if observed.
                continue;
            }
            if entry.observers > 0 {
                if let Some(fetcher) = entry.fetcher.clone() {
                    self.start_fetch(key, entry, fetcher);
                    continue;
                }
            }
            entry.status = QueryStatus::Idle;
            entry.notify();
        }
        debug!(filter = %filter, touched, "invalidated");
        touched
    }

    /// Drop matching entries. Observed entries are reset instead of dropped
    /// so their observers keep receiving notifications.
    pub fn remove(&self, filter: &KeyFilter) -> usize {
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            if !filter.matches(key) {
                return true;
            }
            if entry.observers == 0 {
                return false;
            }
            entry.generation += 1;
            entry.stale = true;
            entry.status = QueryStatus::Idle;
            entry.data = None;
            entry.error = None;
            entry.updated_at = None;
            entry.notify();
            true
        });
        let removed = before - entries.len();
        debug!(filter = %filter, removed, "removed entries");
        removed
    }

    /// Tie the cache to one signed-in identity. Moving to another identity,
    /// or to none, drops every entry so one user's data is never served to
    /// the next. Returns whether the identity changed.
    pub fn scope_to(&self, identity: Option<&str>) -> bool {
        {
            let mut scope = self.inner.scope.lock();
            if scope.as_deref() == identity {
                return false;
            }
            *scope = identity.map(str::to_string);
        }
        let removed = self.clear();
        info!(removed, "session identity changed");
        true
    }

    /// Forget everything, e.g. when the signed-in user changes.
    pub fn clear(&self) -> usize {
        let removed = self.remove(&KeyFilter::Prefix(QueryKey::default()));
        info!(removed, "cache cleared");
        removed
    }

    /// Evict unobserved, idle entries not read within `gc_after`.
    pub fn collect_garbage(&self) -> usize {
        let now = Utc::now();
        let gc_after = self.inner.config.gc_after;
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.observers > 0 || entry.in_flight.is_some() || now - entry.last_access < gc_after
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "garbage collected cache entries");
        }
        evicted
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Number of fetches started for `key` since its entry was created.
    pub fn fetch_count(&self, key: &QueryKey) -> u64 {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|entry| entry.fetch_count)
            .unwrap_or(0)
    }

    /// Spawn the fetch for `entry` and record it as the key's single in-flight
    /// fetch. Must be called with the entries lock held.
    fn start_fetch(
        &self,
        key: &QueryKey,
        entry: &mut Entry,
        fetcher: Fetcher,
    ) -> watch::Receiver<FetchOutcome> {
        let generation = entry.generation;
        let (done_tx, done_rx) = watch::channel(FetchOutcome::Pending);
        entry.in_flight = Some(done_rx.clone());
        entry.status = QueryStatus::Loading;
        entry.fetch_count += 1;
        entry.notify();
        debug!(key = %key, generation, "fetch: start");

        let engine = self.clone();
        let key = key.clone();
        let fetch = fetcher();
        tokio::spawn(async move {
            let result = fetch.await;
            let outcome = engine.complete(&key, generation, result);
            let _ = done_tx.send(outcome);
        });
        done_rx
    }

    fn complete(
        &self,
        key: &QueryKey,
        generation: u64,
        result: Result<ArcAny, SyncError>,
    ) -> FetchOutcome {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            debug!(key = %key, "fetch finished for a removed entry");
            return FetchOutcome::Settled;
        };
        entry.in_flight = None;

        if entry.generation != generation {
            debug!(
                key = %key,
                started = generation,
                current = entry.generation,
                "fetch: discarding result older than last invalidation"
            );
            if entry.observers > 0 {
                if let Some(fetcher) = entry.fetcher.clone() {
                    self.start_fetch(key, entry, fetcher);
                    return FetchOutcome::Settled;
                }
            }
            entry.status = QueryStatus::Idle;
            entry.notify();
            return FetchOutcome::Settled;
        }

        match result {
            // Missing credentials say nothing about the resource. Leave the
            // entry to be fetched again once a token is available.
            Err(error) if error.is_unauthenticated() => {
                debug!(key = %key, generation, "fetch: no session, entry left idle");
                entry.status = QueryStatus::Idle;
                entry.stale = true;
                entry.notify();
                return FetchOutcome::Rejected(error);
            }
            Ok(value) => {
                debug!(key = %key, generation, "fetch: ok");
                entry.status = QueryStatus::Success;
                entry.data = Some(value);
                entry.error = None;
            }
            Err(error) => {
                debug!(key = %key, generation, error = %error, "fetch: err");
                entry.status = QueryStatus::Error;
                entry.error = Some(error);
            }
        }
        entry.stale = false;
        entry.updated_at = Some(Utc::now());
        entry.notify();
        FetchOutcome::Settled
    }

    /// Wait for a fetch to finish. Returns the error of a fetch whose failure
    /// was not stored in the entry.
    async fn wait(
        &self,
        key: &QueryKey,
        mut pending: watch::Receiver<FetchOutcome>,
    ) -> Option<SyncError> {
        let outcome = pending
            .wait_for(|outcome| !matches!(outcome, FetchOutcome::Pending))
            .await
            .map(|outcome| (*outcome).clone());
        match outcome {
            Ok(FetchOutcome::Rejected(error)) => return Some(error),
            Ok(_) => return None,
            Err(_) => {}
        }
        // The fetch task died without reporting (panic or runtime shutdown).
        // Release the key so the next loop iteration can start over.
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            let abandoned = entry
                .in_flight
                .as_ref()
                .is_some_and(|rx| rx.same_channel(&pending));
            if abandoned {
                debug!(key = %key, "fetch task ended without a result");
                entry.in_flight = None;
                entry.status = QueryStatus::Idle;
                entry.stale = true;
                entry.notify();
            }
        }
        None
    }
}

/// An active reader of one key; dropping it stops observation.
pub struct ObserverGuard {
    engine: SyncEngine,
    key: QueryKey,
    changes: watch::Receiver<u64>,
}

impl ObserverGuard {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Wait for the next change to the observed entry. Returns `false` if the
    /// entry can no longer change.
    pub async fn changed(&mut self) -> bool {
        self.changes.changed().await.is_ok()
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let mut entries = self.engine.inner.entries.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.observers = entry.observers.saturating_sub(1);
            entry.last_access = Utc::now();
            debug!(key = %self.key, observers = entry.observers, "observer removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;
    use tokio::sync::Semaphore;

    use crate::api::ApiError;
    use crate::keys::chart_keys;

    /// Fetcher returning an incrementing counter, optionally held on a gate.
    fn counting_fetcher(calls: Arc<AtomicUsize>, gate: Option<Arc<Semaphore>>) -> Fetcher {
        Arc::new(move || {
            let calls = calls.clone();
            let gate = gate.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(gate) = gate {
                    gate.acquire().await.expect("gate open").forget();
                }
                Ok(Arc::new(n) as ArcAny)
            }
            .boxed()
        })
    }

    fn failing_fetcher(calls: Arc<AtomicUsize>, error: SyncError) -> Fetcher {
        Arc::new(move || {
            let calls = calls.clone();
            let error = error.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(error)
            }
            .boxed()
        })
    }

    fn server_error() -> SyncError {
        ApiError::ServerError("boom".to_string()).into()
    }

    async fn settle_tasks() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_fetch() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = counting_fetcher(calls.clone(), Some(gate.clone()));
        let key = chart_keys::published_charts();

        let (a, b, c, _) = tokio::join!(
            engine.fetch::<usize>(&key, fetcher.clone()),
            engine.fetch::<usize>(&key, fetcher.clone()),
            engine.fetch::<usize>(&key, fetcher.clone()),
            async {
                settle_tasks().await;
                gate.add_permits(1);
            }
        );

        assert_eq!(*a.expect("a"), 1);
        assert_eq!(*b.expect("b"), 1);
        assert_eq!(*c.expect("c"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.fetch_count(&key), 1);
    }

    #[tokio::test]
    async fn test_fresh_entry_served_from_cache() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let key = chart_keys::my_chart();

        engine.fetch::<usize>(&key, fetcher.clone()).await.expect("first");
        engine.fetch::<usize>(&key, fetcher.clone()).await.expect("second");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let snapshot = engine.snapshot::<usize>(&key);
        assert!(snapshot.is_success());
        assert!(!snapshot.is_stale);
        assert_eq!(snapshot.data.as_deref(), Some(&1));
    }

    #[tokio::test]
    async fn test_invalidating_unobserved_key_defers_fetch() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let key = chart_keys::my_chart();

        engine.fetch::<usize>(&key, fetcher.clone()).await.expect("initial");
        assert_eq!(engine.invalidate(&KeyFilter::Exact(key.clone())), 1);
        settle_tasks().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snapshot = engine.snapshot::<usize>(&key);
        assert_eq!(snapshot.status, QueryStatus::Idle);
        assert!(snapshot.is_stale);
        assert_eq!(snapshot.data.as_deref(), Some(&1));

        let value = engine.fetch::<usize>(&key, fetcher.clone()).await.expect("refetch");
        assert_eq!(*value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidating_observed_key_refetches_now() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let key = chart_keys::my_chart();

        let mut guard = engine.observe(&key, fetcher.clone());
        engine.fetch::<usize>(&key, fetcher.clone()).await.expect("initial");

        engine.invalidate(&KeyFilter::Exact(key.clone()));
        assert!(engine.snapshot::<usize>(&key).is_fetching());

        while engine.snapshot::<usize>(&key).is_fetching() {
            assert!(guard.changed().await);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.snapshot::<usize>(&key).data.as_deref(), Some(&2));
    }

    #[tokio::test]
    async fn test_result_from_before_invalidation_is_discarded() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = counting_fetcher(calls.clone(), Some(gate.clone()));
        let key = chart_keys::my_chart();

        let reader = {
            let engine = engine.clone();
            let key = key.clone();
            let fetcher = fetcher.clone();
            tokio::spawn(async move { engine.fetch::<usize>(&key, fetcher).await })
        };
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        engine.invalidate(&KeyFilter::Exact(key.clone()));
        gate.add_permits(2);

        let value = reader.await.expect("reader task").expect("value");
        assert_eq!(*value, 2, "first result predates the invalidation");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!engine.snapshot::<usize>(&key).is_stale);
    }

    #[tokio::test]
    async fn test_error_stays_until_invalidated() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = failing_fetcher(calls.clone(), server_error());
        let key = chart_keys::edited_charts();

        assert!(engine.fetch::<usize>(&key, fetcher.clone()).await.is_err());
        assert!(engine.fetch::<usize>(&key, fetcher.clone()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(engine.snapshot::<usize>(&key).is_error());

        engine.invalidate(&KeyFilter::Exact(key.clone()));
        assert!(engine.fetch::<usize>(&key, fetcher.clone()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unauthenticated_failure_is_not_cached() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = failing_fetcher(calls.clone(), SyncError::Unauthenticated("signed out"));
        let key = chart_keys::my_chart();

        let err = engine.fetch::<usize>(&key, fetcher.clone()).await.unwrap_err();
        assert!(err.is_unauthenticated());
        let snapshot = engine.snapshot::<usize>(&key);
        assert_eq!(snapshot.status, QueryStatus::Idle);
        assert!(snapshot.error.is_none());
        assert!(snapshot.is_stale);

        // The next read tries again instead of replaying the failure.
        let good = counting_fetcher(Arc::new(AtomicUsize::new(0)), None);
        assert_eq!(*engine.fetch::<usize>(&key, good).await.expect("retry"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scope_change_drops_entries() {
        let engine = SyncEngine::new(EngineConfig::default());
        let fetcher = counting_fetcher(Arc::new(AtomicUsize::new(0)), None);
        let key = chart_keys::my_chart();

        assert!(engine.scope_to(Some("user-a")));
        engine.fetch::<usize>(&key, fetcher.clone()).await.expect("fetch");
        assert!(!engine.scope_to(Some("user-a")));
        assert!(engine.contains(&key));

        assert!(engine.scope_to(Some("user-b")));
        assert!(!engine.contains(&key));
        assert_eq!(*engine.fetch::<usize>(&key, fetcher).await.expect("refetch"), 2);
    }

    #[tokio::test]
    async fn test_refetch_bypasses_fresh_entry() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let key = chart_keys::published_charts();

        engine.fetch::<usize>(&key, fetcher.clone()).await.expect("initial");
        let value = engine.refetch::<usize>(&key, fetcher.clone()).await.expect("forced");
        assert_eq!(*value, 2);
    }

    #[tokio::test]
    async fn test_aged_entry_is_refetched() {
        let engine = SyncEngine::new(EngineConfig {
            stale_after: Some(Duration::zero()),
            gc_after: Duration::minutes(10),
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let key = chart_keys::published_charts();

        engine.fetch::<usize>(&key, fetcher.clone()).await.expect("initial");
        {
            let mut entries = engine.inner.entries.lock();
            let entry = entries.get_mut(&key).expect("entry");
            entry.updated_at = Some(Utc::now() - Duration::seconds(1));
        }
        engine.fetch::<usize>(&key, fetcher.clone()).await.expect("aged");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_prefix_invalidation_touches_every_variant() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let one = chart_keys::editors("c1", &["u1".to_string()]);
        let two = chart_keys::editors("c1", &["u1".to_string(), "u2".to_string()]);
        let other = chart_keys::editors("c2", &["u1".to_string()]);

        for key in [&one, &two, &other] {
            engine.fetch::<usize>(key, fetcher.clone()).await.expect("fill");
        }
        let touched = engine.invalidate(&KeyFilter::Prefix(chart_keys::editors_of("c1")));
        assert_eq!(touched, 2);
        assert!(engine.snapshot::<usize>(&one).is_stale);
        assert!(engine.snapshot::<usize>(&two).is_stale);
        assert!(!engine.snapshot::<usize>(&other).is_stale);
    }

    #[tokio::test]
    async fn test_garbage_collection_keeps_observed_entries() {
        let engine = SyncEngine::new(EngineConfig {
            stale_after: None,
            gc_after: Duration::zero(),
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let watched = chart_keys::my_chart();
        let orphan = chart_keys::editors("c1", &["u9".to_string()]);

        let _guard = engine.observe(&watched, fetcher.clone());
        engine.fetch::<usize>(&watched, fetcher.clone()).await.expect("watched");
        engine.fetch::<usize>(&orphan, fetcher.clone()).await.expect("orphan");

        assert_eq!(engine.collect_garbage(), 1);
        assert!(engine.contains(&watched));
        assert!(!engine.contains(&orphan));
    }

    #[tokio::test]
    async fn test_clear_resets_observed_and_drops_the_rest() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let watched = chart_keys::my_chart();
        let other = chart_keys::published_charts();

        let guard = engine.observe(&watched, fetcher.clone());
        engine.fetch::<usize>(&watched, fetcher.clone()).await.expect("watched");
        engine.fetch::<usize>(&other, fetcher.clone()).await.expect("other");

        assert_eq!(engine.clear(), 1);
        let snapshot = engine.snapshot::<usize>(guard.key());
        assert_eq!(snapshot.status, QueryStatus::Idle);
        assert!(snapshot.data.is_none());
        assert!(!engine.contains(&other));
    }

    #[tokio::test]
    async fn test_ensure_starts_fetch_without_waiting() {
        let engine = SyncEngine::new(EngineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), None);
        let key = chart_keys::published_charts();

        engine.ensure(&key, fetcher.clone());
        engine.ensure(&key, fetcher.clone());
        assert!(engine.snapshot::<usize>(&key).is_loading());

        let value = engine.fetch::<usize>(&key, fetcher).await.expect("joined");
        assert_eq!(*value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
