/// Keyed payload cache with background polling.
///
/// One `CachePoller` per source key owns the latest snapshot for that feed
/// and, while subscribed, a background task that refetches on the client's
/// interval. Reads are synchronous snapshot clones; writes go through a
/// generation counter so a slow in-flight fetch can never overwrite the
/// result of a later one. Errors keep the previous payload in place so a
/// blip serves stale data instead of a blank view.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::ingest::SourceClient;
use crate::model::{FeedError, SourceKey, SourcePayload};

/// Upper bound on one fetch attempt, over and above the HTTP client's own
/// transport timeout (a multi-point fetch issues several requests).
const FETCH_TIMEOUT: Duration = Duration::from_secs(90);

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of one cache entry. `data` and `error` can coexist:
/// a failed refetch leaves the previous payload in `data` and the failure in
/// `error`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub data: Option<Arc<SourcePayload>>,
    pub error: Option<FeedError>,
    pub is_loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn is_stale(&self, stale_after: Duration, now: DateTime<Utc>) -> bool {
        match self.last_updated {
            Some(updated) => {
                let age = (now - updated).to_std().unwrap_or(Duration::ZERO);
                age >= stale_after
            }
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

enum FetchReason {
    /// First fetch after subscribing, or a subscribe over stale data.
    Initial,
    /// Scheduled tick; refreshes silently in the background.
    Interval,
    /// Explicit refetch request.
    Forced,
}

impl FetchReason {
    /// Only foreground fetches flip the loading flag. Interval refreshes run
    /// behind whatever is already on screen.
    fn shows_loading(&self) -> bool {
        matches!(self, FetchReason::Initial | FetchReason::Forced)
    }
}

struct PollerState {
    snapshot: Snapshot,
    /// Generation handed to the most recently started fetch.
    issued_generation: u64,
    /// Generation of the fetch whose result the snapshot currently holds.
    applied_generation: u64,
    /// Set by `force_refetch`, consumed by the next poll. Lets any number of
    /// force requests raised in one tick collapse into a single fetch.
    pending_force: bool,
    subscribers: usize,
    task: Option<JoinHandle<()>>,
}

pub struct CachePoller {
    client: Arc<dyn SourceClient>,
    state: Mutex<PollerState>,
    wakeup: Notify,
    /// Broadcasts `applied_generation` so forced refetches can await the
    /// arrival of their own (or any later) result.
    applied_tx: watch::Sender<u64>,
}

impl CachePoller {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        let (applied_tx, _) = watch::channel(0);
        Self {
            client,
            state: Mutex::new(PollerState {
                snapshot: Snapshot::default(),
                issued_generation: 0,
                applied_generation: 0,
                pending_force: false,
                subscribers: 0,
                task: None,
            }),
            wakeup: Notify::new(),
            applied_tx,
        }
    }

    pub fn key(&self) -> SourceKey {
        self.client.key()
    }

    fn lock(&self) -> MutexGuard<'_, PollerState> {
        // A panic inside the short critical sections below would be a bug in
        // this module; recover the guard rather than cascading the poison.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current cache entry, cloned. Never blocks on the network.
    pub fn current(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().task.is_some()
    }

    /// Registers a consumer. The background poll loop starts on the first
    /// subscriber; a fresh cache entry is served as-is, while a missing or
    /// stale one triggers an immediate foreground fetch before the interval
    /// schedule takes over.
    pub fn subscribe(self: &Arc<Self>) {
        let mut state = self.lock();
        state.subscribers += 1;
        if state.task.is_some() {
            return;
        }
        let fetch_now = state
            .snapshot
            .is_stale(self.client.stale_after(), Utc::now());
        let poller = Arc::clone(self);
        state.task = Some(tokio::spawn(async move {
            poller.run(fetch_now).await;
        }));
    }

    /// Releases one subscription. The poll loop stops when the last consumer
    /// unsubscribes; the cached snapshot stays in place for the next one.
    pub fn unsubscribe(&self) {
        let mut state = self.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers > 0 {
            return;
        }
        if let Some(task) = state.task.take() {
            task.abort();
            // An aborted in-flight fetch never applies; drop its generation
            // marker so a later direct refetch does not wait on it.
            state.issued_generation = state.applied_generation;
            state.snapshot.is_loading = false;
        }
    }

    /// Requests an immediate refetch and waits for a result at least as new
    /// as the request. While subscribed the request is handed to the poll
    /// loop; without a loop it fetches directly, and a caller arriving while
    /// a direct fetch is in flight attaches to that fetch. Either way,
    /// concurrent callers share one network call.
    pub async fn force_refetch(self: &Arc<Self>) -> Snapshot {
        enum Plan {
            /// Hand the request to the poll loop and await its result.
            HandOff(u64),
            /// A fetch for this key is already in flight; await it.
            Attach(u64),
            /// Fetch right here under the reserved generation.
            Fetch(u64),
        }

        let plan = {
            let mut state = self.lock();
            if state.task.is_some() {
                state.pending_force = true;
                Plan::HandOff(state.issued_generation + 1)
            } else if state.issued_generation > state.applied_generation {
                Plan::Attach(state.issued_generation)
            } else {
                Plan::Fetch(Self::issue_generation(&mut state, &FetchReason::Forced))
            }
        };

        match plan {
            Plan::HandOff(target) => {
                self.wakeup.notify_one();
                self.wait_applied(target).await;
            }
            Plan::Attach(target) => self.wait_applied(target).await,
            Plan::Fetch(generation) => self.execute_fetch(generation).await,
        }
        self.current()
    }

    async fn wait_applied(&self, target: u64) {
        let mut rx = self.applied_tx.subscribe();
        let _ = rx.wait_for(|applied| *applied >= target).await;
    }

    async fn run(self: Arc<Self>, fetch_now: bool) {
        if fetch_now {
            self.poll_once(FetchReason::Initial).await;
        }
        let interval = self.client.refetch_interval();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.poll_once(FetchReason::Interval).await;
                }
                _ = self.wakeup.notified() => {
                    // A leftover wakeup permit from an already-serviced force
                    // request lands here with the flag cleared; skip it.
                    let forced = std::mem::take(&mut self.lock().pending_force);
                    if forced {
                        self.poll_once(FetchReason::Forced).await;
                    }
                }
            }
        }
    }

    async fn poll_once(&self, reason: FetchReason) {
        let generation = {
            let mut state = self.lock();
            Self::issue_generation(&mut state, &reason)
        };
        self.execute_fetch(generation).await;
    }

    /// Reserves the next generation for a fetch that is about to start.
    /// Callers must hold the state lock for the whole decision that led here,
    /// so no two fetches can claim the same slot.
    fn issue_generation(state: &mut PollerState, reason: &FetchReason) -> u64 {
        state.pending_force = false;
        state.issued_generation += 1;
        if reason.shows_loading() {
            state.snapshot.is_loading = true;
        }
        state.issued_generation
    }

    async fn execute_fetch(&self, generation: u64) {
        let result = match timeout(FETCH_TIMEOUT, self.client.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout { key: self.key() }),
        };

        {
            let mut state = self.lock();
            if generation < state.applied_generation {
                // A newer fetch already landed; this result is out of date.
                return;
            }
            state.applied_generation = generation;
            match result {
                Ok(payload) => {
                    state.snapshot.data = Some(Arc::new(payload));
                    state.snapshot.error = None;
                    state.snapshot.last_updated = Some(Utc::now());
                }
                Err(err) => {
                    tracing::warn!(source = %self.key(), error = %err, "fetch failed");
                    // Previous payload stays in place.
                    state.snapshot.error = Some(err);
                }
            }
            state.snapshot.is_loading = false;
        }
        let _ = self.applied_tx.send(generation);
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All pollers, keyed by source. Built once at startup from the full client
/// set; nothing polls until a key is subscribed.
pub struct CacheRegistry {
    pollers: HashMap<SourceKey, Arc<CachePoller>>,
}

impl CacheRegistry {
    pub fn new(clients: Vec<Arc<dyn SourceClient>>) -> Self {
        let pollers = clients
            .into_iter()
            .map(|client| (client.key(), Arc::new(CachePoller::new(client))))
            .collect();
        Self { pollers }
    }

    pub fn poller(&self, key: SourceKey) -> Option<&Arc<CachePoller>> {
        self.pollers.get(&key)
    }

    /// Snapshot for a key; an unknown key reads as an empty entry.
    pub fn snapshot(&self, key: SourceKey) -> Snapshot {
        self.pollers
            .get(&key)
            .map(|p| p.current())
            .unwrap_or_default()
    }

    pub fn subscribe(&self, key: SourceKey) {
        if let Some(poller) = self.pollers.get(&key) {
            poller.subscribe();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::ingest::FetchResult;
    use crate::model::{EarthquakeRecord, GeoPoint, HazardRecord};

    /// Test double that replays a scripted sequence of results, counting
    /// fetches. After the script runs out it keeps returning an empty batch.
    struct ScriptedClient {
        calls: AtomicUsize,
        responses: StdMutex<VecDeque<FetchResult>>,
        delay: Duration,
        interval: Duration,
    }

    impl ScriptedClient {
        fn new(responses: Vec<FetchResult>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: StdMutex::new(responses.into()),
                delay: Duration::from_millis(50),
                interval: Duration::from_secs(60),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceClient for ScriptedClient {
        fn key(&self) -> SourceKey {
            SourceKey::Seismic
        }

        fn refetch_interval(&self) -> Duration {
            self.interval
        }

        async fn fetch(&self) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(SourcePayload::Records(vec![])))
        }
    }

    fn quake_payload(id: &str) -> FetchResult {
        Ok(SourcePayload::Records(vec![HazardRecord::Earthquake(
            EarthquakeRecord {
                id: id.to_string(),
                point: GeoPoint::new(15.0, 100.0).unwrap(),
                time: Utc::now(),
                magnitude: 4.0,
                depth_km: None,
                place: String::new(),
            },
        )]))
    }

    async fn wait_until_ready(poller: &Arc<CachePoller>) {
        while poller.current().data.is_none() && poller.current().error.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_force_refetches_share_one_fetch() {
        let client = ScriptedClient::new(vec![quake_payload("a"), quake_payload("b")]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        poller.subscribe();
        wait_until_ready(&poller).await;
        assert_eq!(client.calls(), 1);

        let (s1, s2) = tokio::join!(poller.force_refetch(), poller.force_refetch());
        assert_eq!(
            client.calls(),
            2,
            "two force requests in one tick must collapse into one fetch"
        );
        assert!(s1.data.is_some());
        assert!(s2.data.is_some());
        assert!(!s1.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_keeps_previous_payload() {
        let client = ScriptedClient::new(vec![
            quake_payload("a"),
            Err(FeedError::SourceUnavailable {
                key: SourceKey::Seismic,
                status: 503,
            }),
        ]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        poller.subscribe();
        wait_until_ready(&poller).await;

        let snapshot = poller.force_refetch().await;
        assert!(snapshot.error.is_some(), "failure must be surfaced");
        let payload = snapshot.data.as_deref().expect("stale payload must survive");
        assert_eq!(payload.records().len(), 1, "previous records still served");
        assert!(!snapshot.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_before_first_success_leaves_data_empty() {
        let client = ScriptedClient::new(vec![Err(FeedError::AuthFailure {
            key: SourceKey::Seismic,
        })]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        let snapshot = poller.force_refetch().await;
        assert!(snapshot.data.is_none());
        assert!(matches!(snapshot.error, Some(FeedError::AuthFailure { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refetch_without_subscription_fetches_directly() {
        let client = ScriptedClient::new(vec![quake_payload("a")]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        assert!(!poller.is_subscribed());
        let snapshot = poller.force_refetch().await;
        assert_eq!(client.calls(), 1);
        assert!(snapshot.data.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribed_concurrent_forces_share_one_fetch() {
        let client = ScriptedClient::new(vec![quake_payload("a")]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        assert!(!poller.is_subscribed());

        let (s1, s2) = tokio::join!(poller.force_refetch(), poller.force_refetch());
        assert_eq!(
            client.calls(),
            1,
            "the second caller must attach to the in-flight fetch"
        );
        assert!(s1.data.is_some());
        assert!(s2.data.is_some());
        assert!(!s1.is_loading && !s2.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_refetch_works_again_after_unsubscribe() {
        // An aborted loop must not leave a generation marker behind that a
        // later direct refetch would wait on forever.
        let client = ScriptedClient::new(vec![quake_payload("a"), quake_payload("b")]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        poller.subscribe();
        // Unsubscribe while the initial fetch is still in flight.
        tokio::time::sleep(Duration::from_millis(5)).await;
        poller.unsubscribe();

        let snapshot = poller.force_refetch().await;
        assert!(snapshot.data.is_some(), "direct refetch must still complete");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_refetches_happen_while_subscribed() {
        let client = ScriptedClient::new(vec![quake_payload("a"), quake_payload("b")]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        poller.subscribe();
        wait_until_ready(&poller).await;
        assert_eq!(client.calls(), 1);

        tokio::time::sleep(client.interval + Duration::from_secs(1)).await;
        assert!(client.calls() >= 2, "interval tick must refetch");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_the_poll_loop_but_keeps_data() {
        let client = ScriptedClient::new(vec![quake_payload("a")]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        poller.subscribe();
        wait_until_ready(&poller).await;
        poller.unsubscribe();
        assert!(!poller.is_subscribed());

        tokio::time::sleep(client.interval * 3).await;
        assert_eq!(client.calls(), 1, "no ticks after unsubscribe");
        assert!(poller.current().data.is_some(), "cache survives unsubscribe");
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_only_when_the_last_subscriber_leaves() {
        let client = ScriptedClient::new(vec![quake_payload("a")]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        poller.subscribe();
        poller.subscribe();
        wait_until_ready(&poller).await;

        poller.unsubscribe();
        assert!(poller.is_subscribed(), "one consumer remains");
        poller.unsubscribe();
        assert!(!poller.is_subscribed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_over_fresh_data_serves_cache_without_fetch() {
        let client = ScriptedClient::new(vec![quake_payload("a")]);
        let poller = Arc::new(CachePoller::new(
            Arc::clone(&client) as Arc<dyn SourceClient>
        ));
        poller.subscribe();
        wait_until_ready(&poller).await;
        poller.unsubscribe();

        // Well within stale_after (2x interval), so no foreground fetch.
        poller.subscribe();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.calls(), 1);
        assert!(!poller.current().is_loading);
        poller.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_keys_pollers_by_source() {
        let client = ScriptedClient::new(vec![]);
        let registry = CacheRegistry::new(vec![client as Arc<dyn SourceClient>]);
        assert!(registry.poller(SourceKey::Seismic).is_some());
        assert!(registry.poller(SourceKey::Drought).is_none());
        let empty = registry.snapshot(SourceKey::Drought);
        assert!(empty.data.is_none() && empty.error.is_none());
    }
}
