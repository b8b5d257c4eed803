//! TTL metadata cache wrapping a backend
//!
//! [`CachingClient`] decorates any [`Backend`] and absorbs repeat
//! metadata traffic: flow lists, single flows, structures, and keys-only
//! snapshots are cached under namespaced keys scoped by the backend base,
//! so two connections to different hosts (or the same host under a
//! different language) never share entries.
//!
//! Full-data retrieval always passes through. Observation payloads are
//! unbounded and stale data is worse than a refetch; only enumerable
//! metadata is worth holding.
//!
//! Keys-only snapshots reuse by supersession: a cached snapshot taken
//! under a broader query answers any narrower query by replaying the
//! snapshot filtered to the requested key. One snapshot is held per flow;
//! a query the snapshot does not cover replaces it wholesale.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::{Backend, SeriesStream, VecSeriesStream};
use crate::error::Result;
use crate::schema::DimensionSchema;
use crate::types::{Dataflow, FlowRef, Key, Series, StructureRef};

/// Time source for expiry decisions
///
/// Production uses [`SystemClock`]; tests drive TTL boundaries
/// deterministically through [`ManualClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

/// Keys-only result set with the query it answered
#[derive(Debug, Clone)]
pub struct KeysSnapshot {
    pub query: Key,
    pub series: Vec<Series>,
}

/// One cached value
#[derive(Debug, Clone)]
pub enum CachePayload {
    Flows(Vec<Dataflow>),
    Flow(Dataflow),
    Structure(DimensionSchema),
    Keys(KeysSnapshot),
}

/// Storage behind the caching client
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry; expired entries read as absent
    fn get(&self, key: &str, now: Instant) -> Option<CachePayload>;

    /// Insert an entry; `now` drives the expired-entry purge at capacity
    fn put(&self, key: String, payload: CachePayload, now: Instant, expires_at: Instant);

    fn clear(&self);
}

struct Entry {
    payload: CachePayload,
    expires_at: Instant,
}

/// Bounded in-memory store
///
/// At capacity, expired entries are dropped first; if none have expired
/// the entry closest to expiry is evicted.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Live entry count, for tests and diagnostics
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str, now: Instant) -> Option<CachePayload> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.expires_at <= now {
            return None;
        }
        Some(entry.payload.clone())
    }

    fn put(&self, key: String, payload: CachePayload, now: Instant, expires_at: Instant) {
        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| entry.expires_at > now);
            if entries.len() >= self.max_entries {
                if let Some(victim) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(key, _)| key.clone())
                {
                    entries.remove(&victim);
                }
            }
        }
        entries.insert(key, Entry { payload, expires_at });
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Caching decorator over a backend
pub struct CachingClient<B: Backend> {
    inner: B,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    base: String,
}

impl<B: Backend> CachingClient<B> {
    /// Wrap a backend with the given TTL and a bounded in-memory store
    pub fn new(inner: B, ttl: Duration, max_entries: usize) -> Self {
        Self::with_parts(
            inner,
            ttl,
            Arc::new(MemoryStore::new(max_entries)),
            Arc::new(SystemClock),
        )
    }

    /// Wrap a backend with explicit store and clock
    pub fn with_parts(
        inner: B,
        ttl: Duration,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let base = inner.base();
        Self {
            inner,
            store,
            clock,
            ttl,
            base,
        }
    }

    /// Rescope the namespace under which entries are keyed
    ///
    /// The facade composes the backend base with the preferred language
    /// here, so two localizations of one endpoint never share entries
    /// even on a shared store.
    pub fn with_scope(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Drop every cached entry
    pub fn invalidate(&self) {
        self.store.clear();
    }

    /// The wrapped backend
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn cache_put(&self, key: String, payload: CachePayload) {
        let now = self.clock.now();
        self.store.put(key, payload, now, now + self.ttl);
    }

    fn flows_key(&self) -> String {
        format!("flows://{}", self.base)
    }

    fn flow_key(&self, flow: &FlowRef) -> String {
        format!("flow://{}/{}", self.base, flow.id)
    }

    fn structure_key(&self, structure: &StructureRef) -> String {
        format!("struct://{}/{}", self.base, structure.id)
    }

    fn keys_key(&self, flow: &FlowRef) -> String {
        format!("keys://{}/{}", self.base, flow.id)
    }
}

impl<B: Backend> Backend for CachingClient<B> {
    fn base(&self) -> String {
        self.base.clone()
    }

    fn flows(&self) -> Result<Vec<Dataflow>> {
        let cache_key = self.flows_key();
        if let Some(CachePayload::Flows(flows)) = self.store.get(&cache_key, self.clock.now()) {
            debug!(key = %cache_key, "flow list served from cache");
            return Ok(flows);
        }
        let flows = self.inner.flows()?;
        self.cache_put(cache_key, CachePayload::Flows(flows.clone()));
        Ok(flows)
    }

    fn flow(&self, flow: &FlowRef) -> Result<Option<Dataflow>> {
        let cache_key = self.flow_key(flow);
        let now = self.clock.now();
        if let Some(CachePayload::Flow(found)) = self.store.get(&cache_key, now) {
            debug!(key = %cache_key, "flow served from cache");
            return Ok(Some(found));
        }
        // A cached flow list answers single-flow lookups by id without a
        // round trip. The list match is by id only, so agency and version
        // qualifiers on the request are not honored on this path.
        if let Some(CachePayload::Flows(flows)) = self.store.get(&self.flows_key(), now) {
            if let Some(found) = flows.iter().find(|candidate| candidate.flow_ref.id == flow.id) {
                debug!(key = %cache_key, "flow served from cached flow list");
                self.cache_put(cache_key, CachePayload::Flow(found.clone()));
                return Ok(Some(found.clone()));
            }
        }
        let found = self.inner.flow(flow)?;
        if let Some(found) = &found {
            self.cache_put(cache_key, CachePayload::Flow(found.clone()));
        }
        Ok(found)
    }

    fn structure(&self, structure: &StructureRef) -> Result<Option<DimensionSchema>> {
        let cache_key = self.structure_key(structure);
        if let Some(CachePayload::Structure(schema)) =
            self.store.get(&cache_key, self.clock.now())
        {
            debug!(key = %cache_key, "structure served from cache");
            return Ok(Some(schema));
        }
        let found = self.inner.structure(structure)?;
        if let Some(schema) = &found {
            self.cache_put(cache_key, CachePayload::Structure(schema.clone()));
        }
        Ok(found)
    }

    fn data(
        &self,
        flow: &FlowRef,
        key: &Key,
        keys_only: bool,
    ) -> Result<Box<dyn SeriesStream>> {
        if !keys_only {
            // Observation payloads are never cached
            return self.inner.data(flow, key, false);
        }
        let cache_key = self.keys_key(flow);
        if let Some(CachePayload::Keys(snapshot)) = self.store.get(&cache_key, self.clock.now()) {
            if snapshot.query.contains(key) {
                debug!(key = %cache_key, query = %key, "keys replayed from superseding snapshot");
                let replay: Vec<Series> = snapshot
                    .series
                    .into_iter()
                    .filter(|series| key.contains(&series.key))
                    .collect();
                return Ok(Box::new(VecSeriesStream::new(replay)));
            }
        }
        let mut stream = self.inner.data(flow, key, true)?;
        let mut drained = Vec::new();
        while let Some(series) = stream.next_series()? {
            drained.push(series);
        }
        self.cache_put(
            cache_key,
            CachePayload::Keys(KeysSnapshot {
                query: key.clone(),
                series: drained.clone(),
            }),
        );
        Ok(Box::new(VecSeriesStream::new(drained)))
    }

    fn keys_only_supported(&self) -> Result<bool> {
        self.inner.keys_only_supported()
    }

    fn peek_structure_ref(&self, flow: &FlowRef) -> Result<Option<StructureRef>> {
        self.inner.peek_structure_ref(flow)
    }

    fn ping(&self) -> Result<Duration> {
        self.inner.ping()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::schema::Dimension;
    use crate::types::{Frequency, RawObservation};

    const TTL: Duration = Duration::from_secs(300);

    fn backend() -> MemoryBackend {
        let schema = DimensionSchema::new(vec![
            Dimension::new("SUBJECT", 1).with_code("LOCSTL04", "Leading indicator"),
            Dimension::new("LOCATION", 2)
                .with_code("AUS", "Australia")
                .with_code("BEL", "Belgium"),
        ])
        .unwrap();
        let flow = Dataflow::new(
            FlowRef::of("MEI"),
            "Main indicators",
            StructureRef::of("MEI_DSD"),
        );
        let series = vec![
            Series::new(
                Key::parse("LOCSTL04.AUS").unwrap(),
                Frequency::Monthly,
                vec![RawObservation::new(Some("2020-01".into()), Some(1.0))],
            ),
            Series::new(Key::parse("LOCSTL04.BEL").unwrap(), Frequency::Monthly, vec![]),
        ];
        MemoryBackend::new("mem://test/en").with_flow(flow, schema, series)
    }

    fn caching(backend: MemoryBackend, clock: Arc<ManualClock>) -> CachingClient<MemoryBackend> {
        CachingClient::with_parts(backend, TTL, Arc::new(MemoryStore::new(64)), clock)
    }

    #[test]
    fn flows_hit_backend_once_within_ttl() {
        let backend = backend();
        let stats = backend.stats();
        let clock = Arc::new(ManualClock::new());
        let client = caching(backend, clock.clone());

        client.flows().unwrap();
        client.flows().unwrap();
        assert_eq!(stats.flows_calls(), 1);

        clock.advance(TTL + Duration::from_secs(1));
        client.flows().unwrap();
        assert_eq!(stats.flows_calls(), 2);
    }

    #[test]
    fn entry_still_live_just_inside_ttl() {
        let backend = backend();
        let stats = backend.stats();
        let clock = Arc::new(ManualClock::new());
        let client = caching(backend, clock.clone());

        client.flows().unwrap();
        clock.advance(TTL - Duration::from_secs(1));
        client.flows().unwrap();
        assert_eq!(stats.flows_calls(), 1);
    }

    #[test]
    fn flow_lookup_reuses_cached_flow_list() {
        let backend = backend();
        let stats = backend.stats();
        let clock = Arc::new(ManualClock::new());
        let client = caching(backend, clock);

        client.flows().unwrap();
        let found = client.flow(&FlowRef::of("MEI")).unwrap().unwrap();
        assert_eq!(found.flow_ref.id, "MEI");
        assert_eq!(stats.flow_calls(), 0);
    }

    #[test]
    fn keys_snapshot_answers_narrower_query() {
        let backend = backend();
        let stats = backend.stats();
        let clock = Arc::new(ManualClock::new());
        let client = caching(backend, clock);
        let flow = FlowRef::of("MEI");

        // Broad query populates the snapshot
        let broad = Key::parse("LOCSTL04.").unwrap();
        let mut stream = client.data(&flow, &broad, true).unwrap();
        let mut count = 0;
        while stream.next_series().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(stats.data_calls(), 1);

        // Narrower query replays the snapshot without backend traffic
        let narrow = Key::parse("LOCSTL04.AUS").unwrap();
        let mut stream = client.data(&flow, &narrow, true).unwrap();
        let only = stream.next_series().unwrap().unwrap();
        assert_eq!(only.key, narrow);
        assert!(stream.next_series().unwrap().is_none());
        assert_eq!(stats.data_calls(), 1);
    }

    #[test]
    fn non_superseded_keys_query_replaces_snapshot() {
        let backend = backend();
        let stats = backend.stats();
        let clock = Arc::new(ManualClock::new());
        let client = caching(backend, clock);
        let flow = FlowRef::of("MEI");

        let narrow = Key::parse("LOCSTL04.AUS").unwrap();
        client.data(&flow, &narrow, true).unwrap();
        assert_eq!(stats.data_calls(), 1);

        // Sibling query is not contained in the snapshot
        let sibling = Key::parse("LOCSTL04.BEL").unwrap();
        client.data(&flow, &sibling, true).unwrap();
        assert_eq!(stats.data_calls(), 2);
    }

    #[test]
    fn full_data_always_passes_through() {
        let backend = backend();
        let stats = backend.stats();
        let clock = Arc::new(ManualClock::new());
        let client = caching(backend, clock);
        let flow = FlowRef::of("MEI");
        let key = Key::parse("LOCSTL04.AUS").unwrap();

        client.data(&flow, &key, false).unwrap();
        client.data(&flow, &key, false).unwrap();
        assert_eq!(stats.data_calls(), 2);
    }

    #[test]
    fn store_evicts_at_capacity() {
        let store = MemoryStore::new(2);
        let now = Instant::now();
        let soon = now + Duration::from_secs(10);
        let later = now + Duration::from_secs(100);
        store.put("a".into(), CachePayload::Flows(Vec::new()), now, soon);
        store.put("b".into(), CachePayload::Flows(Vec::new()), now, later);
        store.put("c".into(), CachePayload::Flows(Vec::new()), now, later);
        assert_eq!(store.len(), 2);
        // Earliest expiry went first
        assert!(store.get("a", now).is_none());
        assert!(store.get("b", now).is_some());
        assert!(store.get("c", now).is_some());
    }

    #[test]
    fn purge_at_capacity_follows_the_caller_clock() {
        let store = MemoryStore::new(3);
        let start = Instant::now();
        store.put(
            "a".into(),
            CachePayload::Flows(Vec::new()),
            start,
            start + Duration::from_secs(10),
        );
        store.put(
            "b".into(),
            CachePayload::Flows(Vec::new()),
            start,
            start + Duration::from_secs(20),
        );
        store.put(
            "c".into(),
            CachePayload::Flows(Vec::new()),
            start,
            start + Duration::from_secs(100),
        );

        // At logical time start+50, "a" and "b" have lapsed; a put at
        // capacity must purge both rather than evict a live entry
        let later = start + Duration::from_secs(50);
        store.put(
            "d".into(),
            CachePayload::Flows(Vec::new()),
            later,
            later + Duration::from_secs(100),
        );
        assert_eq!(store.len(), 2);
        assert!(store.get("c", later).is_some());
        assert!(store.get("d", later).is_some());
    }

    #[test]
    fn invalidate_clears_everything() {
        let backend = backend();
        let stats = backend.stats();
        let clock = Arc::new(ManualClock::new());
        let client = caching(backend, clock);

        client.flows().unwrap();
        client.invalidate();
        client.flows().unwrap();
        assert_eq!(stats.flows_calls(), 2);
    }
}
