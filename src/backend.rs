//! Backend SPI and bundled backend implementations
//!
//! A [`Backend`] is one concrete transport serving SDMX metadata and data:
//! a REST endpoint, a local file, or an in-memory repository. The core
//! consumes backends through this trait only; vendor-specific REST
//! adapters plug in externally via [`crate::registry::BackendRegistry`].
//!
//! All methods are synchronous and may block on I/O. Callers needing
//! concurrency run independent cursors on threads of their own choosing.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryBackend`]: an in-memory repository with a configurable
//!   keys-only capability flag, exercising both cursor retrieval paths
//! - [`FileBackend`]: a local SDMX-ML data file, dialect-probed and
//!   schema-inferred through [`crate::decode`]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::decode::{self, Dialect};
use crate::error::{Error, Result};
use crate::schema::DimensionSchema;
use crate::types::{Dataflow, FlowRef, Key, Series, StructureRef};

/// Fallible pull iterator over raw series
///
/// `next_series` is the only operation that may block on I/O. A `None`
/// return means the underlying source is exhausted; an error aborts the
/// stream with no partial recovery.
pub trait SeriesStream: Send {
    /// Pull the next raw series, or `None` once exhausted
    fn next_series(&mut self) -> Result<Option<Series>>;
}

/// Stream over an already-materialized batch of series
pub struct VecSeriesStream {
    inner: std::vec::IntoIter<Series>,
}

impl VecSeriesStream {
    /// Stream the given series in order
    pub fn new(series: Vec<Series>) -> Self {
        Self {
            inner: series.into_iter(),
        }
    }
}

impl SeriesStream for VecSeriesStream {
    fn next_series(&mut self) -> Result<Option<Series>> {
        Ok(self.inner.next())
    }
}

/// One concrete transport serving SDMX metadata and data
pub trait Backend: Send + Sync {
    /// Connection base identifying one physical endpoint
    ///
    /// Disambiguates distinct connections so that cache entries from
    /// different endpoints never collide. The client facade appends the
    /// configured language on top, separating localizations as well.
    fn base(&self) -> String;

    /// List every dataflow the backend serves
    fn flows(&self) -> Result<Vec<Dataflow>>;

    /// Look up one dataflow
    ///
    /// A conforming backend returns `Some` for flows it serves; `None`
    /// where a flow is required is a contract violation normalized by
    /// [`crate::failsafe::FailsafeClient`].
    fn flow(&self, flow: &FlowRef) -> Result<Option<Dataflow>>;

    /// Retrieve the structure behind a structure reference
    fn structure(&self, structure: &StructureRef) -> Result<Option<DimensionSchema>>;

    /// Retrieve series matching a key
    ///
    /// With `keys_only` set, a capable backend returns every matching key
    /// without observation data.
    fn data(&self, flow: &FlowRef, key: &Key, keys_only: bool)
        -> Result<Box<dyn SeriesStream>>;

    /// Whether the backend can serve series-keys-only queries cheaply
    ///
    /// A `false` result is a capability statement, never an error.
    fn keys_only_supported(&self) -> Result<bool>;

    /// Cheap hint at the structure reference behind a flow, if available
    fn peek_structure_ref(&self, flow: &FlowRef) -> Result<Option<StructureRef>>;

    /// Health probe returning elapsed latency
    fn ping(&self) -> Result<Duration>;
}

impl Backend for Box<dyn Backend> {
    fn base(&self) -> String {
        (**self).base()
    }

    fn flows(&self) -> Result<Vec<Dataflow>> {
        (**self).flows()
    }

    fn flow(&self, flow: &FlowRef) -> Result<Option<Dataflow>> {
        (**self).flow(flow)
    }

    fn structure(&self, structure: &StructureRef) -> Result<Option<DimensionSchema>> {
        (**self).structure(structure)
    }

    fn data(
        &self,
        flow: &FlowRef,
        key: &Key,
        keys_only: bool,
    ) -> Result<Box<dyn SeriesStream>> {
        (**self).data(flow, key, keys_only)
    }

    fn keys_only_supported(&self) -> Result<bool> {
        (**self).keys_only_supported()
    }

    fn peek_structure_ref(&self, flow: &FlowRef) -> Result<Option<StructureRef>> {
        (**self).peek_structure_ref(flow)
    }

    fn ping(&self) -> Result<Duration> {
        (**self).ping()
    }
}

/// Per-operation call counters
///
/// Shared out of [`MemoryBackend`] so tests can assert exact backend
/// traffic through decorator layers.
#[derive(Debug, Default)]
pub struct BackendStats {
    flows: AtomicU64,
    flow: AtomicU64,
    structure: AtomicU64,
    data: AtomicU64,
}

impl BackendStats {
    /// Calls to `flows()`
    pub fn flows_calls(&self) -> u64 {
        self.flows.load(Ordering::Relaxed)
    }

    /// Calls to `flow()`
    pub fn flow_calls(&self) -> u64 {
        self.flow.load(Ordering::Relaxed)
    }

    /// Calls to `structure()`
    pub fn structure_calls(&self) -> u64 {
        self.structure.load(Ordering::Relaxed)
    }

    /// Calls to `data()`
    pub fn data_calls(&self) -> u64 {
        self.data.load(Ordering::Relaxed)
    }
}

/// In-memory repository backend
///
/// Holds flows, structures and series directly. The keys-only capability
/// flag is configurable so both cursor retrieval paths can be exercised
/// against the same data.
pub struct MemoryBackend {
    base: String,
    flows: Vec<Dataflow>,
    structures: HashMap<String, DimensionSchema>,
    series: HashMap<String, Vec<Series>>,
    keys_only: bool,
    stats: Arc<BackendStats>,
}

impl MemoryBackend {
    /// Create an empty repository under the given base
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            flows: Vec::new(),
            structures: HashMap::new(),
            series: HashMap::new(),
            keys_only: true,
            stats: Arc::new(BackendStats::default()),
        }
    }

    /// Register a dataflow with its structure and series
    pub fn with_flow(
        mut self,
        flow: Dataflow,
        schema: DimensionSchema,
        series: Vec<Series>,
    ) -> Self {
        self.structures
            .insert(flow.structure_ref.id.clone(), schema);
        self.series.insert(flow.flow_ref.id.clone(), series);
        self.flows.push(flow);
        self
    }

    /// Set the keys-only capability flag
    pub fn with_keys_only_support(mut self, supported: bool) -> Self {
        self.keys_only = supported;
        self
    }

    /// Handle on the call counters, valid after the backend moves into
    /// decorator layers
    pub fn stats(&self) -> Arc<BackendStats> {
        Arc::clone(&self.stats)
    }
}

impl Backend for MemoryBackend {
    fn base(&self) -> String {
        self.base.clone()
    }

    fn flows(&self) -> Result<Vec<Dataflow>> {
        self.stats.flows.fetch_add(1, Ordering::Relaxed);
        Ok(self.flows.clone())
    }

    fn flow(&self, flow: &FlowRef) -> Result<Option<Dataflow>> {
        self.stats.flow.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .flows
            .iter()
            .find(|candidate| candidate.flow_ref.id == flow.id)
            .cloned())
    }

    fn structure(&self, structure: &StructureRef) -> Result<Option<DimensionSchema>> {
        self.stats.structure.fetch_add(1, Ordering::Relaxed);
        Ok(self.structures.get(&structure.id).cloned())
    }

    fn data(
        &self,
        flow: &FlowRef,
        key: &Key,
        keys_only: bool,
    ) -> Result<Box<dyn SeriesStream>> {
        self.stats.data.fetch_add(1, Ordering::Relaxed);
        let matches: Vec<Series> = self
            .series
            .get(&flow.id)
            .map(|all| {
                all.iter()
                    .filter(|series| key.contains(&series.key))
                    .map(|series| if keys_only { series.stripped() } else { series.clone() })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(VecSeriesStream::new(matches)))
    }

    fn keys_only_supported(&self) -> Result<bool> {
        Ok(self.keys_only)
    }

    fn peek_structure_ref(&self, flow: &FlowRef) -> Result<Option<StructureRef>> {
        Ok(self
            .flows
            .iter()
            .find(|candidate| candidate.flow_ref.id == flow.id)
            .map(|found| found.structure_ref.clone()))
    }

    fn ping(&self) -> Result<Duration> {
        Ok(Duration::ZERO)
    }
}

/// Local SDMX-ML data file backend
///
/// Probes the dialect once at open time and infers the dimension schema
/// from the data document, since a bare data file carries no structure
/// declaration.
pub struct FileBackend {
    path: PathBuf,
    document: String,
    dialect: Dialect,
    flow: Dataflow,
    schema: DimensionSchema,
}

impl FileBackend {
    /// Open an SDMX-ML data file, inferring the schema from its series
    ///
    /// Fails when the file is unreadable, the dialect cannot be
    /// determined (SDMX 1.0 documents land here), or no schema can be
    /// inferred.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (path, document, dialect) = Self::load(path)?;
        let schema = decode::infer_schema(&document, dialect)?;
        Ok(Self::assemble(path, document, dialect, schema))
    }

    /// Open an SDMX-ML data file with a companion structure document
    ///
    /// The explicit structure wins over inference: dimension order,
    /// positions and code lists (including codes the data never uses)
    /// come from the structure file.
    pub fn open_with_structure(
        path: impl AsRef<Path>,
        structure: impl AsRef<Path>,
    ) -> Result<Self> {
        let (path, document, dialect) = Self::load(path)?;
        let structure_document = std::fs::read_to_string(structure)?;
        let schema = decode::decode_structure(&structure_document)?;
        Ok(Self::assemble(path, document, dialect, schema))
    }

    fn load(path: impl AsRef<Path>) -> Result<(PathBuf, String, Dialect)> {
        let path = path.as_ref().to_path_buf();
        let document = std::fs::read_to_string(&path)?;
        let dialect = decode::probe(&document)?;
        if dialect == Dialect::Unknown {
            return Err(Error::Configuration(format!(
                "unsupported SDMX-ML dialect in {}",
                path.display()
            )));
        }
        Ok((path, document, dialect))
    }

    fn assemble(path: PathBuf, document: String, dialect: Dialect, schema: DimensionSchema) -> Self {
        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("DATASET")
            .to_string();
        let flow = Dataflow::new(
            FlowRef::of(id.clone()),
            id.clone(),
            StructureRef::of(format!("{}_DSD", id)),
        );
        Self {
            path,
            document,
            dialect,
            flow,
            schema,
        }
    }

    /// The probed dialect of the underlying document
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl Backend for FileBackend {
    fn base(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn flows(&self) -> Result<Vec<Dataflow>> {
        Ok(vec![self.flow.clone()])
    }

    fn flow(&self, flow: &FlowRef) -> Result<Option<Dataflow>> {
        Ok((flow.id == self.flow.flow_ref.id).then(|| self.flow.clone()))
    }

    fn structure(&self, structure: &StructureRef) -> Result<Option<DimensionSchema>> {
        Ok((structure.id == self.flow.structure_ref.id).then(|| self.schema.clone()))
    }

    fn data(
        &self,
        flow: &FlowRef,
        key: &Key,
        keys_only: bool,
    ) -> Result<Box<dyn SeriesStream>> {
        if flow.id != self.flow.flow_ref.id {
            return Ok(Box::new(VecSeriesStream::new(Vec::new())));
        }
        let decoded = decode::decode_series(&self.document, self.dialect, &self.schema)?;
        let matches: Vec<Series> = decoded
            .into_iter()
            .filter(|series| key.contains(&series.key))
            .map(|series| if keys_only { series.stripped() } else { series })
            .collect();
        Ok(Box::new(VecSeriesStream::new(matches)))
    }

    fn keys_only_supported(&self) -> Result<bool> {
        Ok(true)
    }

    fn peek_structure_ref(&self, flow: &FlowRef) -> Result<Option<StructureRef>> {
        Ok((flow.id == self.flow.flow_ref.id).then(|| self.flow.structure_ref.clone()))
    }

    fn ping(&self) -> Result<Duration> {
        let started = Instant::now();
        std::fs::metadata(&self.path)?;
        Ok(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Dimension;
    use crate::types::{Frequency, RawObservation};

    fn backend() -> MemoryBackend {
        let schema = DimensionSchema::new(vec![
            Dimension::new("SUBJECT", 1),
            Dimension::new("LOCATION", 2)
                .with_code("AUS", "Australia")
                .with_code("BEL", "Belgium"),
        ])
        .unwrap();
        let flow = Dataflow::new(FlowRef::of("MEI"), "Main indicators", StructureRef::of("MEI_DSD"));
        let series = vec![
            Series::new(
                Key::parse("LOCSTL04.AUS").unwrap(),
                Frequency::Monthly,
                vec![RawObservation::new(Some("2020-01".into()), Some(1.0))],
            ),
            Series::new(
                Key::parse("LOCSTL04.BEL").unwrap(),
                Frequency::Monthly,
                vec![],
            ),
        ];
        MemoryBackend::new("mem://test/en").with_flow(flow, schema, series)
    }

    #[test]
    fn memory_backend_filters_by_containment() {
        let backend = backend();
        let key = Key::parse("LOCSTL04.").unwrap();
        let mut stream = backend.data(&FlowRef::of("MEI"), &key, false).unwrap();
        let mut seen = 0;
        while stream.next_series().unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 2);

        let narrow = Key::parse("LOCSTL04.AUS").unwrap();
        let mut stream = backend.data(&FlowRef::of("MEI"), &narrow, false).unwrap();
        let first = stream.next_series().unwrap().unwrap();
        assert_eq!(first.key, narrow);
        assert!(stream.next_series().unwrap().is_none());
    }

    #[test]
    fn keys_only_strips_observations() {
        let backend = backend();
        let key = Key::parse("LOCSTL04.AUS").unwrap();
        let mut stream = backend.data(&FlowRef::of("MEI"), &key, true).unwrap();
        let series = stream.next_series().unwrap().unwrap();
        assert!(series.observations.is_empty());
    }

    #[test]
    fn stats_count_calls() {
        let backend = backend();
        let stats = backend.stats();
        backend.flows().unwrap();
        backend.flows().unwrap();
        backend.flow(&FlowRef::of("MEI")).unwrap();
        assert_eq!(stats.flows_calls(), 2);
        assert_eq!(stats.flow_calls(), 1);
        assert_eq!(stats.data_calls(), 0);
    }

    #[test]
    fn peek_returns_structure_hint() {
        let backend = backend();
        let hint = backend.peek_structure_ref(&FlowRef::of("MEI")).unwrap();
        assert_eq!(hint.unwrap().id, "MEI_DSD");
        assert!(backend
            .peek_structure_ref(&FlowRef::of("NOPE"))
            .unwrap()
            .is_none());
    }
}
