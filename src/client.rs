//! Client facade
//!
//! [`SdmxClient`] composes the decorator stack around any backend: the
//! failsafe layer normalizes misbehaving backends, the caching layer
//! absorbs repeat metadata traffic, and the facade adds schema resolution
//! and cursor construction on top.

use std::sync::Arc;
use tracing::debug;

use crate::backend::Backend;
use crate::cache::{CacheStore, CachingClient, Clock, MemoryStore, SystemClock};
use crate::config::ClientConfig;
use crate::cursor::DataCursor;
use crate::error::{Error, Result};
use crate::failsafe::FailsafeClient;
use crate::path::{CubeOrder, CubePath, KeyPathConverter};
use crate::schema::DimensionSchema;
use crate::types::{Dataflow, FlowRef, Key, Series};

/// High-level SDMX client over one backend connection
pub struct SdmxClient {
    backend: CachingClient<FailsafeClient<Box<dyn Backend>>>,
    config: ClientConfig,
}

impl SdmxClient {
    /// Wrap a backend with the standard decorator stack
    pub fn new(backend: Box<dyn Backend>, config: ClientConfig) -> Self {
        Self::with_clock(backend, config, Arc::new(SystemClock))
    }

    /// Wrap a backend with an explicit cache clock
    ///
    /// Tests drive TTL expiry through [`crate::cache::ManualClock`].
    pub fn with_clock(
        backend: Box<dyn Backend>,
        config: ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new(config.cache.max_entries));
        Self::with_parts(backend, config, store, clock)
    }

    /// Wrap a backend with an explicit cache store and clock
    ///
    /// Several clients may share one store; entries stay separated by
    /// connection base and by the configured language, so two
    /// localizations of one endpoint never answer each other's lookups.
    pub fn with_parts(
        backend: Box<dyn Backend>,
        config: ClientConfig,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scope = format!("{}/{}", backend.base(), config.language);
        let backend = CachingClient::with_parts(
            FailsafeClient::new(backend),
            config.cache.ttl(),
            store,
            clock,
        )
        .with_scope(scope);
        Self { backend, config }
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Every dataflow the connection serves
    pub fn flows(&self) -> Result<Vec<Dataflow>> {
        self.backend.flows()
    }

    /// Look up one dataflow
    pub fn flow(&self, flow: &FlowRef) -> Result<Dataflow> {
        self.backend
            .flow(flow)?
            .ok_or_else(|| Error::NotFound(format!("no dataflow {}", flow.id)))
    }

    /// Resolve the dimension schema behind a flow
    ///
    /// Tries the backend's cheap structure hint first and falls back to a
    /// full flow lookup for the structure reference.
    pub fn schema_for(&self, flow: &FlowRef) -> Result<DimensionSchema> {
        let structure_ref = match self.backend.peek_structure_ref(flow)? {
            Some(hint) => hint,
            None => self.flow(flow)?.structure_ref,
        };
        debug!(flow = %flow.id, structure = %structure_ref.id, "resolving schema");
        self.backend
            .structure(&structure_ref)?
            .ok_or_else(|| Error::NotFound(format!("no structure {}", structure_ref.id)))
    }

    /// Open a cursor over the series matching a key
    ///
    /// The key is bound to the schema's width first, so `"all"` and
    /// partial keys address the whole cube.
    pub fn cursor(&self, flow: &FlowRef, key: &Key, keys_only: bool) -> Result<DataCursor> {
        let schema = self.schema_for(flow)?;
        let bound = key.bind(schema.len())?;
        DataCursor::open(
            &self.backend,
            flow,
            &bound,
            &schema,
            keys_only,
            self.config.query.max_generated_keys,
        )
    }

    /// Open a cursor at a drill-down path
    pub fn cursor_at_path(
        &self,
        flow: &FlowRef,
        order: &CubeOrder,
        path: &CubePath,
        keys_only: bool,
    ) -> Result<DataCursor> {
        let schema = self.schema_for(flow)?;
        let converter = KeyPathConverter::new(&schema, order);
        let key = converter.to_key(path)?;
        let bound = key.bind(schema.len())?;
        DataCursor::open(
            &self.backend,
            flow,
            &bound,
            &schema,
            keys_only,
            self.config.query.max_generated_keys,
        )
    }

    /// Fetch exactly one series by fully qualified key
    ///
    /// Absent or empty-result series surface as [`Error::NotFound`].
    pub fn series(&self, flow: &FlowRef, key: &Key) -> Result<Series> {
        let mut cursor = self.cursor(flow, key, false)?;
        while cursor.advance_series()? {
            if cursor.current_is_sentinel()? {
                continue;
            }
            if cursor.current_key()? == key {
                return Ok(cursor.current_series()?.clone());
            }
        }
        Err(Error::NotFound(format!("no series {key} in {}", flow.id)))
    }
}
