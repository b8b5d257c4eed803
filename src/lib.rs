//! SDMX client library
//!
//! Addressing, retrieval and structural decoding for SDMX (Statistical
//! Data and Metadata eXchange) data sources. The crate separates three
//! concerns:
//!
//! - **Addressing**: positional [`types::Key`]s with wildcard slots, and
//!   [`path::CubePath`] drill-down paths over a declared traversal order,
//!   convertible in both directions.
//! - **Retrieval**: a lazy [`cursor::DataCursor`] over any
//!   [`backend::Backend`], with keys-only fast paths, local Cartesian
//!   emulation for backends without them, and observation gathering onto
//!   a regular time axis.
//! - **Resilience**: a TTL [`cache::CachingClient`] for metadata and a
//!   panic-catching [`failsafe::FailsafeClient`] for third-party
//!   backends, composed by the [`client::SdmxClient`] facade.
//!
//! SDMX-ML documents in the Generic and Compact encodings of versions
//! 2.0 and 2.1 are probed, decoded and schema-inferred by [`decode`].
//!
//! ```no_run
//! use sdmx_cube::backend::FileBackend;
//! use sdmx_cube::client::SdmxClient;
//! use sdmx_cube::config::ClientConfig;
//! use sdmx_cube::types::Key;
//!
//! # fn main() -> sdmx_cube::error::Result<()> {
//! let backend = Box::new(FileBackend::open("MEI.xml")?);
//! let client = SdmxClient::new(backend, ClientConfig::default());
//! let flow = client.flows()?.remove(0);
//! let key = Key::parse("LOCSTL04..M")?;
//! let mut cursor = client.cursor(&flow.flow_ref, &key, false)?;
//! while cursor.advance_series()? {
//!     println!("{}: {} observations",
//!         cursor.current_key()?,
//!         cursor.current_data()?.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod cursor;
pub mod decode;
pub mod error;
pub mod failsafe;
pub mod gather;
pub mod path;
pub mod registry;
pub mod schema;
pub mod types;

pub use backend::{Backend, FileBackend, MemoryBackend, SeriesStream};
pub use client::SdmxClient;
pub use config::ClientConfig;
pub use cursor::DataCursor;
pub use error::{ContractViolation, Error, Result};
pub use path::{CubeOrder, CubePath, KeyPathConverter};
pub use registry::BackendRegistry;
pub use schema::{Dimension, DimensionSchema};
pub use types::{Dataflow, FlowRef, Frequency, Key, Observation, RawObservation, Series, StructureRef};
