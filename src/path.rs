//! Cube addressing: hierarchical drill-down paths and key conversion
//!
//! A [`CubePath`] is a root-to-leaf sequence of `(dimension, value)` pairs
//! representing a position in a navigation tree. The tree's traversal
//! order ([`CubeOrder`]) is declared by the caller and is independent of
//! the wire schema's positional order: a UI may browse `LOCATION` before
//! `SUBJECT` even if the wire schema orders them the other way around.
//!
//! [`KeyPathConverter`] maps bidirectionally between paths and flat
//! [`Key`]s. Both directions are pure functions over the bound schema;
//! `to_key` and `to_path` are inverses of each other modulo wildcard
//! collapsing.
//!
//! # Example
//!
//! ```rust
//! use sdmx_cube::path::{CubeOrder, KeyPathConverter};
//! use sdmx_cube::schema::{Dimension, DimensionSchema};
//! use sdmx_cube::types::Key;
//!
//! let schema = DimensionSchema::new(vec![
//!     Dimension::new("SUBJECT", 1),
//!     Dimension::new("LOCATION", 2).with_code("AUS", "Australia"),
//! ])
//! .unwrap();
//! let order = CubeOrder::new(&schema, vec!["LOCATION".into(), "SUBJECT".into()]).unwrap();
//! let converter = KeyPathConverter::new(&schema, &order);
//!
//! let key = Key::parse("LOCSTL04.AUS").unwrap();
//! let path = converter.to_path(&key, 2).unwrap();
//! assert_eq!(converter.to_key(&path).unwrap(), key);
//! ```

use crate::error::{Error, Result};
use crate::schema::DimensionSchema;
use crate::types::Key;

/// Declared dimension traversal order for tree navigation
///
/// May cover only a subset of the schema's dimensions; keys holding a
/// concrete value at an uncovered dimension are unreachable via path
/// navigation and rejected at path construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeOrder {
    dims: Vec<String>,
}

impl CubeOrder {
    /// Declare a traversal order, validated against a schema
    ///
    /// Every listed dimension must exist in the schema and appear at most
    /// once.
    pub fn new(schema: &DimensionSchema, dims: Vec<String>) -> Result<Self> {
        for (index, dim) in dims.iter().enumerate() {
            if schema.position_of(dim).is_none() {
                return Err(Error::IllegalState(format!(
                    "traversal order names unknown dimension '{}'",
                    dim
                )));
            }
            if dims[..index].contains(dim) {
                return Err(Error::IllegalState(format!(
                    "traversal order repeats dimension '{}'",
                    dim
                )));
            }
        }
        Ok(Self { dims })
    }

    /// The wire-position order of a schema as a traversal order
    pub fn wire(schema: &DimensionSchema) -> Self {
        Self {
            dims: schema.dimensions().iter().map(|d| d.id.clone()).collect(),
        }
    }

    /// Dimensions root-to-leaf
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    /// Maximum path depth reachable under this order
    pub fn depth(&self) -> usize {
        self.dims.len()
    }
}

/// Hierarchical drill-down position, root-to-leaf
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CubePath {
    segments: Vec<(String, String)>,
}

impl CubePath {
    /// The root (depth-0) path
    pub fn root() -> Self {
        Self::default()
    }

    /// Current depth
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True for the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// `(dimension, value)` segments root-to-leaf
    pub fn segments(&self) -> &[(String, String)] {
        &self.segments
    }

    /// Drill one level down
    ///
    /// Unvalidated here; [`KeyPathConverter::to_key`] rejects paths that
    /// stray from the traversal order.
    pub fn child(&self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push((dimension.into(), value.into()));
        Self { segments }
    }

    /// Value recorded for a dimension, if the path has reached it
    pub fn value_of(&self, dimension: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(dim, _)| dim == dimension)
            .map(|(_, value)| value.as_str())
    }
}

/// Bidirectional mapping between flat keys and drill-down paths
///
/// Borrows the schema and traversal order; holds no state of its own.
pub struct KeyPathConverter<'a> {
    schema: &'a DimensionSchema,
    order: &'a CubeOrder,
}

impl<'a> KeyPathConverter<'a> {
    /// Create a converter over a schema and traversal order
    pub fn new(schema: &'a DimensionSchema, order: &'a CubeOrder) -> Self {
        Self { schema, order }
    }

    /// Convert a path to the flat key addressing the same cube region
    ///
    /// Dimensions the path has not reached yet become wildcard slots. The
    /// path's segments must follow the traversal order from the root; a
    /// path built any other way is a caller error.
    pub fn to_key(&self, path: &CubePath) -> Result<Key> {
        let mut slots = vec![String::new(); self.schema.len()];
        for (depth, (dim, value)) in path.segments().iter().enumerate() {
            let expected = self.order.dims().get(depth).ok_or_else(|| {
                Error::IllegalState(format!(
                    "path depth {} exceeds traversal order depth {}",
                    path.depth(),
                    self.order.depth()
                ))
            })?;
            if dim != expected {
                return Err(Error::IllegalState(format!(
                    "path segment {} is '{}', traversal order expects '{}'",
                    depth, dim, expected
                )));
            }
            let position = self.schema.position_of(dim).ok_or_else(|| {
                Error::IllegalState(format!("path names unknown dimension '{}'", dim))
            })?;
            slots[position - 1] = value.clone();
        }
        Key::from_slots(slots)
    }

    /// Convert a key to the drill-down path at the given target depth
    ///
    /// Walks the traversal order from the root, reading each dimension's
    /// value out of the key at that dimension's wire position. A key with
    /// a concrete value at a position whose dimension is absent from the
    /// traversal order is unreachable via path navigation and is rejected.
    pub fn to_path(&self, key: &Key, depth: usize) -> Result<CubePath> {
        if key.len() != self.schema.len() {
            return Err(Error::IllegalState(format!(
                "key {} has {} slots, schema has {} dimensions",
                key,
                key.len(),
                self.schema.len()
            )));
        }
        if depth > self.order.depth() {
            return Err(Error::IllegalState(format!(
                "target depth {} exceeds traversal order depth {}",
                depth,
                self.order.depth()
            )));
        }
        for dim in self.schema.dimensions() {
            if !key.is_wildcard_at(dim.position - 1) && !self.order.dims().contains(&dim.id) {
                return Err(Error::IllegalState(format!(
                    "key {} holds a value for dimension '{}' which the traversal order never reaches",
                    key, dim.id
                )));
            }
        }
        let mut segments = Vec::with_capacity(depth);
        for dim in &self.order.dims()[..depth] {
            let position = self
                .schema
                .position_of(dim)
                .ok_or_else(|| Error::IllegalState(format!("unknown dimension '{}'", dim)))?;
            let value = key.get(position - 1).unwrap_or_default().to_string();
            segments.push((dim.clone(), value));
        }
        Ok(CubePath { segments })
    }

    /// Codes selectable at the next drill-down level, sorted
    /// lexicographically
    ///
    /// Returns an empty list once the path has reached the traversal
    /// order's full depth.
    pub fn list_children(&self, path: &CubePath) -> Result<Vec<String>> {
        let Some(dim_id) = self.order.dims().get(path.depth()) else {
            return Ok(Vec::new());
        };
        let dim = self
            .schema
            .dimension(dim_id)
            .ok_or_else(|| Error::IllegalState(format!("unknown dimension '{}'", dim_id)))?;
        Ok(dim.codes.keys().cloned().collect())
    }

    /// Display label for the path's deepest segment
    ///
    /// Falls back to the raw code when the code list registers no label.
    /// The root path labels as `"all"`, matching the canonical
    /// all-wildcard key form.
    pub fn display_label(&self, path: &CubePath) -> String {
        match path.segments().last() {
            None => "all".to_string(),
            Some((dim, code)) => self
                .schema
                .dimension(dim)
                .map(|d| d.label_of(code))
                .unwrap_or_else(|| code.clone()),
        }
    }
}
