//! Dimension schema for one dataset type
//!
//! A [`DimensionSchema`] is the ordered, positioned set of dimension
//! identifiers declared by (or inferred for) a dataset. It is built once
//! per metadata fetch, is immutable afterwards, and is superseded wholesale
//! on cache expiry rather than partially mutated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

/// One dimension: identifier, 1-based wire position, and code list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Dimension identifier, unique within a schema
    pub id: String,
    /// 1-based wire position
    pub position: usize,
    /// Code list: code to display label. Sorted so that navigation
    /// children come out in lexicographic order without re-sorting.
    pub codes: BTreeMap<String, String>,
}

impl Dimension {
    /// Create a dimension with an empty code list
    pub fn new(id: impl Into<String>, position: usize) -> Self {
        Self {
            id: id.into(),
            position,
            codes: BTreeMap::new(),
        }
    }

    /// Add a code with its display label
    pub fn with_code(mut self, code: impl Into<String>, label: impl Into<String>) -> Self {
        self.codes.insert(code.into(), label.into());
        self
    }

    /// Label for a code, falling back to the raw code
    pub fn label_of(&self, code: &str) -> String {
        self.codes
            .get(code)
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }
}

/// Ordered, positioned set of dimensions for one dataset type
///
/// Invariants enforced at construction: positions are a contiguous
/// permutation of `1..=N` and identifiers are unique. The id-to-position
/// table is built once here and reused by the key/path converter, keeping
/// conversion O(depth) instead of O(depth * N).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionSchema {
    dimensions: Vec<Dimension>,
    by_id: HashMap<String, usize>,
}

impl DimensionSchema {
    /// Build a schema from dimensions, validating invariants
    ///
    /// Dimensions may arrive in any order; they are stored sorted by
    /// position.
    pub fn new(mut dimensions: Vec<Dimension>) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(Error::Configuration(
                "a schema must declare at least one dimension".to_string(),
            ));
        }
        dimensions.sort_by_key(|d| d.position);
        let mut by_id = HashMap::with_capacity(dimensions.len());
        for (index, dim) in dimensions.iter().enumerate() {
            if dim.position != index + 1 {
                return Err(Error::Configuration(format!(
                    "dimension positions must be a contiguous permutation of 1..{}, found {} at slot {}",
                    dimensions.len(),
                    dim.position,
                    index + 1
                )));
            }
            if by_id.insert(dim.id.clone(), index).is_some() {
                return Err(Error::Configuration(format!(
                    "duplicate dimension id '{}'",
                    dim.id
                )));
            }
        }
        Ok(Self { dimensions, by_id })
    }

    /// Number of dimensions
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    /// True when the schema has no dimensions (never constructible)
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Dimensions in wire-position order
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Dimension at a zero-based index
    pub fn dimension_at(&self, index: usize) -> Option<&Dimension> {
        self.dimensions.get(index)
    }

    /// Dimension by identifier
    pub fn dimension(&self, id: &str) -> Option<&Dimension> {
        self.by_id.get(id).map(|&i| &self.dimensions[i])
    }

    /// 1-based wire position of a dimension id
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).map(|&i| i + 1)
    }
}
