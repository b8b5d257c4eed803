//! Core addressing and data types
//!
//! This module defines the structures shared across the crate:
//!
//! # Key Types
//!
//! - **`Key`**: flat ordered dimension-value tuple addressing one series or
//!   a wildcard-filtered set of series
//! - **`FlowRef` / `Dataflow`**: named, versioned dataset references
//! - **`StructureRef`**: reference to a data structure definition
//! - **`Series` / `RawObservation`**: one resolved series with its raw
//!   (period, value) pairs as read off the wire
//! - **`Frequency`**: source frequency tag driving observation gathering
//!
//! # Example
//!
//! ```rust
//! use sdmx_cube::types::Key;
//!
//! let key = Key::parse("LOCSTL04..M").unwrap();
//! assert_eq!(key.len(), 3);
//! assert!(key.is_wildcard_at(1));
//!
//! let concrete = Key::parse("LOCSTL04.AUS.M").unwrap();
//! assert!(key.contains(&concrete));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Reference to a dataflow (agency, id, version)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRef {
    /// Maintaining agency, `"all"` when unspecified
    pub agency: String,
    /// Dataflow identifier
    pub id: String,
    /// Version, `"latest"` when unspecified
    pub version: String,
}

impl FlowRef {
    /// Create a fully qualified flow reference
    pub fn new(agency: impl Into<String>, id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            agency: agency.into(),
            id: id.into(),
            version: version.into(),
        }
    }

    /// Create a reference by bare id (`agency = "all"`, `version = "latest"`)
    pub fn of(id: impl Into<String>) -> Self {
        Self::new("all", id, "latest")
    }
}

impl fmt::Display for FlowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.agency, self.id, self.version)
    }
}

/// Reference to a data structure definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructureRef {
    /// Maintaining agency
    pub agency: String,
    /// Structure identifier
    pub id: String,
    /// Version
    pub version: String,
}

impl StructureRef {
    /// Create a fully qualified structure reference
    pub fn new(agency: impl Into<String>, id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            agency: agency.into(),
            id: id.into(),
            version: version.into(),
        }
    }

    /// Create a reference by bare id
    pub fn of(id: impl Into<String>) -> Self {
        Self::new("all", id, "latest")
    }
}

impl fmt::Display for StructureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.agency, self.id, self.version)
    }
}

/// A named, versioned dataset definition referencing one structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataflow {
    /// Reference identifying this dataflow
    pub flow_ref: FlowRef,
    /// Human-readable label
    pub label: String,
    /// The structure this dataflow conforms to
    pub structure_ref: StructureRef,
}

impl Dataflow {
    /// Create a dataflow
    pub fn new(flow_ref: FlowRef, label: impl Into<String>, structure_ref: StructureRef) -> Self {
        Self {
            flow_ref,
            label: label.into(),
            structure_ref,
        }
    }
}

/// Flat ordered dimension-value tuple
///
/// One slot per schema position. An empty string at a slot means
/// "wildcard / any value". Textual grammar: `segment ("." segment)*`; the
/// literal `"all"` is the canonical form of an all-wildcard key of size 1.
///
/// # Example
///
/// ```rust
/// use sdmx_cube::types::Key;
///
/// let broad = Key::parse("LOCSTL04..M").unwrap();
/// let narrow = Key::parse("LOCSTL04.AUS.M").unwrap();
/// assert!(broad.contains(&narrow));
/// assert!(broad.supersedes(&narrow));
/// assert_eq!(narrow.to_string(), "LOCSTL04.AUS.M");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    slots: Vec<String>,
}

impl Key {
    /// Parse a key from its dot-separated textual form
    ///
    /// `"all"` parses to the all-wildcard key of size 1. An empty segment
    /// is a wildcard slot (`"LOCSTL04..M"` has a wildcard at position 2).
    pub fn parse(text: &str) -> Result<Self> {
        if text.eq_ignore_ascii_case("all") {
            return Ok(Self::all_wildcard(1));
        }
        let slots: Vec<String> = text.split('.').map(str::to_string).collect();
        // split() always yields at least one segment, so the "zero segments"
        // case of the grammar cannot occur here
        Ok(Self { slots })
    }

    /// Build a key from owned slot values
    pub fn from_slots(slots: Vec<String>) -> Result<Self> {
        if slots.is_empty() {
            return Err(Error::IllegalState(
                "a key must have at least one slot".to_string(),
            ));
        }
        Ok(Self { slots })
    }

    /// The all-wildcard key of the given size
    pub fn all_wildcard(size: usize) -> Self {
        Self {
            slots: vec![String::new(); size.max(1)],
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the key has no slots (never constructible)
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot value at a zero-based position (empty string = wildcard)
    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).map(String::as_str)
    }

    /// All slot values in positional order
    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// True when the slot at `index` is a wildcard
    pub fn is_wildcard_at(&self, index: usize) -> bool {
        self.slots.get(index).map(|s| s.is_empty()).unwrap_or(false)
    }

    /// True when every slot is a wildcard
    pub fn is_all_wildcard(&self) -> bool {
        self.slots.iter().all(String::is_empty)
    }

    /// Containment check
    ///
    /// Holds iff both keys have the same size and every non-wildcard slot
    /// of `self` equals the corresponding slot of `other`. Transitive for
    /// keys of equal size.
    pub fn contains(&self, other: &Key) -> bool {
        self.slots.len() == other.slots.len()
            && self
                .slots
                .iter()
                .zip(&other.slots)
                .all(|(mine, theirs)| mine.is_empty() || mine == theirs)
    }

    /// Strict broadening check used by the cache supersession rule
    ///
    /// `self` supersedes `other` when it matches strictly more series.
    pub fn supersedes(&self, other: &Key) -> bool {
        self.contains(other) && !other.contains(self)
    }

    /// Rebind a key to a schema of `size` dimensions
    ///
    /// The canonical size-1 all-wildcard key (`"all"`) expands to the
    /// schema's width; any other key must already match it.
    pub fn bind(&self, size: usize) -> Result<Key> {
        if self.is_all_wildcard() && self.slots.len() == 1 {
            return Ok(Key::all_wildcard(size));
        }
        if self.slots.len() != size {
            return Err(Error::IllegalState(format!(
                "key {} has {} slots, schema has {} dimensions",
                self,
                self.slots.len(),
                size
            )));
        }
        Ok(self.clone())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.slots.len() == 1 && self.slots[0].is_empty() {
            return write!(f, "all");
        }
        write!(f, "{}", self.slots.join("."))
    }
}

/// Source frequency tag of a series
///
/// Drives the `(target frequency, aggregation policy)` selection during
/// observation gathering; see [`crate::gather`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    /// One observation per year
    Annual,
    /// One observation per month
    Monthly,
    /// One observation per week
    Weekly,
    /// One observation per day
    Daily,
    /// One observation per hour
    Hourly,
    /// One observation per minute
    Minutely,
    /// Frequency not declared or not recognized
    Undefined,
}

impl Frequency {
    /// Parse a frequency from an SDMX `TIME_FORMAT` or `FREQ` code
    ///
    /// Accepts both ISO-8601 durations (`P1M`, `PT1H`, ...) and the
    /// single-letter frequency code list (`A`, `M`, `W`, `D`, `H`, `N`).
    /// Anything else maps to `Undefined` and is passed through opaquely.
    pub fn from_code(code: &str) -> Self {
        match code {
            "P1Y" | "A" => Frequency::Annual,
            "P1M" | "M" => Frequency::Monthly,
            "P7D" | "P1W" | "W" => Frequency::Weekly,
            "P1D" | "D" => Frequency::Daily,
            "PT1H" | "H" => Frequency::Hourly,
            "PT1M" | "N" => Frequency::Minutely,
            _ => Frequency::Undefined,
        }
    }
}

/// One raw (period, value) pair as read off the wire
///
/// A `None` period means the observation cannot be placed on a time axis;
/// gathering drops it without terminating. A `None` value is an explicit
/// missing-value marker, distinct from an absent period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Source time period, verbatim
    pub period: Option<String>,
    /// Observation value, `None` for an explicit missing marker
    pub value: Option<f64>,
}

impl RawObservation {
    /// Create a raw observation
    pub fn new(period: Option<String>, value: Option<f64>) -> Self {
        Self { period, value }
    }
}

/// One gathered observation on a regular time axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Target period in canonical textual form (`"2020"`, `"2020-01"`)
    pub period: String,
    /// Observation value, `None` for a gap or explicit missing marker
    pub value: Option<f64>,
}

impl Observation {
    /// Create a gathered observation
    pub fn new(period: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            period: period.into(),
            value,
        }
    }
}

/// Label carried by the canonical empty-result sentinel series
pub const SENTINEL_LABEL: &str = "no results matching the query";

/// A resolved series: key, frequency tag, and raw observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Fully resolved key (no wildcard slots for real series)
    pub key: Key,
    /// Source frequency tag
    pub frequency: Frequency,
    /// Display label, when the source declares one
    pub label: Option<String>,
    /// Pass-through attributes beyond label and time format
    pub attributes: HashMap<String, String>,
    /// Raw observations in source order
    pub observations: Vec<RawObservation>,
}

impl Series {
    /// Create a series with observations
    pub fn new(key: Key, frequency: Frequency, observations: Vec<RawObservation>) -> Self {
        Self {
            key,
            frequency,
            label: None,
            attributes: HashMap::new(),
            observations,
        }
    }

    /// A keys-only series (no observations)
    pub fn keys_only(key: Key) -> Self {
        Self::new(key, Frequency::Undefined, Vec::new())
    }

    /// The canonical "no results matching the query" sentinel
    pub fn sentinel(key: Key) -> Self {
        let mut series = Self::keys_only(key);
        series.label = Some(SENTINEL_LABEL.to_string());
        series
    }

    /// True when this series is the empty-result sentinel
    pub fn is_sentinel(&self) -> bool {
        self.observations.is_empty() && self.label.as_deref() == Some(SENTINEL_LABEL)
    }

    /// Attach a label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach a pass-through attribute
    pub fn with_attribute(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(id.into(), value.into());
        self
    }

    /// Copy of this series with observations stripped (keys-only shape)
    pub fn stripped(&self) -> Self {
        let mut copy = self.clone();
        copy.observations.clear();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        let key = Key::parse("LOCSTL04.AUS.M").unwrap();
        assert_eq!(key.len(), 3);
        assert_eq!(key.get(1), Some("AUS"));
        assert_eq!(key.to_string(), "LOCSTL04.AUS.M");
    }

    #[test]
    fn parse_wildcard_segments() {
        let key = Key::parse("LOCSTL04..M").unwrap();
        assert_eq!(key.len(), 3);
        assert!(key.is_wildcard_at(1));
        assert!(!key.is_wildcard_at(0));
        assert_eq!(key.to_string(), "LOCSTL04..M");
    }

    #[test]
    fn parse_all_is_canonical_wildcard() {
        let key = Key::parse("all").unwrap();
        assert_eq!(key.len(), 1);
        assert!(key.is_all_wildcard());
        assert_eq!(key.to_string(), "all");

        // Case-insensitive
        assert!(Key::parse("ALL").unwrap().is_all_wildcard());
    }

    #[test]
    fn contains_requires_equal_size() {
        let a = Key::parse("A.B").unwrap();
        let b = Key::parse("A.B.C").unwrap();
        assert!(!a.contains(&b));
    }

    #[test]
    fn contains_wildcard_matches_anything() {
        let broad = Key::parse("LOCSTL04..").unwrap();
        let narrow = Key::parse("LOCSTL04.AUS.M").unwrap();
        assert!(broad.contains(&narrow));
        assert!(!narrow.contains(&broad));
    }

    #[test]
    fn contains_is_reflexive() {
        let key = Key::parse("A.B.C").unwrap();
        assert!(key.contains(&key));
    }

    #[test]
    fn contains_is_transitive() {
        let a = Key::parse("..").unwrap();
        let b = Key::parse("X.").unwrap();
        let c = Key::parse("X.Y").unwrap();
        assert!(a.contains(&b));
        assert!(b.contains(&c));
        assert!(a.contains(&c));
    }

    #[test]
    fn supersedes_is_strict() {
        let broad = Key::parse("LOCSTL04..").unwrap();
        let narrow = Key::parse("LOCSTL04.AUS.").unwrap();
        assert!(broad.supersedes(&narrow));
        assert!(!narrow.supersedes(&broad));
        assert!(!broad.supersedes(&broad));
    }

    #[test]
    fn bind_expands_canonical_all() {
        let all = Key::parse("all").unwrap();
        let bound = all.bind(3).unwrap();
        assert_eq!(bound.len(), 3);
        assert!(bound.is_all_wildcard());
    }

    #[test]
    fn bind_rejects_size_mismatch() {
        let key = Key::parse("A.B").unwrap();
        assert!(key.bind(3).is_err());
    }

    #[test]
    fn frequency_codes() {
        assert_eq!(Frequency::from_code("P1M"), Frequency::Monthly);
        assert_eq!(Frequency::from_code("M"), Frequency::Monthly);
        assert_eq!(Frequency::from_code("P1D"), Frequency::Daily);
        assert_eq!(Frequency::from_code("A"), Frequency::Annual);
        assert_eq!(Frequency::from_code("P6M"), Frequency::Undefined);
    }

    #[test]
    fn sentinel_series_is_recognizable() {
        let key = Key::parse("A.B.C").unwrap();
        let sentinel = Series::sentinel(key.clone());
        assert!(sentinel.is_sentinel());
        assert!(!Series::keys_only(key).is_sentinel());
    }
}
