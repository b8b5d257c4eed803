//! Schema inference from a data document
//!
//! When no structure document is supplied, a best-effort
//! [`DimensionSchema`] is reconstructed by streaming the data document
//! once: every distinct `(concept, value)` pair seen on a series key is
//! accumulated per concept into a candidate dimension, and declaration
//! order of first appearance becomes dimension position.
//!
//! Compact dialects flatten dimensions and attributes into one attribute
//! list on the `Series` element, so a heuristic separates them: a concept
//! is excluded when its identifier contains `TITLE` or when any observed
//! value contains whitespace. Both are proxies for "free-text attribute,
//! not a coded dimension". The heuristic cannot distinguish a coded short
//! value that happens to contain a space from a genuine attribute; that
//! ambiguity is inherent to the Compact encoding.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::{attributes_of, local_name, Dialect};
use crate::error::{Error, Result};
use crate::schema::{Dimension, DimensionSchema};

/// Recognized time-format attribute, never a dimension
const TIME_FORMAT: &str = "TIME_FORMAT";

/// Candidate dimensions in first-appearance order
#[derive(Default)]
struct Candidates {
    order: Vec<String>,
    values: HashMap<String, BTreeMap<String, String>>,
}

impl Candidates {
    fn record(&mut self, concept: &str, value: &str) {
        if !self.values.contains_key(concept) {
            self.order.push(concept.to_string());
            self.values.insert(concept.to_string(), BTreeMap::new());
        }
        self.values
            .get_mut(concept)
            .expect("concept registered above")
            .insert(value.to_string(), value.to_string());
    }
}

/// Infer a dimension schema by scanning series keys/attributes
pub fn infer_schema(document: &str, dialect: Dialect) -> Result<DimensionSchema> {
    let candidates = match dialect {
        Dialect::Generic20 | Dialect::Generic21 => scan_generic(document)?,
        Dialect::Compact20 | Dialect::Compact21 => scan_compact(document)?,
        Dialect::Unknown => {
            return Err(Error::Configuration(
                "cannot infer a schema from an unknown dialect".to_string(),
            ))
        }
    };

    let mut dimensions = Vec::new();
    for (index, concept) in candidates.order.iter().enumerate() {
        let codes = candidates.values[concept].clone();
        dimensions.push(Dimension {
            id: concept.clone(),
            position: index + 1,
            codes,
        });
    }
    if dimensions.is_empty() {
        return Err(Error::Configuration(
            "no series keys found; cannot infer a schema".to_string(),
        ));
    }
    DimensionSchema::new(dimensions)
}

/// Generic dialects separate keys from attributes, so every `Value`
/// inside a `SeriesKey` is a dimension by construction
fn scan_generic(document: &str) -> Result<Candidates> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut candidates = Candidates::default();
    let mut in_series_key = false;
    loop {
        match reader.read_event()? {
            Event::Start(element) => match local_name(&element).as_slice() {
                b"SeriesKey" => in_series_key = true,
                b"Value" if in_series_key => record_value(&mut candidates, &element)?,
                _ => {}
            },
            Event::Empty(element) => {
                if in_series_key && local_name(&element) == b"Value" {
                    record_value(&mut candidates, &element)?;
                }
            }
            Event::End(element) => {
                if element.local_name().as_ref() == b"SeriesKey" {
                    in_series_key = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(candidates)
}

fn record_value(candidates: &mut Candidates, element: &quick_xml::events::BytesStart) -> Result<()> {
    let attributes = attributes_of(element)?;
    // 2.0 names the concept attribute "concept", 2.1 names it "id"
    let concept = attributes
        .iter()
        .find(|(name, _)| name == "concept" || name == "id")
        .map(|(_, value)| value.clone());
    let value = attributes
        .iter()
        .find(|(name, _)| name == "value")
        .map(|(_, value)| value.clone());
    if let (Some(concept), Some(value)) = (concept, value) {
        candidates.record(&concept, &value);
    }
    Ok(())
}

/// Compact dialects: dimension values are plain attributes on `Series`,
/// mixed with free-text attributes; the exclusion heuristic applies
fn scan_compact(document: &str) -> Result<Candidates> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut scanned = Candidates::default();
    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                if local_name(&element) != b"Series" {
                    continue;
                }
                for (name, value) in attributes_of(&element)? {
                    if name == TIME_FORMAT {
                        continue;
                    }
                    scanned.record(&name, &value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut kept = Candidates::default();
    for concept in &scanned.order {
        let values = &scanned.values[concept];
        if concept.contains("TITLE") {
            debug!(concept, "excluded from inferred dimensions: id contains TITLE");
            continue;
        }
        if values
            .keys()
            .any(|value| value.chars().any(char::is_whitespace))
        {
            debug!(concept, "excluded from inferred dimensions: value contains whitespace");
            continue;
        }
        for value in values.keys() {
            kept.record(concept, value);
        }
    }
    Ok(kept)
}
