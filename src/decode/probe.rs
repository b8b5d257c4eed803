//! Format probe: dialect sniffing over a streaming XML source
//!
//! Two signals decide the dialect. The outer message namespace separates
//! SDMX 1.0 (unsupported), 2.0 and 2.1. Within a supported namespace, the
//! presence of a `KeyFamilyRef` (Generic 2.0) or `SeriesKey` (Generic
//! 2.1) element marks the Generic encoding; a `Series` element carrying
//! plain attributes marks Compact, where dimension values live directly
//! on the element.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use super::attributes_of;
use crate::error::Result;

/// One of the four supported SDMX-ML data dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// SDMX-ML 2.0, Generic encoding
    Generic20,
    /// SDMX-ML 2.0, Compact encoding
    Compact20,
    /// SDMX-ML 2.1, Generic encoding
    Generic21,
    /// SDMX-ML 2.1, Compact (structure-specific) encoding
    Compact21,
    /// Unrecognized or unsupported (SDMX 1.0 lands here)
    Unknown,
}

#[derive(Clone, Copy, PartialEq)]
enum Version {
    V20,
    V21,
}

/// Sniff the SDMX-ML dialect of a document
///
/// Deterministic over the first namespace declaration and the first
/// discriminating element; the rest of the document is never read.
pub fn probe(document: &str) -> Result<Dialect> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut version: Option<Version> = None;
    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                if version.is_none() {
                    match sniff_version(&element)? {
                        Some(found) => {
                            version = Some(found);
                            continue;
                        }
                        None => {
                            debug!("no supported message namespace on the root element");
                            return Ok(Dialect::Unknown);
                        }
                    }
                }
                match super::local_name(&element).as_slice() {
                    b"KeyFamilyRef" | b"SeriesKey" => {
                        return Ok(match version {
                            Some(Version::V20) => Dialect::Generic20,
                            Some(Version::V21) => Dialect::Generic21,
                            None => Dialect::Unknown,
                        });
                    }
                    b"Series" => {
                        // Generic 2.1 nests a SeriesKey inside a bare
                        // Series element; Compact puts dimension values
                        // straight onto it
                        if !attributes_of(&element)?.is_empty() {
                            return Ok(match version {
                                Some(Version::V20) => Dialect::Compact20,
                                Some(Version::V21) => Dialect::Compact21,
                                None => Dialect::Unknown,
                            });
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => return Ok(Dialect::Unknown),
            _ => {}
        }
    }
}

fn sniff_version(element: &quick_xml::events::BytesStart) -> Result<Option<Version>> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::InvalidAttr)?;
        let name = attribute.key.as_ref();
        if name != b"xmlns" && !name.starts_with(b"xmlns:") {
            continue;
        }
        let value = attribute.unescape_value()?;
        let lowered = value.to_ascii_lowercase();
        if lowered.contains("v1_0") {
            return Ok(None);
        }
        if lowered.contains("v2_0") {
            return Ok(Some(Version::V20));
        }
        if lowered.contains("v2_1") {
            return Ok(Some(Version::V21));
        }
    }
    Ok(None)
}
