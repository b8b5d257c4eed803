//! Multi-dialect SDMX-ML structural decoder
//!
//! The SDMX-ML family splits along two axes: the message version (2.0 or
//! 2.1, discriminated by the outer message namespace) and the data
//! encoding (Generic, which nests dimension values under explicit
//! key/attribute elements, versus Compact, which flattens them onto XML
//! attributes of a `Series` element). This module covers:
//!
//! - [`probe`]: sniff the dialect from a streaming token source
//! - [`decode_structure`]: parse an explicit structure document
//! - [`infer_schema`]: reconstruct a best-effort [`DimensionSchema`] by
//!   scanning series keys/attributes when no structure document exists
//! - [`decode_series`]: read series keys, attributes and observations
//!
//! The decoder treats these formats as read-only inputs; it never
//! serializes SDMX-ML.

mod data;
mod infer;
mod probe;
mod structure;

pub use data::decode_series;
pub use infer::infer_schema;
pub use probe::{probe, Dialect};
pub use structure::decode_structure;

use quick_xml::events::BytesStart;

use crate::error::Result;

/// Local element name, prefix stripped
pub(crate) fn local_name(start: &BytesStart) -> Vec<u8> {
    start.local_name().as_ref().to_vec()
}

/// Non-namespace attributes of an element as `(local name, value)` pairs
///
/// Skips `xmlns` declarations and `xsi:` schema plumbing, which never
/// carry dimension or observation content.
pub(crate) fn attributes_of(start: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::InvalidAttr)?;
        let raw_name = attribute.key.as_ref();
        if raw_name == b"xmlns"
            || raw_name.starts_with(b"xmlns:")
            || raw_name.starts_with(b"xsi:")
        {
            continue;
        }
        let name = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        out.push((name, value));
    }
    Ok(out)
}

/// Value of one attribute by local name
pub(crate) fn attribute_value(start: &BytesStart, name: &str) -> Result<Option<String>> {
    Ok(attributes_of(start)?
        .into_iter()
        .find(|(attr, _)| attr == name)
        .map(|(_, value)| value))
}
