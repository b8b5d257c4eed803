//! Explicit structure document decoding
//!
//! Covers both structure vintages: SDMX-ML 2.0 (`KeyFamily` components
//! referencing `CodeList` elements) and 2.1 (`DataStructure` with a
//! `DimensionList` whose dimensions carry explicit positions and
//! enumerate codelists through `Ref` elements). Time dimensions, primary
//! measures and declared attributes are not dimensions and are skipped by
//! name.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};

use super::{attribute_value, local_name};
use crate::error::{Error, Result};
use crate::schema::{Dimension, DimensionSchema};

#[derive(Default)]
struct PendingDimension {
    id: String,
    position: Option<usize>,
    codelist: Option<String>,
}

/// Decode a structure document into a [`DimensionSchema`]
///
/// Dimensions without an explicit position (the 2.0 encoding) take their
/// order of appearance; explicit 2.1 positions win when present.
pub fn decode_structure(document: &str) -> Result<DimensionSchema> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut codelists: HashMap<String, BTreeMap<String, String>> = HashMap::new();
    let mut current_codelist: Option<String> = None;
    let mut current_code: Option<String> = None;
    let mut capture_label = false;

    let mut dimensions: Vec<PendingDimension> = Vec::new();
    let mut in_dimension = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                let name = local_name(&element);
                match name.as_slice() {
                    b"CodeList" | b"Codelist" => {
                        if let Some(id) = attribute_value(&element, "id")? {
                            codelists.entry(id.clone()).or_default();
                            current_codelist = Some(id);
                        }
                    }
                    b"Code" => {
                        // 2.0 identifies codes by "value", 2.1 by "id"
                        let code = attribute_value(&element, "value")?
                            .or(attribute_value(&element, "id")?);
                        if let (Some(list), Some(code)) = (&current_codelist, code) {
                            codelists
                                .get_mut(list)
                                .expect("codelist registered at element start")
                                .insert(code.clone(), code.clone());
                            current_code = Some(code);
                        }
                    }
                    b"Description" | b"Name" => {
                        capture_label = current_code.is_some();
                    }
                    b"Dimension" => {
                        let id = attribute_value(&element, "conceptRef")?
                            .or(attribute_value(&element, "id")?);
                        if let Some(id) = id {
                            let position = attribute_value(&element, "position")?
                                .and_then(|p| p.parse().ok());
                            let codelist = attribute_value(&element, "codelist")?;
                            // A self-closed dimension (the 2.0 encoding)
                            // carries its codelist inline and nests no Ref
                            in_dimension = codelist.is_none();
                            dimensions.push(PendingDimension {
                                id,
                                position,
                                codelist,
                            });
                        }
                    }
                    b"Ref" if in_dimension => {
                        // 2.1 enumerates the codelist via a nested Ref
                        let class = attribute_value(&element, "class")?;
                        if class.as_deref().map_or(true, |c| c == "Codelist") {
                            if let Some(id) = attribute_value(&element, "id")? {
                                if let Some(last) = dimensions.last_mut() {
                                    if last.codelist.is_none() {
                                        last.codelist = Some(id);
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(text) => {
                if capture_label {
                    let label = text.unescape()?.into_owned();
                    if let (Some(list), Some(code)) = (&current_codelist, &current_code) {
                        if let Some(entry) = codelists
                            .get_mut(list)
                            .and_then(|codes| codes.get_mut(code))
                        {
                            if *entry == *code {
                                *entry = label;
                            }
                        }
                    }
                    capture_label = false;
                }
            }
            Event::End(element) => match element.local_name().as_ref() {
                b"Code" => current_code = None,
                b"CodeList" | b"Codelist" => current_codelist = None,
                b"Dimension" => in_dimension = false,
                b"Description" | b"Name" => capture_label = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if dimensions.is_empty() {
        return Err(Error::Configuration(
            "structure document declares no dimensions".to_string(),
        ));
    }

    let explicit_positions = dimensions.iter().all(|d| d.position.is_some());
    let mut built = Vec::with_capacity(dimensions.len());
    for (index, pending) in dimensions.into_iter().enumerate() {
        let position = if explicit_positions {
            pending.position.expect("checked above")
        } else {
            index + 1
        };
        let codes = pending
            .codelist
            .as_ref()
            .and_then(|id| codelists.get(id))
            .cloned()
            .unwrap_or_default();
        built.push(Dimension {
            id: pending.id,
            position,
            codes,
        });
    }
    DimensionSchema::new(built)
}
