//! Series decoding from SDMX-ML data documents
//!
//! Reads series keys, pass-through attributes and observations for all
//! four dialects, resolving each series key against a bound
//! [`DimensionSchema`]: concepts missing from a key render as wildcard
//! slots rather than failing, since ragged sources exist in the wild.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use super::{attributes_of, local_name, Dialect};
use crate::error::{Error, Result};
use crate::schema::DimensionSchema;
use crate::types::{Frequency, Key, RawObservation, Series};

/// Recognized attribute identifiers
const TIME_FORMAT: &str = "TIME_FORMAT";
const TITLE: &str = "TITLE";

#[derive(Default)]
struct SeriesBuilder {
    values: HashMap<String, String>,
    attributes: HashMap<String, String>,
    observations: Vec<RawObservation>,
}

impl SeriesBuilder {
    fn finish(self, schema: &DimensionSchema) -> Result<Series> {
        let slots = schema
            .dimensions()
            .iter()
            .map(|dim| self.values.get(&dim.id).cloned().unwrap_or_default())
            .collect();
        let key = Key::from_slots(slots)?;

        let frequency = self
            .attributes
            .get(TIME_FORMAT)
            .map(|code| Frequency::from_code(code))
            .filter(|freq| *freq != Frequency::Undefined)
            .or_else(|| {
                self.values
                    .get("FREQ")
                    .or_else(|| self.values.get("FREQUENCY"))
                    .map(|code| Frequency::from_code(code))
            })
            .unwrap_or(Frequency::Undefined);

        let label = self.attributes.get(TITLE).cloned().or_else(|| {
            let mut titled: Vec<&String> = self
                .attributes
                .iter()
                .filter(|(name, _)| name.contains(TITLE))
                .map(|(_, value)| value)
                .collect();
            titled.sort();
            titled.first().map(|value| (*value).clone())
        });

        let mut series = Series::new(key, frequency, self.observations);
        series.label = label;
        series.attributes = self.attributes;
        Ok(series)
    }
}

fn parse_value(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_nan() => None,
        Ok(value) => Some(value),
        Err(_) => None,
    }
}

/// Decode every series of a data document
pub fn decode_series(
    document: &str,
    dialect: Dialect,
    schema: &DimensionSchema,
) -> Result<Vec<Series>> {
    match dialect {
        Dialect::Generic20 | Dialect::Generic21 => decode_generic(document, schema),
        Dialect::Compact20 | Dialect::Compact21 => decode_compact(document, schema),
        Dialect::Unknown => Err(Error::Configuration(
            "cannot decode series from an unknown dialect".to_string(),
        )),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum GenericSection {
    None,
    SeriesKey,
    Attributes,
}

fn decode_generic(document: &str, schema: &DimensionSchema) -> Result<Vec<Series>> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut out = Vec::new();
    let mut builder: Option<SeriesBuilder> = None;
    let mut section = GenericSection::None;
    let mut observation: Option<RawObservation> = None;
    let mut capture_time = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                let name = local_name(&element);
                match name.as_slice() {
                    b"Series" => builder = Some(SeriesBuilder::default()),
                    b"SeriesKey" => section = GenericSection::SeriesKey,
                    b"Attributes" => section = GenericSection::Attributes,
                    b"Value" => {
                        let attributes = attributes_of(&element)?;
                        let concept = attributes
                            .iter()
                            .find(|(n, _)| n == "concept" || n == "id")
                            .map(|(_, v)| v.clone());
                        let value = attributes
                            .iter()
                            .find(|(n, _)| n == "value")
                            .map(|(_, v)| v.clone());
                        if let (Some(builder), Some(concept), Some(value)) =
                            (builder.as_mut(), concept, value)
                        {
                            match section {
                                GenericSection::SeriesKey => {
                                    builder.values.insert(concept, value);
                                }
                                GenericSection::Attributes => {
                                    builder.attributes.insert(concept, value);
                                }
                                GenericSection::None => {}
                            }
                        }
                    }
                    b"Obs" => observation = Some(RawObservation::new(None, None)),
                    b"Time" => capture_time = true,
                    b"ObsDimension" => {
                        if let Some(observation) = observation.as_mut() {
                            observation.period = attributes_of(&element)?
                                .into_iter()
                                .find(|(n, _)| n == "value")
                                .map(|(_, v)| v);
                        }
                    }
                    b"ObsValue" => {
                        if let Some(observation) = observation.as_mut() {
                            observation.value = attributes_of(&element)?
                                .into_iter()
                                .find(|(n, _)| n == "value")
                                .map(|(_, v)| v)
                                .as_deref()
                                .and_then(parse_value);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(text) => {
                if capture_time {
                    if let Some(observation) = observation.as_mut() {
                        observation.period = Some(text.unescape()?.into_owned());
                    }
                    capture_time = false;
                }
            }
            Event::End(element) => match element.local_name().as_ref() {
                b"SeriesKey" | b"Attributes" => section = GenericSection::None,
                b"Time" => capture_time = false,
                b"Obs" => {
                    if let (Some(builder), Some(observation)) =
                        (builder.as_mut(), observation.take())
                    {
                        builder.observations.push(observation);
                    }
                }
                b"Series" => {
                    if let Some(builder) = builder.take() {
                        out.push(builder.finish(schema)?);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn decode_compact(document: &str, schema: &DimensionSchema) -> Result<Vec<Series>> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut out = Vec::new();
    let mut builder: Option<SeriesBuilder> = None;

    loop {
        match reader.read_event()? {
            Event::Start(element) => match local_name(&element).as_slice() {
                b"Series" => builder = Some(compact_builder(&element, schema)?),
                b"Obs" => push_compact_obs(&element, builder.as_mut())?,
                _ => {}
            },
            Event::Empty(element) => match local_name(&element).as_slice() {
                b"Series" => {
                    // Self-closed series: no observations follow
                    out.push(compact_builder(&element, schema)?.finish(schema)?);
                }
                b"Obs" => push_compact_obs(&element, builder.as_mut())?,
                _ => {}
            },
            Event::End(element) => {
                if element.local_name().as_ref() == b"Series" {
                    if let Some(builder) = builder.take() {
                        out.push(builder.finish(schema)?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn compact_builder(
    element: &quick_xml::events::BytesStart,
    schema: &DimensionSchema,
) -> Result<SeriesBuilder> {
    let mut builder = SeriesBuilder::default();
    for (name, value) in attributes_of(element)? {
        if schema.dimension(&name).is_some() {
            builder.values.insert(name, value);
        } else {
            builder.attributes.insert(name, value);
        }
    }
    Ok(builder)
}

fn push_compact_obs(
    element: &quick_xml::events::BytesStart,
    builder: Option<&mut SeriesBuilder>,
) -> Result<()> {
    let Some(builder) = builder else {
        return Ok(());
    };
    let mut period = None;
    let mut value = None;
    for (name, text) in attributes_of(element)? {
        match name.as_str() {
            "TIME_PERIOD" => period = Some(text),
            "OBS_VALUE" => value = parse_value(&text),
            _ => {}
        }
    }
    builder.observations.push(RawObservation::new(period, value));
    Ok(())
}
