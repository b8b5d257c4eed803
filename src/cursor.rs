//! Lazy data cursor over remote series
//!
//! A [`DataCursor`] is a single-pass sequence over the series matching a
//! request key. Its state machine is
//! `Created → (AdvancingSeries)* → Exhausted | Closed`; `advance_series`
//! is the only operation that may block on I/O, and `close` is terminal
//! and reachable from every state.
//!
//! Two retrieval paths exist. When the backend can serve series-keys-only
//! queries cheaply, the cursor streams straight from the backend. When it
//! cannot, the full Cartesian product of series under the request key is
//! reconstructed locally (wildcard slots expanded against each
//! dimension's code list) and either enumerated directly for keys-only
//! traffic or backfilled from a single full-data fetch; synthetic keys
//! with no data render as the canonical empty-result sentinel series
//! rather than an error.

use std::collections::HashMap;
use tracing::{debug, trace};

use crate::backend::{Backend, SeriesStream};
use crate::error::{Error, Result};
use crate::gather::gather;
use crate::schema::DimensionSchema;
use crate::types::{FlowRef, Key, Observation, Series};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Created,
    Active,
    Exhausted,
    Closed,
}

enum CursorSource {
    /// Backend-driven stream (keys-only capable backends)
    Stream(Box<dyn SeriesStream>),
    /// Locally enumerated synthetic keys, optionally backfilled with data
    Synthetic {
        keys: std::vec::IntoIter<Key>,
        data: Option<HashMap<Key, Series>>,
    },
}

/// Single-pass cursor over the series matching one request key
pub struct DataCursor {
    request: Key,
    source: Option<CursorSource>,
    current: Option<Series>,
    state: CursorState,
}

impl DataCursor {
    /// Build a cursor for a request key against a backend
    ///
    /// `key` must already be bound to the schema's width (see
    /// [`Key::bind`]). `max_keys` caps Cartesian expansion on backends
    /// without keys-only support.
    pub fn open(
        backend: &dyn Backend,
        flow: &FlowRef,
        key: &Key,
        schema: &DimensionSchema,
        keys_only: bool,
        max_keys: usize,
    ) -> Result<Self> {
        let source = if backend.keys_only_supported()? {
            CursorSource::Stream(backend.data(flow, key, keys_only)?)
        } else {
            let keys = expand_keys(schema, key, max_keys)?;
            debug!(
                request = %key,
                synthetic = keys.len(),
                "backend lacks keys-only support, enumerating locally"
            );
            let data = if keys_only {
                None
            } else {
                let mut stream = backend.data(flow, key, false)?;
                let mut by_key = HashMap::new();
                while let Some(series) = stream.next_series()? {
                    by_key.insert(series.key.clone(), series);
                }
                Some(by_key)
            };
            CursorSource::Synthetic {
                keys: keys.into_iter(),
                data,
            }
        };
        Ok(Self {
            request: key.clone(),
            source: Some(source),
            current: None,
            state: CursorState::Created,
        })
    }

    /// Pull the next matching series
    ///
    /// Candidates not contained in the request key are skipped
    /// transparently. Returns `false` once the source is exhausted. A
    /// mid-stream backend failure aborts the cursor; there is no partial
    /// recovery.
    pub fn advance_series(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Closed => {
                return Err(Error::IllegalState(
                    "cursor is closed".to_string(),
                ))
            }
            CursorState::Exhausted => return Ok(false),
            CursorState::Created | CursorState::Active => {}
        }
        let source = self
            .source
            .as_mut()
            .expect("open cursor retains its source");
        loop {
            let candidate = match source {
                CursorSource::Stream(stream) => match stream.next_series() {
                    Ok(candidate) => candidate,
                    Err(error) => {
                        self.state = CursorState::Exhausted;
                        self.current = None;
                        return Err(error);
                    }
                },
                CursorSource::Synthetic { keys, data } => keys.next().map(|key| match data {
                    None => Series::keys_only(key),
                    Some(by_key) => by_key
                        .remove(&key)
                        .unwrap_or_else(|| Series::sentinel(key)),
                }),
            };
            let Some(candidate) = candidate else {
                self.state = CursorState::Exhausted;
                self.current = None;
                return Ok(false);
            };
            if self.request.contains(&candidate.key) {
                self.current = Some(candidate);
                self.state = CursorState::Active;
                return Ok(true);
            }
            trace!(candidate = %candidate.key, request = %self.request, "skipping non-matching series");
        }
    }

    /// The current series as decoded, raw observations included
    pub fn current_series(&self) -> Result<&Series> {
        self.current.as_ref().ok_or_else(|| {
            Error::IllegalState(
                "no current series; call advance_series() and check its result first".to_string(),
            )
        })
    }

    /// Key of the current series
    pub fn current_key(&self) -> Result<&Key> {
        Ok(&self.current_series()?.key)
    }

    /// Display label of the current series, when the source declares one
    pub fn current_label(&self) -> Result<Option<&str>> {
        Ok(self.current_series()?.label.as_deref())
    }

    /// Pass-through attributes of the current series
    pub fn current_metadata(&self) -> Result<&HashMap<String, String>> {
        Ok(&self.current_series()?.attributes)
    }

    /// Observations of the current series, gathered onto a regular axis
    pub fn current_data(&self) -> Result<Vec<Observation>> {
        let series = self.current_series()?;
        gather(&series.key, series.frequency, &series.observations)
    }

    /// True once the current series is the canonical empty-result sentinel
    pub fn current_is_sentinel(&self) -> Result<bool> {
        Ok(self.current_series()?.is_sentinel())
    }

    /// Release the cursor and its underlying I/O resources
    ///
    /// Idempotent and reachable from every state.
    pub fn close(&mut self) {
        self.source = None;
        self.current = None;
        self.state = CursorState::Closed;
    }
}

impl Drop for DataCursor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Expand the wildcard slots of a key against the schema's code lists
///
/// Fixed slots are held constant; the total is pre-computed and checked
/// against `max_keys` before any key is generated, failing fast with
/// [`Error::KeyLimitExceeded`] on pathological products.
pub fn expand_keys(schema: &DimensionSchema, key: &Key, max_keys: usize) -> Result<Vec<Key>> {
    if key.len() != schema.len() {
        return Err(Error::IllegalState(format!(
            "key {} has {} slots, schema has {} dimensions",
            key,
            key.len(),
            schema.len()
        )));
    }

    let mut total: usize = 1;
    for (index, dimension) in schema.dimensions().iter().enumerate() {
        if key.is_wildcard_at(index) {
            total = total
                .checked_mul(dimension.codes.len())
                .ok_or(Error::KeyLimitExceeded {
                    generated: usize::MAX,
                    limit: max_keys,
                })?;
        }
    }
    if total > max_keys {
        return Err(Error::KeyLimitExceeded {
            generated: total,
            limit: max_keys,
        });
    }
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(total);
    let mut slots: Vec<String> = Vec::with_capacity(schema.len());
    expand_into(schema, key, 0, &mut slots, &mut out)?;
    Ok(out)
}

fn expand_into(
    schema: &DimensionSchema,
    key: &Key,
    index: usize,
    slots: &mut Vec<String>,
    out: &mut Vec<Key>,
) -> Result<()> {
    if index == schema.len() {
        out.push(Key::from_slots(slots.clone())?);
        return Ok(());
    }
    if key.is_wildcard_at(index) {
        let dimension = schema
            .dimension_at(index)
            .expect("index bounded by schema length");
        for code in dimension.codes.keys() {
            slots.push(code.clone());
            expand_into(schema, key, index + 1, slots, out)?;
            slots.pop();
        }
    } else {
        slots.push(key.get(index).unwrap_or_default().to_string());
        expand_into(schema, key, index + 1, slots, out)?;
        slots.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::schema::Dimension;
    use crate::types::{Dataflow, Frequency, RawObservation, StructureRef};

    fn schema() -> DimensionSchema {
        DimensionSchema::new(vec![
            Dimension::new("SUBJECT", 1).with_code("LOCSTL04", "Leading indicator"),
            Dimension::new("LOCATION", 2)
                .with_code("AUS", "Australia")
                .with_code("BEL", "Belgium"),
            Dimension::new("FREQ", 3).with_code("M", "Monthly"),
        ])
        .unwrap()
    }

    fn backend(keys_only: bool) -> MemoryBackend {
        let flow = Dataflow::new(
            FlowRef::of("MEI"),
            "Main indicators",
            StructureRef::of("MEI_DSD"),
        );
        let series = vec![
            Series::new(
                Key::parse("LOCSTL04.AUS.M").unwrap(),
                Frequency::Monthly,
                vec![RawObservation::new(Some("2020-01".into()), Some(1.0))],
            ),
            Series::new(
                Key::parse("LOCSTL04.BEL.M").unwrap(),
                Frequency::Monthly,
                vec![RawObservation::new(Some("2020-01".into()), Some(2.0))],
            ),
        ];
        MemoryBackend::new("mem://test/en")
            .with_flow(flow, schema(), series)
            .with_keys_only_support(keys_only)
    }

    #[test]
    fn expand_holds_fixed_slots_constant() {
        let key = Key::parse("LOCSTL04..M").unwrap();
        let keys = expand_keys(&schema(), &key, 1000).unwrap();
        assert_eq!(
            keys.iter().map(Key::to_string).collect::<Vec<_>>(),
            vec!["LOCSTL04.AUS.M", "LOCSTL04.BEL.M"]
        );
    }

    #[test]
    fn expand_fails_fast_over_cap() {
        let key = Key::parse("..").unwrap();
        let wide = DimensionSchema::new(vec![
            Dimension::new("A", 1).with_code("1", "1").with_code("2", "2"),
            Dimension::new("B", 2).with_code("1", "1").with_code("2", "2"),
        ])
        .unwrap();
        let result = expand_keys(&wide, &key, 3);
        assert!(matches!(
            result,
            Err(Error::KeyLimitExceeded {
                generated: 4,
                limit: 3
            })
        ));
    }

    #[test]
    fn expand_with_empty_code_list_yields_nothing() {
        let sparse = DimensionSchema::new(vec![
            Dimension::new("A", 1).with_code("X", "X"),
            Dimension::new("B", 2),
        ])
        .unwrap();
        let keys = expand_keys(&sparse, &Key::parse(".").unwrap(), 10).unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn read_before_advance_is_illegal() {
        let backend = backend(true);
        let key = Key::parse("LOCSTL04..M").unwrap();
        let cursor =
            DataCursor::open(&backend, &FlowRef::of("MEI"), &key, &schema(), true, 1000).unwrap();
        assert!(matches!(cursor.current_key(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn read_after_exhaustion_is_illegal() {
        let backend = backend(true);
        let key = Key::parse("LOCSTL04.AUS.M").unwrap();
        let mut cursor =
            DataCursor::open(&backend, &FlowRef::of("MEI"), &key, &schema(), true, 1000).unwrap();
        assert!(cursor.advance_series().unwrap());
        assert!(!cursor.advance_series().unwrap());
        assert!(matches!(cursor.current_key(), Err(Error::IllegalState(_))));
        // Repeated advance after exhaustion stays false
        assert!(!cursor.advance_series().unwrap());
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let backend = backend(true);
        let key = Key::parse("LOCSTL04..M").unwrap();
        let mut cursor =
            DataCursor::open(&backend, &FlowRef::of("MEI"), &key, &schema(), true, 1000).unwrap();
        cursor.close();
        cursor.close();
        assert!(matches!(
            cursor.advance_series(),
            Err(Error::IllegalState(_))
        ));
    }

    #[test]
    fn emulated_keys_only_enumerates_synthetic_keys() {
        let backend = backend(false);
        let key = Key::parse("LOCSTL04..M").unwrap();
        let mut cursor =
            DataCursor::open(&backend, &FlowRef::of("MEI"), &key, &schema(), true, 1000).unwrap();
        let mut seen = Vec::new();
        while cursor.advance_series().unwrap() {
            seen.push(cursor.current_key().unwrap().to_string());
        }
        assert_eq!(seen, vec!["LOCSTL04.AUS.M", "LOCSTL04.BEL.M"]);
    }

    #[test]
    fn emulated_full_data_backfills_and_marks_missing() {
        let flow = Dataflow::new(
            FlowRef::of("MEI"),
            "Main indicators",
            StructureRef::of("MEI_DSD"),
        );
        // Only AUS has data; BEL must surface as the sentinel
        let series = vec![Series::new(
            Key::parse("LOCSTL04.AUS.M").unwrap(),
            Frequency::Monthly,
            vec![RawObservation::new(Some("2020-01".into()), Some(1.0))],
        )];
        let backend = MemoryBackend::new("mem://test/en")
            .with_flow(flow, schema(), series)
            .with_keys_only_support(false);

        let key = Key::parse("LOCSTL04..M").unwrap();
        let mut cursor =
            DataCursor::open(&backend, &FlowRef::of("MEI"), &key, &schema(), false, 1000).unwrap();

        assert!(cursor.advance_series().unwrap());
        assert_eq!(cursor.current_key().unwrap().to_string(), "LOCSTL04.AUS.M");
        assert!(!cursor.current_is_sentinel().unwrap());
        assert_eq!(
            cursor.current_data().unwrap(),
            vec![Observation::new("2020-01", Some(1.0))]
        );

        assert!(cursor.advance_series().unwrap());
        assert_eq!(cursor.current_key().unwrap().to_string(), "LOCSTL04.BEL.M");
        assert!(cursor.current_is_sentinel().unwrap());
        assert!(cursor.current_data().unwrap().is_empty());

        assert!(!cursor.advance_series().unwrap());
    }

    #[test]
    fn cap_aborts_before_generation() {
        let backend = backend(false);
        let key = Key::parse("LOCSTL04..").unwrap();
        let result = DataCursor::open(&backend, &FlowRef::of("MEI"), &key, &schema(), true, 1);
        assert!(matches!(result, Err(Error::KeyLimitExceeded { .. })));
    }
}
