//! Observation gathering onto a regular time axis
//!
//! Raw series arrive as `(period, value)` pairs at whatever frequency the
//! source emits. Gathering maps each source frequency to a fixed
//! `(target frequency, aggregation policy)` pair and produces a strictly
//! increasing, contiguous axis at the target frequency:
//!
//! | source                          | target    | policy          |
//! |---------------------------------|-----------|-----------------|
//! | annual                          | annual    | none            |
//! | monthly                         | monthly   | none            |
//! | weekly/daily/hourly/minutely    | monthly   | last-value-wins |
//! | undefined                       | undefined | none            |
//!
//! Policy "none" requires at most one raw observation per target period;
//! a second one is a data error surfaced as
//! [`Error::MalformedSeries`]. Policy "last" keeps the
//! chronologically last raw value per target period and silently discards
//! earlier ones. Gaps between the first and last populated target period
//! are filled with explicit missing observations, never omitted. A raw
//! observation with a null period is dropped but does not terminate
//! gathering.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{Frequency, Key, Observation, RawObservation};

/// How raw observations that collapse onto one target period combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// At most one raw observation per target period; a second is an error
    None,
    /// The chronologically last raw value wins, earlier ones are discarded
    LastValueWins,
}

/// Target frequency and aggregation policy for one source frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatherSpec {
    /// Frequency of the output axis
    pub target: Frequency,
    /// Collapse policy
    pub policy: AggregationPolicy,
}

impl GatherSpec {
    /// Look up the fixed frequency table
    pub fn for_frequency(frequency: Frequency) -> Self {
        match frequency {
            Frequency::Annual => Self {
                target: Frequency::Annual,
                policy: AggregationPolicy::None,
            },
            Frequency::Monthly => Self {
                target: Frequency::Monthly,
                policy: AggregationPolicy::None,
            },
            Frequency::Weekly | Frequency::Daily | Frequency::Hourly | Frequency::Minutely => {
                Self {
                    target: Frequency::Monthly,
                    policy: AggregationPolicy::LastValueWins,
                }
            }
            Frequency::Undefined => Self {
                target: Frequency::Undefined,
                policy: AggregationPolicy::None,
            },
        }
    }
}

/// One period on a regular target axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum AxisPeriod {
    Year(i32),
    Month(i32, u32),
}

impl AxisPeriod {
    fn next(self) -> Self {
        match self {
            AxisPeriod::Year(y) => AxisPeriod::Year(y + 1),
            AxisPeriod::Month(y, 12) => AxisPeriod::Month(y + 1, 1),
            AxisPeriod::Month(y, m) => AxisPeriod::Month(y, m + 1),
        }
    }
}

impl fmt::Display for AxisPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisPeriod::Year(y) => write!(f, "{:04}", y),
            AxisPeriod::Month(y, m) => write!(f, "{:04}-{:02}", y, m),
        }
    }
}

/// A source period broken down for axis placement and ordering
struct ParsedPeriod {
    year: i32,
    month: Option<u32>,
    /// Seconds since epoch, used to order raw observations within one
    /// target period for the last-value-wins policy
    stamp: i64,
}

fn stamp_of(date: NaiveDate, hour: u32, minute: u32, second: u32) -> Option<i64> {
    Some(date.and_hms_opt(hour, minute, second)?.and_utc().timestamp())
}

/// Parse an SDMX time period
///
/// Understands `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DDTHH[:MM[:SS]]`
/// and ISO weeks `YYYY-Wnn`. Anything else is unplaceable and dropped by
/// the caller.
fn parse_period(text: &str) -> Option<ParsedPeriod> {
    let text = text.trim();

    if let Some((year_part, week_part)) = text.split_once("-W") {
        let year: i32 = year_part.parse().ok()?;
        let week: u32 = week_part.parse().ok()?;
        let date = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
        return Some(ParsedPeriod {
            year: date.year(),
            month: Some(date.month()),
            stamp: stamp_of(date, 0, 0, 0)?,
        });
    }

    let (date_part, time_part) = match text.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };

    let fields: Vec<&str> = date_part.split('-').collect();
    let (year, month, day) = match fields.as_slice() {
        [y] => ((*y).parse::<i32>().ok()?, None, 1),
        [y, m] => ((*y).parse::<i32>().ok()?, Some((*m).parse::<u32>().ok()?), 1),
        [y, m, d] => (
            (*y).parse::<i32>().ok()?,
            Some((*m).parse::<u32>().ok()?),
            (*d).parse::<u32>().ok()?,
        ),
        _ => return None,
    };

    let (hour, minute, second) = match time_part {
        None => (0, 0, 0),
        Some(time) => {
            let mut parts = time.trim_end_matches('Z').split(':');
            let hour = parts.next()?.parse::<u32>().ok()?;
            let minute = match parts.next() {
                Some(m) => m.parse::<u32>().ok()?,
                None => 0,
            };
            let second = match parts.next() {
                Some(s) => s.parse::<u32>().ok()?,
                None => 0,
            };
            (hour, minute, second)
        }
    };

    let date = NaiveDate::from_ymd_opt(year, month.unwrap_or(1), day)?;
    Some(ParsedPeriod {
        year,
        month,
        stamp: stamp_of(date, hour, minute, second)?,
    })
}

/// Gather raw observations onto the regular axis for their frequency
///
/// The output is strictly increasing and contiguous at the target
/// frequency; missing target periods render as explicit `None`
/// observations. `key` is only used for error context.
pub fn gather(key: &Key, frequency: Frequency, raw: &[RawObservation]) -> Result<Vec<Observation>> {
    let spec = GatherSpec::for_frequency(frequency);

    if spec.target == Frequency::Undefined {
        return gather_passthrough(key, raw);
    }

    let mut slots: BTreeMap<AxisPeriod, (i64, Option<f64>)> = BTreeMap::new();
    for observation in raw {
        let Some(period_text) = observation.period.as_deref() else {
            debug!(key = %key, "dropping observation with null period");
            continue;
        };
        let Some(parsed) = parse_period(period_text) else {
            warn!(key = %key, period = period_text, "dropping unparseable period");
            continue;
        };
        let axis = match spec.target {
            Frequency::Annual => AxisPeriod::Year(parsed.year),
            Frequency::Monthly => AxisPeriod::Month(parsed.year, parsed.month.unwrap_or(1)),
            _ => unreachable!("frequency table only targets annual, monthly or undefined"),
        };
        match slots.entry(axis) {
            Entry::Vacant(slot) => {
                slot.insert((parsed.stamp, observation.value));
            }
            Entry::Occupied(mut slot) => match spec.policy {
                AggregationPolicy::None => {
                    return Err(Error::MalformedSeries {
                        key: key.to_string(),
                        period: axis.to_string(),
                    });
                }
                AggregationPolicy::LastValueWins => {
                    if parsed.stamp >= slot.get().0 {
                        slot.insert((parsed.stamp, observation.value));
                    }
                }
            },
        }
    }

    let Some((&first, _)) = slots.iter().next() else {
        return Ok(Vec::new());
    };
    let (&last, _) = slots.iter().next_back().expect("non-empty map has a last entry");

    let mut gathered = Vec::new();
    let mut period = first;
    loop {
        let value = slots.get(&period).and_then(|&(_, value)| value);
        gathered.push(Observation::new(period.to_string(), value));
        if period == last {
            break;
        }
        period = period.next();
    }
    Ok(gathered)
}

/// Undefined target: no regular axis exists, periods pass through verbatim
fn gather_passthrough(key: &Key, raw: &[RawObservation]) -> Result<Vec<Observation>> {
    let mut seen = HashSet::new();
    let mut gathered = Vec::new();
    for observation in raw {
        let Some(period) = observation.period.as_deref() else {
            debug!(key = %key, "dropping observation with null period");
            continue;
        };
        if !seen.insert(period.to_string()) {
            return Err(Error::MalformedSeries {
                key: key.to_string(),
                period: period.to_string(),
            });
        }
        gathered.push(Observation::new(period, observation.value));
    }
    Ok(gathered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Key {
        Key::parse("LOCSTL04.AUS.M").unwrap()
    }

    fn raw(period: &str, value: f64) -> RawObservation {
        RawObservation::new(Some(period.to_string()), Some(value))
    }

    #[test]
    fn frequency_table() {
        let spec = GatherSpec::for_frequency(Frequency::Daily);
        assert_eq!(spec.target, Frequency::Monthly);
        assert_eq!(spec.policy, AggregationPolicy::LastValueWins);

        let spec = GatherSpec::for_frequency(Frequency::Monthly);
        assert_eq!(spec.target, Frequency::Monthly);
        assert_eq!(spec.policy, AggregationPolicy::None);

        let spec = GatherSpec::for_frequency(Frequency::Annual);
        assert_eq!(spec.target, Frequency::Annual);
        assert_eq!(spec.policy, AggregationPolicy::None);
    }

    #[test]
    fn monthly_gap_is_filled_with_missing() {
        let observations = vec![raw("2020-01", 1.0), raw("2020-03", 3.0)];
        let gathered = gather(&key(), Frequency::Monthly, &observations).unwrap();
        assert_eq!(
            gathered,
            vec![
                Observation::new("2020-01", Some(1.0)),
                Observation::new("2020-02", None),
                Observation::new("2020-03", Some(3.0)),
            ]
        );
    }

    #[test]
    fn annual_axis() {
        let observations = vec![raw("2019", 1.0), raw("2021", 3.0)];
        let gathered = gather(&key(), Frequency::Annual, &observations).unwrap();
        assert_eq!(
            gathered,
            vec![
                Observation::new("2019", Some(1.0)),
                Observation::new("2020", None),
                Observation::new("2021", Some(3.0)),
            ]
        );
    }

    #[test]
    fn daily_to_monthly_last_wins() {
        let observations = vec![raw("2020-01-05", 5.0), raw("2020-01-20", 9.0)];
        let gathered = gather(&key(), Frequency::Daily, &observations).unwrap();
        assert_eq!(gathered, vec![Observation::new("2020-01", Some(9.0))]);
    }

    #[test]
    fn last_wins_by_chronology_not_source_order() {
        let observations = vec![raw("2020-01-20", 9.0), raw("2020-01-05", 5.0)];
        let gathered = gather(&key(), Frequency::Daily, &observations).unwrap();
        assert_eq!(gathered, vec![Observation::new("2020-01", Some(9.0))]);
    }

    #[test]
    fn duplicate_under_none_policy_is_malformed() {
        let observations = vec![raw("2020-01", 1.0), raw("2020-01", 2.0)];
        let result = gather(&key(), Frequency::Monthly, &observations);
        assert!(matches!(result, Err(Error::MalformedSeries { .. })));
    }

    #[test]
    fn null_period_is_dropped_without_terminating() {
        let observations = vec![
            raw("2020-01", 1.0),
            RawObservation::new(None, Some(99.0)),
            raw("2020-02", 2.0),
        ];
        let gathered = gather(&key(), Frequency::Monthly, &observations).unwrap();
        assert_eq!(gathered.len(), 2);
        assert_eq!(gathered[1], Observation::new("2020-02", Some(2.0)));
    }

    #[test]
    fn explicit_missing_value_is_kept() {
        let observations = vec![
            raw("2020-01", 1.0),
            RawObservation::new(Some("2020-02".to_string()), None),
        ];
        let gathered = gather(&key(), Frequency::Monthly, &observations).unwrap();
        assert_eq!(gathered[1], Observation::new("2020-02", None));
    }

    #[test]
    fn december_rolls_over() {
        let observations = vec![raw("2019-12", 1.0), raw("2020-01", 2.0)];
        let gathered = gather(&key(), Frequency::Monthly, &observations).unwrap();
        assert_eq!(gathered[0].period, "2019-12");
        assert_eq!(gathered[1].period, "2020-01");
    }

    #[test]
    fn weekly_maps_to_month_of_week_start() {
        let observations = vec![raw("2020-W03", 7.0)];
        let gathered = gather(&key(), Frequency::Weekly, &observations).unwrap();
        assert_eq!(gathered, vec![Observation::new("2020-01", Some(7.0))]);
    }

    #[test]
    fn hourly_periods_parse() {
        let observations = vec![raw("2020-01-05T10:30", 1.0), raw("2020-01-05T11:30", 2.0)];
        let gathered = gather(&key(), Frequency::Hourly, &observations).unwrap();
        assert_eq!(gathered, vec![Observation::new("2020-01", Some(2.0))]);
    }

    #[test]
    fn undefined_frequency_passes_periods_through() {
        let observations = vec![raw("Q1/2020", 1.0), raw("Q2/2020", 2.0)];
        let gathered = gather(&key(), Frequency::Undefined, &observations).unwrap();
        assert_eq!(gathered[0].period, "Q1/2020");
        assert_eq!(gathered[1].period, "Q2/2020");
    }

    #[test]
    fn empty_input_yields_empty_axis() {
        let gathered = gather(&key(), Frequency::Monthly, &[]).unwrap();
        assert!(gathered.is_empty());
    }
}
