//! Derived session statistics.
//!
//! Everything here is a pure function over already-fetched records. Missing
//! or non-numeric values are left out of aggregates; the records themselves
//! are never rejected.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Timelike;
use serde::Serialize;

use crate::model::{Compound, Lap, PitStop, PositionSample, RadioMessage, Stint, WeatherSample};

/// Sum of absolute position differences between adjacent samples.
///
/// Samples are expected in time order.
#[must_use]
pub fn position_change_count(positions: &[PositionSample]) -> u32 {
    positions
        .windows(2)
        .map(|pair| pair[0].position.abs_diff(pair[1].position))
        .sum()
}

/// Position of the last sample, if any.
#[must_use]
pub fn final_position(positions: &[PositionSample]) -> Option<u32> {
    positions.last().map(|sample| sample.position)
}

/// Fastest usable lap duration in seconds, `0.0` when no lap has one.
#[must_use]
pub fn fastest_lap(laps: &[Lap]) -> f64 {
    LapPace::from_laps(laps.iter()).fastest.unwrap_or(0.0)
}

/// Fastest and average lap time over a set of laps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LapPace {
    /// Fastest duration in seconds.
    pub fastest: Option<f64>,
    /// Mean duration in seconds.
    pub average: Option<f64>,
    /// Laps that contributed a duration.
    pub lap_count: usize,
}

impl LapPace {
    /// Aggregate the usable durations of `laps`.
    pub fn from_laps<'a>(laps: impl IntoIterator<Item = &'a Lap>) -> Self {
        let durations: Vec<f64> = laps.into_iter().filter_map(Lap::duration).collect();
        if durations.is_empty() {
            return Self::default();
        }
        let fastest = durations.iter().copied().fold(f64::INFINITY, f64::min);
        #[allow(clippy::cast_precision_loss)]
        let average = durations.iter().sum::<f64>() / durations.len() as f64;
        Self {
            fastest: Some(fastest),
            average: Some(average),
            lap_count: durations.len(),
        }
    }
}

/// Lap pace with and without pit laps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaceComparison {
    /// Every lap with a duration.
    pub all: LapPace,
    /// Laps not listed as pit laps.
    pub racing: LapPace,
    /// Lap numbers taken from the pit-stop list.
    pub excluded_laps: BTreeSet<u32>,
}

/// Compare overall pace with pace excluding pit-stop laps.
#[must_use]
pub fn racing_pace(laps: &[Lap], pit_stops: &[PitStop]) -> PaceComparison {
    let excluded_laps: BTreeSet<u32> = pit_stops.iter().map(|pit| pit.lap_number).collect();
    let racing = laps
        .iter()
        .filter(|lap| !lap.lap_number.is_some_and(|n| excluded_laps.contains(&n)));
    PaceComparison {
        all: LapPace::from_laps(laps),
        racing: LapPace::from_laps(racing),
        excluded_laps,
    }
}

/// One row of the tire strategy table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StintSummary {
    /// Stint index within the session.
    pub stint_number: u32,
    /// Tire compound fitted.
    pub compound: Compound,
    /// First lap of the stint.
    pub lap_start: u32,
    /// Last lap of the stint.
    pub lap_end: u32,
    /// Laps covered, inclusive.
    pub length: u32,
    /// Fastest lap within `[lap_start, lap_end]`.
    pub fastest_lap: Option<f64>,
}

/// Summarize each stint with its fastest lap, ordered by stint number.
#[must_use]
pub fn stint_summaries(stints: &[Stint], laps: &[Lap]) -> Vec<StintSummary> {
    let mut rows: Vec<StintSummary> = stints
        .iter()
        .map(|stint| {
            let in_stint = laps
                .iter()
                .filter(|lap| lap.lap_number.is_some_and(|n| stint.contains_lap(n)));
            StintSummary {
                stint_number: stint.stint_number,
                compound: stint.compound,
                lap_start: stint.lap_start,
                lap_end: stint.lap_end,
                length: stint.length(),
                fastest_lap: LapPace::from_laps(in_stint).fastest,
            }
        })
        .collect();
    rows.sort_by_key(|row| row.stint_number);
    rows
}

/// Radio message count per UTC hour of day. Messages without a time are skipped.
#[must_use]
pub fn radio_frequency_by_hour(messages: &[RadioMessage]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for at in messages.iter().filter_map(|m| m.date.known()) {
        *counts.entry(at.hour()).or_insert(0) += 1;
    }
    counts
}

/// Lowest and highest observed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    /// Lowest value.
    pub min: f64,
    /// Highest value.
    pub max: f64,
}

impl Range {
    fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<Self>, v| {
                Some(match acc {
                    Some(r) => Self {
                        min: r.min.min(v),
                        max: r.max.max(v),
                    },
                    None => Self { min: v, max: v },
                })
            })
    }
}

/// Weather over a meeting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherSummary {
    /// Number of weather samples.
    pub samples: usize,
    /// Air temperature range in °C.
    pub air_temperature: Option<Range>,
    /// Track temperature range in °C.
    pub track_temperature: Option<Range>,
    /// Whether any sample reported rain.
    pub rainfall: bool,
    /// More than one weather sample was recorded.
    pub changed: bool,
}

impl WeatherSummary {
    /// Summarize the given samples.
    #[must_use]
    pub fn from_samples(samples: &[WeatherSample]) -> Self {
        Self {
            samples: samples.len(),
            air_temperature: Range::of(samples.iter().filter_map(|s| s.air_temperature)),
            track_temperature: Range::of(samples.iter().filter_map(|s| s.track_temperature)),
            rainfall: samples
                .iter()
                .any(|s| s.rainfall.is_some_and(|r| r > 0.0)),
            changed: samples.len() > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::EventTime;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 9, 17, hour, minute, 0).unwrap()
    }

    fn positions(values: &[u32]) -> Vec<PositionSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, &position)| PositionSample {
                date: at(12, u32::try_from(i).unwrap()).into(),
                position,
                driver_number: 1,
                session_key: 9161,
            })
            .collect()
    }

    fn lap(number: u32, duration: Option<f64>) -> Lap {
        Lap {
            lap_number: Some(number),
            lap_duration: duration,
            ..Lap::default()
        }
    }

    fn pit(lap_number: u32) -> PitStop {
        PitStop {
            lap_number,
            pit_duration: Some(22.4),
            date: EventTime::Unknown,
            driver_number: 1,
        }
    }

    fn stint(number: u32, compound: Compound, start: u32, end: u32) -> Stint {
        Stint {
            stint_number: number,
            compound,
            lap_start: start,
            lap_end: end,
            tyre_age_at_start: None,
            driver_number: 1,
        }
    }

    #[test]
    fn test_position_change_count() {
        assert_eq!(position_change_count(&positions(&[1, 3, 3, 2])), 3);
        assert_eq!(position_change_count(&positions(&[5])), 0);
        assert_eq!(position_change_count(&[]), 0);
        assert_eq!(position_change_count(&positions(&[10, 1, 10])), 18);
    }

    #[test]
    fn test_final_position() {
        assert_eq!(final_position(&positions(&[4, 2, 3])), Some(3));
        assert_eq!(final_position(&[]), None);
    }

    #[test]
    fn test_fastest_lap_skips_non_numeric() {
        let laps: Vec<Lap> = serde_json::from_str(
            r#"[
                {"lap_number": 1, "lap_duration": 22.1},
                {"lap_number": 2, "lap_duration": null},
                {"lap_number": 3, "lap_duration": "DNF"},
                {"lap_number": 4, "lap_duration": 21.8}
            ]"#,
        )
        .unwrap();
        assert!((fastest_lap(&laps) - 21.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fastest_lap_sentinel_when_empty() {
        assert!(fastest_lap(&[lap(1, None), lap(2, None)]).abs() < f64::EPSILON);
        assert!(fastest_lap(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lap_pace_average() {
        let laps = [lap(1, Some(90.0)), lap(2, Some(92.0)), lap(3, None)];
        let pace = LapPace::from_laps(&laps);
        assert_eq!(pace.lap_count, 2);
        assert_eq!(pace.fastest, Some(90.0));
        assert_eq!(pace.average, Some(91.0));
        assert_eq!(LapPace::from_laps(std::iter::empty()), LapPace::default());
    }

    #[test]
    fn test_racing_pace_excludes_pit_laps() {
        let laps = [
            lap(1, Some(95.0)),
            lap(2, Some(80.0)),
            lap(3, Some(90.0)),
            lap(4, Some(92.0)),
        ];
        let pace = racing_pace(&laps, &[pit(2)]);
        assert_eq!(pace.all.fastest, Some(80.0));
        assert_eq!(pace.racing.fastest, Some(90.0));
        assert_eq!(pace.racing.lap_count, 3);
        assert_eq!(pace.excluded_laps, BTreeSet::from([2]));
    }

    #[test]
    fn test_racing_pace_without_pits_matches_all() {
        let laps = [lap(1, Some(95.0)), lap(2, Some(91.0))];
        let pace = racing_pace(&laps, &[]);
        assert_eq!(pace.all, pace.racing);
        assert!(pace.excluded_laps.is_empty());
    }

    #[test]
    fn test_stint_fastest_lap_uses_inclusive_range() {
        let laps = [
            lap(1, Some(99.0)),
            lap(2, Some(91.0)),
            lap(3, Some(90.5)),
            lap(4, Some(85.0)),
            lap(5, Some(92.0)),
        ];
        let stints = [
            stint(2, Compound::Hard, 4, 5),
            stint(1, Compound::Medium, 1, 3),
        ];
        let rows = stint_summaries(&stints, &laps);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stint_number, 1);
        assert_eq!(rows[0].fastest_lap, Some(90.5));
        assert_eq!(rows[0].length, 3);
        assert_eq!(rows[1].compound, Compound::Hard);
        assert_eq!(rows[1].fastest_lap, Some(85.0));
        assert_eq!(rows[1].length, 2);
    }

    #[test]
    fn test_stint_without_laps() {
        let rows = stint_summaries(&[stint(1, Compound::Soft, 10, 12)], &[lap(1, Some(90.0))]);
        assert_eq!(rows[0].fastest_lap, None);
    }

    #[test]
    fn test_radio_frequency_by_hour() {
        let radio = |date: EventTime| RadioMessage {
            date,
            recording_url: String::new(),
            driver_number: 1,
            session_key: 9161,
        };
        let messages = [
            radio(at(13, 5).into()),
            radio(at(13, 50).into()),
            radio(at(14, 1).into()),
            radio(EventTime::Unknown),
        ];
        let counts = radio_frequency_by_hour(&messages);
        assert_eq!(counts, BTreeMap::from([(13, 2), (14, 1)]));
    }

    #[test]
    fn test_weather_summary() {
        let weather = |air: Option<f64>, track: Option<f64>, rain: Option<f64>| WeatherSample {
            date: EventTime::Unknown,
            air_temperature: air,
            track_temperature: track,
            humidity: None,
            rainfall: rain,
            wind_speed: None,
        };
        let summary = WeatherSummary::from_samples(&[
            weather(Some(28.0), Some(40.5), Some(0.0)),
            weather(Some(26.5), None, Some(1.0)),
            weather(None, Some(44.0), None),
        ]);
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.air_temperature, Some(Range { min: 26.5, max: 28.0 }));
        assert_eq!(summary.track_temperature, Some(Range { min: 40.5, max: 44.0 }));
        assert!(summary.rainfall);
        assert!(summary.changed);

        let single = WeatherSummary::from_samples(&[weather(Some(20.0), None, None)]);
        assert!(!single.changed);
        assert!(!single.rainfall);
        assert_eq!(single.track_temperature, None);
        assert_eq!(WeatherSummary::from_samples(&[]), WeatherSummary::default());
    }
}
