//! As-of alignment of position samples to lap starts.
//!
//! Unlike [`crate::correlate`], alignment never considers lap duration: each
//! sample is attached to a lap *start* chosen by [`AsOfDirection`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Lap, PositionSample};

/// Which lap start a sample is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsOfDirection {
    /// Latest lap start at or before the sample.
    Backward,
    /// Earliest lap start at or after the sample.
    Forward,
    /// Closest lap start on either side; ties go to the earlier start.
    #[default]
    Nearest,
}

impl fmt::Display for AsOfDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backward => write!(f, "backward"),
            Self::Forward => write!(f, "forward"),
            Self::Nearest => write!(f, "nearest"),
        }
    }
}

/// A position sample tagged with the lap it was aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LapPosition {
    /// Lap the sample was aligned to.
    pub lap_number: u32,
    /// Classified position at the sample time.
    pub position: u32,
    /// Sample time.
    pub date: DateTime<Utc>,
    /// Start of the selected lap.
    pub lap_start: DateTime<Utc>,
}

type LapStart = (DateTime<Utc>, Option<u32>);

/// Attach a lap number to every position sample that can be aligned.
///
/// Samples with an unknown time, samples with no candidate lap start in the
/// chosen direction, and samples whose selected lap has no number are
/// dropped. The result is ordered by sample time.
#[must_use]
pub fn align_positions(
    positions: &[PositionSample],
    laps: &[Lap],
    direction: AsOfDirection,
) -> Vec<LapPosition> {
    let mut starts: Vec<LapStart> = laps
        .iter()
        .filter_map(|lap| Some((lap.date_start.known()?, lap.lap_number)))
        .collect();
    // Equal starts keep the lowest numbered lap.
    starts.sort_by_key(|(start, number)| (*start, number.is_none(), *number));
    starts.dedup_by_key(|(start, _)| *start);

    let mut rows: Vec<LapPosition> = positions
        .iter()
        .filter_map(|sample| {
            let date = sample.date.known()?;
            let (lap_start, lap_number) = select(&starts, date, direction)?;
            Some(LapPosition {
                lap_number: lap_number?,
                position: sample.position,
                date,
                lap_start,
            })
        })
        .collect();
    rows.sort_by_key(|row| row.date);

    debug!(
        %direction,
        samples = positions.len(),
        aligned = rows.len(),
        "aligned positions to laps"
    );
    rows
}

fn select(starts: &[LapStart], at: DateTime<Utc>, direction: AsOfDirection) -> Option<LapStart> {
    let backward = starts
        .partition_point(|(start, _)| *start <= at)
        .checked_sub(1)
        .map(|i| starts[i]);
    let forward = starts
        .get(starts.partition_point(|(start, _)| *start < at))
        .copied();

    match direction {
        AsOfDirection::Backward => backward,
        AsOfDirection::Forward => forward,
        AsOfDirection::Nearest => match (backward, forward) {
            (Some(b), Some(f)) => Some(if at - b.0 <= f.0 - at { b } else { f }),
            (b, f) => b.or(f),
        },
    }
}

/// Keep only the last aligned sample within each lap, ordered by lap number.
#[must_use]
pub fn last_position_per_lap(rows: &[LapPosition]) -> Vec<LapPosition> {
    let mut by_lap: BTreeMap<u32, LapPosition> = BTreeMap::new();
    for row in rows {
        by_lap
            .entry(row.lap_number)
            .and_modify(|kept| {
                if row.date >= kept.date {
                    *kept = *row;
                }
            })
            .or_insert(*row);
    }
    by_lap.into_values().collect()
}
