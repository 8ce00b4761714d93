//! Event-to-lap correlation.
//!
//! Radio messages and position samples are timestamped independently of the
//! lap boundaries. A [`LapMatcher`] decides which lap a timestamp belongs to;
//! two strategies exist because the dashboard historically used both:
//!
//! - [`ContainmentMatcher`]: the first lap (by lap number) whose
//!   `[date_start, date_start + lap_duration]` window contains the event.
//! - [`NearestStartMatcher`]: the lap whose start is closest to the event,
//!   regardless of containment.
//!
//! Neither strategy ever fails. Events that cannot be placed are kept with
//! an unknown lap, rendered as `?`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Lap, PositionSample, RadioMessage};
use crate::timestamp::EventTime;

/// Placeholder shown for events without a lap.
pub const UNKNOWN_LAP_LABEL: &str = "?";

/// Anything carrying a normalized timestamp.
pub trait Timed {
    /// The event's time.
    fn event_time(&self) -> EventTime;
}

impl Timed for RadioMessage {
    fn event_time(&self) -> EventTime {
        self.date
    }
}

impl Timed for PositionSample {
    fn event_time(&self) -> EventTime {
        self.date
    }
}

/// Strategy selecting the lap an instant belongs to.
pub trait LapMatcher: fmt::Debug {
    /// The policy this matcher implements.
    fn policy(&self) -> CorrelationPolicy;

    /// Lap number for a known instant, if any lap qualifies.
    fn lap_at(&self, at: DateTime<Utc>) -> Option<u32>;

    /// Lap number for a possibly-unknown time.
    fn lap_for(&self, time: EventTime) -> Option<u32> {
        time.known().and_then(|at| self.lap_at(at))
    }
}

/// Which lap-assignment strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationPolicy {
    /// Event must fall inside the lap's start/end window.
    #[default]
    Containment,
    /// Event goes to the lap with the closest start time.
    NearestStart,
}

impl CorrelationPolicy {
    /// Build the matcher for this policy over a driver's laps.
    ///
    /// `tolerance` only applies to [`CorrelationPolicy::NearestStart`].
    #[must_use]
    pub fn matcher(self, laps: &[Lap], tolerance: Option<Duration>) -> Box<dyn LapMatcher> {
        match self {
            Self::Containment => Box::new(ContainmentMatcher::new(laps)),
            Self::NearestStart => {
                let matcher = NearestStartMatcher::new(laps);
                Box::new(match tolerance {
                    Some(tolerance) => matcher.with_tolerance(tolerance),
                    None => matcher,
                })
            }
        }
    }
}

impl fmt::Display for CorrelationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Containment => write!(f, "containment"),
            Self::NearestStart => write!(f, "nearest-start"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LapWindow {
    lap_number: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Assigns an event to the first lap whose window contains it.
#[derive(Debug, Clone, Default)]
pub struct ContainmentMatcher {
    windows: Vec<LapWindow>,
}

impl ContainmentMatcher {
    /// Index the laps that have a number, a known start and a usable duration.
    #[must_use]
    pub fn new(laps: &[Lap]) -> Self {
        let mut windows: Vec<LapWindow> = laps
            .iter()
            .filter_map(|lap| {
                Some(LapWindow {
                    lap_number: lap.lap_number?,
                    start: lap.date_start.known()?,
                    end: lap.end()?,
                })
            })
            .collect();
        windows.sort_by_key(|w| w.lap_number);
        Self { windows }
    }

    /// Number of laps usable for containment.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no lap is usable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl LapMatcher for ContainmentMatcher {
    fn policy(&self) -> CorrelationPolicy {
        CorrelationPolicy::Containment
    }

    fn lap_at(&self, at: DateTime<Utc>) -> Option<u32> {
        self.windows
            .iter()
            .find(|w| w.start <= at && at <= w.end)
            .map(|w| w.lap_number)
    }
}

/// Assigns an event to the lap whose start is closest in time.
///
/// Ties go to the earlier lap. The result depends only on the set of
/// `(date_start, lap_number)` pairs, never on input order.
#[derive(Debug, Clone, Default)]
pub struct NearestStartMatcher {
    starts: Vec<(DateTime<Utc>, u32)>,
    tolerance: Option<Duration>,
}

impl NearestStartMatcher {
    /// Index the laps that have a number and a known start.
    #[must_use]
    pub fn new(laps: &[Lap]) -> Self {
        let mut starts: Vec<(DateTime<Utc>, u32)> = laps
            .iter()
            .filter_map(|lap| Some((lap.date_start.known()?, lap.lap_number?)))
            .collect();
        starts.sort_unstable();
        // Equal starts keep the lowest lap number.
        starts.dedup_by_key(|(start, _)| *start);
        Self {
            starts,
            tolerance: None,
        }
    }

    /// Reject matches farther than `tolerance` from the chosen lap start.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Number of laps with a known start.
    #[must_use]
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether no lap has a known start.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

impl LapMatcher for NearestStartMatcher {
    fn policy(&self) -> CorrelationPolicy {
        CorrelationPolicy::NearestStart
    }

    fn lap_at(&self, at: DateTime<Utc>) -> Option<u32> {
        let idx = self.starts.partition_point(|(start, _)| *start < at);
        let before = idx.checked_sub(1).map(|i| self.starts[i]);
        let after = self.starts.get(idx).copied();

        let (start, lap_number) = match (before, after) {
            (Some(b), Some(a)) => {
                if at - b.0 <= a.0 - at {
                    b
                } else {
                    a
                }
            }
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => return None,
        };

        match self.tolerance {
            Some(tolerance) if (at - start).abs() > tolerance => None,
            _ => Some(lap_number),
        }
    }
}

/// An event with the lap it was placed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelatedEvent<E> {
    /// The source record, unchanged.
    #[serde(flatten)]
    pub event: E,
    /// Inferred lap, or `None` when no lap qualified.
    pub lap_number: Option<u32>,
}

impl<E> CorrelatedEvent<E> {
    /// Wrap an event without a lap.
    pub fn unresolved(event: E) -> Self {
        Self {
            event,
            lap_number: None,
        }
    }

    /// Whether a lap was found.
    pub fn is_resolved(&self) -> bool {
        self.lap_number.is_some()
    }

    /// Lap number for display, `?` when unknown.
    pub fn lap_label(&self) -> String {
        self.lap_number
            .map_or_else(|| UNKNOWN_LAP_LABEL.to_string(), |n| n.to_string())
    }
}

/// Place every event on a lap using `matcher`.
///
/// Output order matches input order; events are never dropped.
pub fn correlate<E: Timed + Clone>(
    events: &[E],
    matcher: &dyn LapMatcher,
) -> Vec<CorrelatedEvent<E>> {
    let rows: Vec<CorrelatedEvent<E>> = events
        .iter()
        .map(|event| CorrelatedEvent {
            lap_number: matcher.lap_for(event.event_time()),
            event: event.clone(),
        })
        .collect();

    debug!(
        policy = %matcher.policy(),
        events = rows.len(),
        resolved = rows.iter().filter(|r| r.is_resolved()).count(),
        "correlated events to laps"
    );
    rows
}

/// Retry lap assignment for rows whose lap is still unknown.
///
/// Resolved rows are left untouched. Returns how many rows were newly resolved.
pub fn resolve_unknown<E: Timed>(rows: &mut [CorrelatedEvent<E>], matcher: &dyn LapMatcher) -> usize {
    let mut resolved = 0;
    for row in rows.iter_mut().filter(|r| !r.is_resolved()) {
        row.lap_number = matcher.lap_for(row.event.event_time());
        if row.is_resolved() {
            resolved += 1;
        }
    }
    resolved
}
