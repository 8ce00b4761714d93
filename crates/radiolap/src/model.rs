//! Upstream record types.
//!
//! These mirror the flat JSON records served by the timing API. Records are
//! read-only once decoded; everything the analysis layer needs is derived
//! from them without mutation. Optional numeric fields and timestamps are
//! decoded leniently so one malformed value never rejects a whole response.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::timestamp::EventTime;

/// A race weekend (or test) as listed by the meetings endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    /// Upstream key of the meeting.
    pub meeting_key: u32,
    /// Display name, e.g. "Singapore Grand Prix".
    #[serde(default, deserialize_with = "lenient::string")]
    pub meeting_name: String,
    /// Season year.
    #[serde(default)]
    pub year: i32,
    /// Host country.
    #[serde(default)]
    pub country_name: Option<String>,
    /// Short circuit name.
    #[serde(default)]
    pub circuit_short_name: Option<String>,
    /// City or area.
    #[serde(default)]
    pub location: Option<String>,
    /// Start of the meeting.
    #[serde(default)]
    pub date_start: EventTime,
}

/// One timed on-track activity within a meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Upstream key of the session.
    pub session_key: u32,
    /// Meeting this session belongs to.
    pub meeting_key: u32,
    /// Display name, e.g. "Race" or "Practice 1".
    #[serde(default, deserialize_with = "lenient::string")]
    pub session_name: String,
    /// Session category, e.g. "Qualifying".
    #[serde(default)]
    pub session_type: Option<String>,
    /// Scheduled start.
    #[serde(default)]
    pub date_start: EventTime,
    /// Scheduled end.
    #[serde(default)]
    pub date_end: EventTime,
}

impl Session {
    /// Whether lap-time performance is meaningful for this session.
    #[must_use]
    pub fn is_race(&self) -> bool {
        self.session_name.contains("Race")
    }
}

/// A driver entry for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Car number.
    pub driver_number: u32,
    /// Full name.
    #[serde(default, deserialize_with = "lenient::string")]
    pub full_name: String,
    /// Team name.
    #[serde(default, deserialize_with = "lenient::string")]
    pub team_name: String,
    /// Three-letter acronym.
    #[serde(default)]
    pub name_acronym: Option<String>,
    /// Name as shown on broadcast graphics.
    #[serde(default)]
    pub broadcast_name: Option<String>,
    /// Portrait image URL.
    #[serde(default)]
    pub headshot_url: Option<String>,
    /// Team colour as a hex string without `#`.
    #[serde(default)]
    pub team_colour: Option<String>,
}

impl Driver {
    /// Selector label, e.g. `"44 - Lewis HAMILTON"`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} - {}", self.driver_number, self.full_name)
    }
}

/// Distinct, non-empty team names in alphabetical order.
#[must_use]
pub fn team_names(drivers: &[Driver]) -> Vec<String> {
    drivers
        .iter()
        .map(|d| d.team_name.trim())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Drivers entered for `team`; names compare case-insensitively.
#[must_use]
pub fn drivers_of_team<'a>(drivers: &'a [Driver], team: &str) -> Vec<&'a Driver> {
    let team = team.trim();
    drivers
        .iter()
        .filter(|d| d.team_name.trim().eq_ignore_ascii_case(team))
        .collect()
}

/// One lap of one driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    /// Lap number; the upstream occasionally omits it.
    #[serde(default, deserialize_with = "lenient::u32_opt")]
    pub lap_number: Option<u32>,
    /// Car number.
    #[serde(default)]
    pub driver_number: u32,
    /// When the lap started.
    #[serde(default)]
    pub date_start: EventTime,
    /// Lap time in seconds; absent for incomplete or non-numeric values.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub lap_duration: Option<f64>,
    /// Whether the lap started in the pit lane.
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub is_pit_out_lap: bool,
    /// Sector 1 time in seconds.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub duration_sector_1: Option<f64>,
    /// Sector 2 time in seconds.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub duration_sector_2: Option<f64>,
    /// Sector 3 time in seconds.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub duration_sector_3: Option<f64>,
    /// Intermediate 1 speed in km/h.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub i1_speed: Option<f64>,
    /// Intermediate 2 speed in km/h.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub i2_speed: Option<f64>,
    /// Speed trap reading in km/h.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub st_speed: Option<f64>,
}

impl Lap {
    /// Usable lap duration: finite and non-negative.
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.lap_duration.filter(|d| d.is_finite() && *d >= 0.0)
    }

    /// Lap end, computed as `date_start + lap_duration`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        let start = self.date_start.known()?;
        let seconds = self.duration()?;
        start.checked_add_signed(Duration::nanoseconds((seconds * 1e9).round() as i64))
    }
}

/// A position (classification rank) update for one driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSample {
    /// When the position was recorded.
    #[serde(default)]
    pub date: EventTime,
    /// Rank; 1 is leading.
    pub position: u32,
    /// Car number.
    #[serde(default)]
    pub driver_number: u32,
    /// Session the record belongs to.
    #[serde(default)]
    pub session_key: u32,
}

/// A team radio recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioMessage {
    /// When the message was broadcast.
    #[serde(default)]
    pub date: EventTime,
    /// Opaque reference to the audio file.
    #[serde(default, deserialize_with = "lenient::string")]
    pub recording_url: String,
    /// Car number.
    #[serde(default)]
    pub driver_number: u32,
    /// Session the record belongs to.
    #[serde(default)]
    pub session_key: u32,
}

/// Tyre compound of a stint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Compound {
    /// Red-walled slick.
    Soft,
    /// Yellow-walled slick.
    Medium,
    /// White-walled slick.
    Hard,
    /// Green-walled intermediate.
    Intermediate,
    /// Blue-walled full wet.
    Wet,
    /// Missing or unrecognized compound.
    #[default]
    Unknown,
}

impl Compound {
    /// Upstream spelling of the compound.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "SOFT",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
            Self::Intermediate => "INTERMEDIATE",
            Self::Wet => "WET",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl From<&str> for Compound {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SOFT" => Self::Soft,
            "MEDIUM" => Self::Medium,
            "HARD" => Self::Hard,
            "INTERMEDIATE" => Self::Intermediate,
            "WET" => Self::Wet,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Compound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Compound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(serde_json::Value::String(s)) => Self::from(s.as_str()),
            _ => Self::Unknown,
        })
    }
}

/// A contiguous run of laps on one set of tyres.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stint {
    /// Stint ordinal, starting at 1.
    pub stint_number: u32,
    /// Tyre compound.
    #[serde(default)]
    pub compound: Compound,
    /// First lap of the stint.
    pub lap_start: u32,
    /// Last lap of the stint (inclusive).
    pub lap_end: u32,
    /// Tyre age in laps when the stint began.
    #[serde(default, deserialize_with = "lenient::u32_opt")]
    pub tyre_age_at_start: Option<u32>,
    /// Car number.
    #[serde(default)]
    pub driver_number: u32,
}

impl Stint {
    /// Whether `lap_number` lies within `[lap_start, lap_end]`.
    #[must_use]
    pub fn contains_lap(&self, lap_number: u32) -> bool {
        (self.lap_start..=self.lap_end).contains(&lap_number)
    }

    /// Number of laps in the stint.
    #[must_use]
    pub fn length(&self) -> u32 {
        if self.lap_end < self.lap_start {
            0
        } else {
            self.lap_end - self.lap_start + 1
        }
    }
}

/// A pit stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitStop {
    /// Lap on which the car entered the pits.
    pub lap_number: u32,
    /// Time spent in the pit lane, in seconds.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub pit_duration: Option<f64>,
    /// When the stop happened.
    #[serde(default)]
    pub date: EventTime,
    /// Car number.
    #[serde(default)]
    pub driver_number: u32,
}

/// A weather station reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// When the reading was taken.
    #[serde(default)]
    pub date: EventTime,
    /// Air temperature in °C.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub air_temperature: Option<f64>,
    /// Track temperature in °C.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub track_temperature: Option<f64>,
    /// Relative humidity in %.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub humidity: Option<f64>,
    /// Non-zero when rain was reported.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub rainfall: Option<f64>,
    /// Wind speed in m/s.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub wind_speed: Option<f64>,
}

/// A car telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarDataSample {
    /// When the sample was taken.
    #[serde(default)]
    pub date: EventTime,
    /// Speed in km/h.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub speed: Option<f64>,
    /// Throttle application in %.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub throttle: Option<f64>,
    /// Brake application.
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub brake: Option<f64>,
    /// Selected gear.
    #[serde(default, deserialize_with = "lenient::u32_opt")]
    pub n_gear: Option<u32>,
    /// Engine speed.
    #[serde(default, deserialize_with = "lenient::u32_opt")]
    pub rpm: Option<u32>,
    /// DRS status code.
    #[serde(default, deserialize_with = "lenient::u32_opt")]
    pub drs: Option<u32>,
}

/// Deserializers that map wrongly-typed values to "absent" instead of failing.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn f64_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
            _ => None,
        })
    }

    pub fn u32_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            _ => None,
        })
    }

    pub fn bool_or_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(matches!(
            Option::<Value>::deserialize(deserializer)?,
            Some(Value::Bool(true))
        ))
    }

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) => s,
            _ => String::new(),
        })
    }
}
