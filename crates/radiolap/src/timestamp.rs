//! Timestamp normalization for upstream records.
//!
//! The timing API emits timestamps in more than one textual shape, sometimes
//! within the same field across endpoints. Every timestamp passes through an
//! ordered fallback (strict ISO-8601, then a permissive component parse, then
//! a handful of best-effort formats) and ends up either as a UTC instant or
//! as [`EventTime::Unknown`]. Parsing never fails loudly: a bad row loses its
//! temporal fields, the batch survives.

use std::fmt;
use std::sync::OnceLock;

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc,
};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

/// Earliest epoch value accepted as a bare Unix timestamp (2000-01-01).
const EPOCH_FLOOR_SECS: f64 = 946_684_800.0;

/// Latest epoch value accepted as a bare Unix timestamp (2100-01-01).
const EPOCH_CEILING_SECS: f64 = 4_102_444_800.0;

/// Naive formats tried by the best-effort stage, in order.
const BEST_EFFORT_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y%m%dT%H%M%S",
];

/// Date-only formats tried by the best-effort stage; they resolve to midnight UTC.
const BEST_EFFORT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];

/// A normalized point in time, or the explicit marker for an unparseable one.
///
/// `Known` sorts before `Unknown`, so sorting a batch by time pushes rows with
/// bad timestamps to the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventTime {
    /// A successfully normalized UTC instant.
    Known(DateTime<Utc>),
    /// The source value was missing or could not be parsed.
    #[default]
    Unknown,
}

impl EventTime {
    /// Normalize a raw timestamp string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        normalize(raw)
    }

    /// The instant, if known.
    #[must_use]
    pub fn known(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Known(ts) => Some(ts),
            Self::Unknown => None,
        }
    }

    /// Whether the instant is known.
    #[must_use]
    pub fn is_known(self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl From<DateTime<Utc>> for EventTime {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Known(ts)
    }
}

impl From<Option<DateTime<Utc>>> for EventTime {
    fn from(ts: Option<DateTime<Utc>>) -> Self {
        ts.map_or(Self::Unknown, Self::Known)
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl Serialize for EventTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for EventTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(serde_json::Value::String(raw)) => normalize(&raw),
            Some(serde_json::Value::Number(n)) => n.as_f64().and_then(from_epoch_seconds).into(),
            _ => Self::Unknown,
        })
    }
}

/// Which fallback stage produced a normalized timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    /// RFC 3339 / ISO-8601, with or without an offset.
    Strict,
    /// Component parse tolerating separators, precision and zone spelling.
    Mixed,
    /// Assorted legacy formats, date-only strings and epoch seconds.
    BestEffort,
}

/// Normalize a raw timestamp, mapping every failure to [`EventTime::Unknown`].
#[must_use]
pub fn normalize(raw: &str) -> EventTime {
    match normalize_with_stage(raw) {
        Some((ts, stage)) => {
            trace!(raw, ?stage, "normalized timestamp");
            EventTime::Known(ts)
        }
        None => {
            trace!(raw, "unparseable timestamp");
            EventTime::Unknown
        }
    }
}

/// Normalize a raw timestamp and report the stage that accepted it.
#[must_use]
pub fn normalize_with_stage(raw: &str) -> Option<(DateTime<Utc>, ParseStage)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(ts) = parse_strict(raw) {
        return Some((ts, ParseStage::Strict));
    }
    if let Some(ts) = parse_mixed(raw) {
        return Some((ts, ParseStage::Mixed));
    }
    parse_best_effort(raw).map(|ts| (ts, ParseStage::BestEffort))
}

fn parse_strict(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn mixed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?x)^
            (?P<y>\d{4})-(?P<mo>\d{1,2})-(?P<d>\d{1,2})
            (?:[Tt]|\s+)
            (?P<h>\d{1,2}):(?P<mi>\d{2})
            (?::(?P<s>\d{2})(?:[.,](?P<frac>\d+))?)?
            \s*
            (?P<tz>[Zz]|UTC|GMT|[+-]\d{2}(?::?\d{2})?)?
            $",
        )
        .expect("mixed timestamp pattern is valid")
    })
}

fn parse_mixed(raw: &str) -> Option<DateTime<Utc>> {
    let caps = mixed_pattern().captures(raw)?;
    let field = |name: &str| caps.name(name).map(|m| m.as_str());

    let date = NaiveDate::from_ymd_opt(
        field("y")?.parse().ok()?,
        field("mo")?.parse().ok()?,
        field("d")?.parse().ok()?,
    )?;
    let seconds = field("s").map_or(Some(0), |s| s.parse().ok())?;
    let nanos = field("frac").map_or(Some(0), fraction_to_nanos)?;
    let time = NaiveTime::from_hms_nano_opt(
        field("h")?.parse().ok()?,
        field("mi")?.parse().ok()?,
        seconds,
        nanos,
    )?;
    let offset = parse_offset(field("tz"))?;

    offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Left-align a fractional-second digit run to nanoseconds, dropping excess precision.
fn fraction_to_nanos(digits: &str) -> Option<u32> {
    let mut padded: String = digits.chars().take(9).collect();
    while padded.len() < 9 {
        padded.push('0');
    }
    padded.parse().ok()
}

fn parse_offset(zone: Option<&str>) -> Option<FixedOffset> {
    let zone = match zone {
        None | Some("Z" | "z" | "UTC" | "GMT") => return FixedOffset::east_opt(0),
        Some(zone) => zone,
    };
    let (sign, rest) = zone.split_at(1);
    let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..).filter(|m| !m.is_empty()).map_or(Some(0), |m| m.parse().ok())?;
    let seconds = hours * 3600 + minutes * 60;
    match sign {
        "+" => FixedOffset::east_opt(seconds),
        "-" => FixedOffset::west_opt(seconds),
        _ => None,
    }
}

fn parse_best_effort(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in BEST_EFFORT_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in BEST_EFFORT_DATE_FORMATS {
        if let Some(midnight) = NaiveDate::parse_from_str(raw, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Some(Utc.from_utc_datetime(&midnight));
        }
    }
    raw.parse::<f64>().ok().and_then(from_epoch_seconds)
}

/// Interpret a number as Unix epoch seconds, rejecting values outside 2000..2100.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_epoch_seconds(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || !(EPOCH_FLOOR_SECS..EPOCH_CEILING_SECS).contains(&value) {
        return None;
    }
    let secs = value.trunc();
    let nanos = ((value - secs) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(secs as i64, nanos).single()
}
