//! Per-driver session reports.
//!
//! [`SessionReport`] gathers the correlator, alignment and statistics output
//! for one [`RequestContext`]; [`RadioLog`] is the radio-only view used by
//! `radiolap radio`. Both render as plain text, aligned tables or JSON.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::Serialize;
use tracing::warn;

use crate::align::{align_positions, last_position_per_lap, AsOfDirection, LapPosition};
use crate::cli::OutputFormat;
use crate::config::CorrelationConfig;
use crate::context::{RequestContext, Selection};
use crate::correlate::{CorrelatedEvent, CorrelationPolicy, UNKNOWN_LAP_LABEL};
use crate::error::Result;
use crate::gateway::{SessionGateway, Transport};
use crate::model::{CarDataSample, Driver, Meeting, PositionSample, RadioMessage, Session};
use crate::narrative::{
    narrate, prompt, Narrative, NarrativeGenerator, RadioContext, Sentiment, Transcriber,
};
use crate::stats::{self, PaceComparison, StintSummary, WeatherSummary};
use crate::timestamp::EventTime;

/// Headline numbers for a driver's session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    /// Laps recorded.
    pub total_laps: usize,
    /// Last classified position.
    pub final_position: Option<u32>,
    /// Sum of position swings.
    pub position_changes: u32,
    /// Fastest lap in seconds, `0.0` when unknown.
    pub fastest_lap: f64,
}

/// Everything derived for one driver in one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    /// Meeting name.
    pub meeting: String,
    /// Season year.
    pub year: i32,
    /// Session name.
    pub session: String,
    /// Session key.
    pub session_key: u32,
    /// Driver label, e.g. `"55 - Carlos SAINZ"`.
    pub driver: String,
    /// Team name.
    pub team: String,
    /// Policy used to place radio on laps.
    pub policy: CorrelationPolicy,
    /// Direction of the position as-of join.
    pub direction: AsOfDirection,
    /// Headline numbers.
    pub headline: Headline,
    /// Pace with and without pit laps; races only.
    pub pace: Option<PaceComparison>,
    /// Tire strategy.
    pub stints: Vec<StintSummary>,
    /// Radio placed on laps.
    pub radio: Vec<CorrelatedEvent<RadioMessage>>,
    /// Final position within each lap.
    pub positions_by_lap: Vec<LapPosition>,
    /// Radio message count per UTC hour.
    pub radio_by_hour: BTreeMap<u32, usize>,
    /// Weather over the meeting.
    pub weather: WeatherSummary,
    /// Language-model race analysis, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Narrative>,
}

impl SessionReport {
    /// Derive the report from a loaded request.
    #[must_use]
    pub fn build(context: &RequestContext, correlation: &CorrelationConfig) -> Self {
        let matcher = context.matcher(correlation.policy, correlation.nearest_tolerance());
        let aligned = align_positions(
            &context.positions,
            &context.laps,
            correlation.as_of_direction,
        );

        Self {
            meeting: context.meeting.meeting_name.clone(),
            year: context.meeting.year,
            session: context.session.session_name.clone(),
            session_key: context.session.session_key,
            driver: context.driver.label(),
            team: context.driver.team_name.clone(),
            policy: correlation.policy,
            direction: correlation.as_of_direction,
            headline: Headline {
                total_laps: context.total_laps(),
                final_position: stats::final_position(&context.positions),
                position_changes: stats::position_change_count(&context.positions),
                fastest_lap: stats::fastest_lap(&context.laps),
            },
            pace: context
                .session
                .is_race()
                .then(|| stats::racing_pace(&context.laps, &context.pit_stops)),
            stints: stats::stint_summaries(&context.stints, &context.laps),
            radio: context.correlated_radio(matcher.as_ref()),
            positions_by_lap: last_position_per_lap(&aligned),
            radio_by_hour: stats::radio_frequency_by_hour(&context.radio),
            weather: WeatherSummary::from_samples(&context.weather),
            analysis: None,
        }
    }

    /// Attach a race analysis.
    pub fn set_analysis(&mut self, analysis: Narrative) {
        self.analysis = Some(analysis);
    }

    /// Render in the requested format.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Plain => Ok(self.render_text(false)),
            OutputFormat::Table => Ok(self.render_text(true)),
        }
    }

    fn render_text(&self, tabular: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} - {} (session {})",
            self.meeting, self.year, self.session, self.session_key
        );
        let _ = writeln!(out, "{} ({})", self.driver, self.team);

        let h = &self.headline;
        section(&mut out, "Summary");
        let _ = writeln!(out, "  Total laps:        {}", h.total_laps);
        let _ = writeln!(
            out,
            "  Final position:    {}",
            h.final_position.map_or_else(|| "N/A".to_string(), |p| format!("P{p}"))
        );
        let _ = writeln!(out, "  Position changes:  {}", h.position_changes);
        let _ = writeln!(out, "  Fastest lap:       {:.3}s", h.fastest_lap);

        if let Some(pace) = &self.pace {
            section(&mut out, "Lap-time performance");
            let excluded: Vec<String> = pace.excluded_laps.iter().map(u32::to_string).collect();
            let _ = writeln!(
                out,
                "  All laps:          fastest {}  average {}",
                seconds(pace.all.fastest),
                seconds(pace.all.average)
            );
            let _ = writeln!(
                out,
                "  Excluding pits:    fastest {}  average {}",
                seconds(pace.racing.fastest),
                seconds(pace.racing.average)
            );
            if !excluded.is_empty() {
                let _ = writeln!(out, "  Pit laps:          {}", excluded.join(", "));
            }
        }

        section(&mut out, "Tire strategy");
        let mut table = Table::new(["Stint", "Compound", "Laps", "Length", "Fastest"]);
        for stint in &self.stints {
            table.row([
                stint.stint_number.to_string(),
                stint.compound.to_string(),
                format!("{}-{}", stint.lap_start, stint.lap_end),
                stint.length.to_string(),
                seconds(stint.fastest_lap),
            ]);
        }
        out.push_str(&table.render(tabular));

        section(&mut out, &format!("Team radio ({})", self.policy));
        let mut table = Table::new(["Time", "Lap", "Recording"]);
        for row in &self.radio {
            table.row([
                clock(row.event.date),
                row.lap_label(),
                row.event.recording_url.clone(),
            ]);
        }
        out.push_str(&table.render(tabular));

        section(&mut out, &format!("Position by lap ({})", self.direction));
        let mut table = Table::new(["Lap", "Position"]);
        for row in &self.positions_by_lap {
            table.row([row.lap_number.to_string(), format!("P{}", row.position)]);
        }
        out.push_str(&table.render(tabular));

        section(&mut out, "Radio messages by hour (UTC)");
        let mut table = Table::new(["Hour", "Messages"]);
        for (hour, count) in &self.radio_by_hour {
            table.row([format!("{hour:02}:00"), count.to_string()]);
        }
        out.push_str(&table.render(tabular));

        section(&mut out, "Weather");
        let w = &self.weather;
        let range = |r: Option<stats::Range>| {
            r.map_or_else(
                || "n/a".to_string(),
                |r| format!("{:.1}-{:.1} °C", r.min, r.max),
            )
        };
        let _ = writeln!(out, "  Samples:           {}", w.samples);
        let _ = writeln!(out, "  Air temperature:   {}", range(w.air_temperature));
        let _ = writeln!(out, "  Track temperature: {}", range(w.track_temperature));
        let _ = writeln!(out, "  Rainfall:          {}", yes_no(w.rainfall));
        let _ = writeln!(out, "  Weather changed:   {}", yes_no(w.changed));

        if let Some(analysis) = &self.analysis {
            section(&mut out, "Race analysis");
            let _ = writeln!(out, "{analysis}");
        }
        out
    }
}

/// One radio message with its derived annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadioEntry {
    /// Broadcast time.
    pub date: EventTime,
    /// Lap the message was placed on.
    pub lap_number: Option<u32>,
    /// Position at the time of the message.
    pub position: Option<u32>,
    /// Recording reference.
    pub recording_url: String,
    /// Transcript, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Narrative>,
    /// Short summary, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Narrative>,
    /// Tone, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    /// Contextual analysis, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Narrative>,
    /// Car telemetry at the broadcast time, when requested and recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub car: Option<CarDataSample>,
}

impl RadioEntry {
    fn lap_label(&self) -> String {
        self.lap_number
            .map_or_else(|| UNKNOWN_LAP_LABEL.to_string(), |n| n.to_string())
    }
}

/// Radio messages of one driver, placed on laps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadioLog {
    /// Driver label.
    pub driver: String,
    /// Team name.
    pub team: String,
    /// Session name.
    pub session: String,
    /// Policy used to place messages on laps.
    pub policy: CorrelationPolicy,
    /// The messages, in time order.
    pub entries: Vec<RadioEntry>,
}

impl RadioLog {
    /// Place the context's radio on laps.
    #[must_use]
    pub fn build(context: &RequestContext, correlation: &CorrelationConfig) -> Self {
        let matcher = context.matcher(correlation.policy, correlation.nearest_tolerance());
        let entries = context
            .correlated_radio(matcher.as_ref())
            .into_iter()
            .map(|row| RadioEntry {
                date: row.event.date,
                lap_number: row.lap_number,
                position: position_at(&context.positions, row.event.date),
                recording_url: row.event.recording_url,
                transcript: None,
                summary: None,
                sentiment: None,
                analysis: None,
                car: None,
            })
            .collect();

        Self {
            driver: context.driver.label(),
            team: context.driver.team_name.clone(),
            session: context.session.session_name.clone(),
            policy: correlation.policy,
            entries,
        }
    }

    /// Look up the car telemetry sample at each message's broadcast time.
    ///
    /// Messages with an unknown time are skipped. A failed lookup is logged
    /// and leaves that entry without telemetry. Returns how many entries
    /// received a sample.
    pub async fn attach_telemetry<T: Transport>(
        &mut self,
        gateway: &mut SessionGateway<T>,
        selection: Selection,
    ) -> usize {
        let mut attached = 0;
        for entry in &mut self.entries {
            let Some(at) = entry.date.known() else {
                continue;
            };
            match gateway
                .car_data_at(selection.session_key, selection.driver_number, at)
                .await
            {
                Ok(samples) => {
                    entry.car = samples.into_iter().next();
                    attached += usize::from(entry.car.is_some());
                }
                Err(err) => warn!(error = %err, %at, "car telemetry unavailable"),
            }
        }
        attached
    }

    /// Transcribe every message, one at a time. Failures become warnings.
    pub async fn transcribe(&mut self, transcriber: &dyn Transcriber) {
        for entry in &mut self.entries {
            let result = transcriber.transcribe(&entry.recording_url).await;
            entry.transcript = Some(Narrative::from_result("transcript", result));
        }
    }

    /// Mark every transcript unavailable without attempting any.
    pub fn transcripts_unavailable(&mut self, reason: &dyn fmt::Display) {
        warn!(reason = %reason, "transcription unavailable");
        for entry in &mut self.entries {
            entry.transcript = Some(Narrative::Warning(format!("transcript unavailable: {reason}")));
        }
    }

    /// Mark the summary of every transcribed message unavailable.
    pub fn summaries_unavailable(&mut self, reason: &dyn fmt::Display) {
        warn!(reason = %reason, "radio summaries unavailable");
        for entry in &mut self.entries {
            if entry.transcript.as_ref().and_then(Narrative::text).is_some() {
                entry.summary = Some(Narrative::Warning(format!("summary unavailable: {reason}")));
            }
        }
    }

    /// Summarize, classify and analyze every transcribed message.
    ///
    /// Entries without a transcript are left alone.
    pub async fn summarize(&mut self, generator: &dyn NarrativeGenerator) {
        for entry in &mut self.entries {
            let Some(transcript) = entry.transcript.as_ref().and_then(Narrative::text) else {
                continue;
            };
            let transcript = transcript.to_string();

            entry.summary =
                Some(narrate(generator, "summary", &prompt::radio_summary(&transcript)).await);

            entry.sentiment = Some(
                match generator.generate(&prompt::radio_sentiment(&transcript)).await {
                    Ok(reply) => Sentiment::parse(&reply),
                    Err(err) => {
                        warn!(error = %err, "sentiment unavailable");
                        Sentiment::Unknown
                    }
                },
            );

            let context = RadioContext {
                lap_number: entry.lap_number,
                position: entry.position,
                session_name: self.session.clone(),
                team_name: self.team.clone(),
            };
            entry.analysis = Some(
                narrate(
                    generator,
                    "analysis",
                    &prompt::radio_analysis(&transcript, &context),
                )
                .await,
            );
        }
    }

    /// Render in the requested format.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        if format == OutputFormat::Json {
            return Ok(serde_json::to_string_pretty(self)?);
        }
        let mut out = String::new();
        let _ = writeln!(out, "{} ({}) - {}", self.driver, self.team, self.session);
        section(&mut out, &format!("Team radio ({})", self.policy));

        let mut table = Table::new(["Time", "Lap", "Pos", "Recording"]);
        for entry in &self.entries {
            table.row([
                clock(entry.date),
                entry.lap_label(),
                entry
                    .position
                    .map_or_else(|| "-".to_string(), |p| format!("P{p}")),
                entry.recording_url.clone(),
            ]);
        }
        out.push_str(&table.render(format == OutputFormat::Table));

        for entry in self
            .entries
            .iter()
            .filter(|e| e.transcript.is_some() || e.car.is_some())
        {
            let _ = writeln!(out, "\nLap {} - {}", entry.lap_label(), clock(entry.date));
            if let Some(car) = &entry.car {
                let _ = writeln!(out, "  Car: {}", telemetry(car));
            }
            for (label, narrative) in [
                ("Transcript", &entry.transcript),
                ("Summary", &entry.summary),
                ("Analysis", &entry.analysis),
            ] {
                if let Some(narrative) = narrative {
                    let _ = writeln!(out, "  {label}: {narrative}");
                }
            }
            if let Some(sentiment) = entry.sentiment {
                let _ = writeln!(out, "  Sentiment: {sentiment}");
            }
        }
        Ok(out)
    }
}

/// Render a listing of records.
///
/// `columns` names the table headers and `cells` produces one row per record.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_listing<T: Serialize, const N: usize>(
    records: &[T],
    columns: [&'static str; N],
    cells: impl Fn(&T) -> [String; N],
    format: OutputFormat,
) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(records)?);
    }
    let mut table = Table::new(columns);
    for record in records {
        table.row(cells(record));
    }
    Ok(table.render(format == OutputFormat::Table))
}

/// Meetings as `key, year, name, location`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_meetings(meetings: &[Meeting], format: OutputFormat) -> Result<String> {
    render_listing(
        meetings,
        ["Key", "Year", "Meeting", "Location"],
        |m| {
            [
                m.meeting_key.to_string(),
                m.year.to_string(),
                m.meeting_name.clone(),
                m.location.clone().or_else(|| m.country_name.clone()).unwrap_or_default(),
            ]
        },
        format,
    )
}

/// Sessions as `key, name, start`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_sessions(sessions: &[Session], format: OutputFormat) -> Result<String> {
    render_listing(
        sessions,
        ["Key", "Session", "Start"],
        |s| {
            [
                s.session_key.to_string(),
                s.session_name.clone(),
                s.date_start.to_string(),
            ]
        },
        format,
    )
}

/// Drivers as `number, name, team`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_drivers(drivers: &[Driver], format: OutputFormat) -> Result<String> {
    render_listing(
        drivers,
        ["No.", "Driver", "Team"],
        |d| {
            [
                d.driver_number.to_string(),
                d.full_name.clone(),
                d.team_name.clone(),
            ]
        },
        format,
    )
}

/// Team names, one per line.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_teams(teams: &[String], format: OutputFormat) -> Result<String> {
    render_listing(teams, ["Team"], |t| [t.clone()], format)
}

/// Position of the latest sample at or before `at`.
fn position_at(positions: &[PositionSample], at: EventTime) -> Option<u32> {
    let at = at.known()?;
    positions
        .iter()
        .filter(|s| s.date.known().is_some_and(|d| d <= at))
        .max_by_key(|s| s.date)
        .map(|s| s.position)
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{title}");
}

fn seconds(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}s"))
}

fn clock(time: EventTime) -> String {
    time.known()
        .map_or_else(|| "unknown".to_string(), |t| t.format("%H:%M:%S").to_string())
}

fn telemetry(car: &CarDataSample) -> String {
    let value = |v: Option<f64>, unit: &str| {
        v.map_or_else(|| "-".to_string(), |v| format!("{v:.0}{unit}"))
    };
    format!(
        "{} km/h, throttle {}, brake {}, gear {}, DRS {}",
        value(car.speed, ""),
        value(car.throttle, "%"),
        value(car.brake, ""),
        car.n_gear.map_or_else(|| "-".to_string(), |g| g.to_string()),
        car.drs.map_or_else(|| "-".to_string(), |d| d.to_string()),
    )
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Minimal column-aligned text table.
struct Table<const N: usize> {
    headers: [&'static str; N],
    rows: Vec<[String; N]>,
}

impl<const N: usize> Table<N> {
    fn new(headers: [&'static str; N]) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: [String; N]) {
        self.rows.push(cells);
    }

    /// Aligned columns with a header when `tabular`, otherwise one
    /// two-space-separated line per row.
    fn render(&self, tabular: bool) -> String {
        let mut out = String::new();
        if self.rows.is_empty() {
            out.push_str("  (none)\n");
            return out;
        }
        if !tabular {
            for row in &self.rows {
                let _ = writeln!(out, "  {}", row.join("  "));
            }
            return out;
        }

        let mut widths = self.headers.map(str::len);
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        let rule = widths.map(|w| "-".repeat(w));
        out.push_str(&aligned(&self.headers, &widths));
        out.push_str(&aligned(&rule, &widths));
        for row in &self.rows {
            out.push_str(&aligned(row, &widths));
        }
        out
    }
}

fn aligned<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect();
    format!("  {}\n", padded.join("  ").trim_end())
}
