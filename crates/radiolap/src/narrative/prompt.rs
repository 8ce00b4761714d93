//! Prompt construction for the narrative service.

use std::fmt;

use serde::Serialize;

use crate::context::RequestContext;
use crate::stats::{self, StintSummary};

/// A system + user message pair with optional sampling overrides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    /// System message.
    pub system: String,
    /// User message.
    pub user: String,
    /// Sampling temperature; the client default applies when `None`.
    pub temperature: Option<f64>,
    /// Completion token limit; the client default applies when `None`.
    pub max_tokens: Option<u32>,
}

impl Prompt {
    /// Create a prompt using the client's defaults.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Override the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the completion token limit.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Headline numbers fed into the race summary prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceFacts {
    /// Driver's full name.
    pub driver_name: String,
    /// Team name.
    pub team: String,
    /// Session name.
    pub session: String,
    /// Meeting name.
    pub meeting: String,
    /// Laps recorded.
    pub total_laps: usize,
    /// Last classified position.
    pub final_position: Option<u32>,
    /// Sum of position swings.
    pub position_changes: u32,
    /// Fastest lap in seconds, `0.0` when unknown.
    pub fastest_lap: f64,
    /// Tire stints.
    pub tire_strategy: Vec<StintSummary>,
    /// More than one weather sample was recorded.
    pub weather_changed: bool,
    /// Radio messages in the session.
    pub radio_messages: usize,
}

impl RaceFacts {
    /// Derive the facts from a loaded request.
    #[must_use]
    pub fn from_context(context: &RequestContext) -> Self {
        Self {
            driver_name: context.driver.full_name.clone(),
            team: context.driver.team_name.clone(),
            session: context.session.session_name.clone(),
            meeting: context.meeting.meeting_name.clone(),
            total_laps: context.total_laps(),
            final_position: stats::final_position(&context.positions),
            position_changes: stats::position_change_count(&context.positions),
            fastest_lap: stats::fastest_lap(&context.laps),
            tire_strategy: stats::stint_summaries(&context.stints, &context.laps),
            weather_changed: context.weather.len() > 1,
            radio_messages: context.radio.len(),
        }
    }
}

/// Where a radio message sits in the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RadioContext {
    /// Lap the message was placed on.
    pub lap_number: Option<u32>,
    /// Position around the message.
    pub position: Option<u32>,
    /// Session name.
    pub session_name: String,
    /// Team name.
    pub team_name: String,
}

/// Tone of a radio message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Sentiment {
    /// Upbeat.
    Positive,
    /// Matter-of-fact.
    Neutral,
    /// Frustrated or alarmed.
    Negative,
    /// The reply was not one of the above.
    Unknown,
}

impl Sentiment {
    /// Parse a one-word model reply. Surrounding whitespace and punctuation are ignored.
    #[must_use]
    pub fn parse(reply: &str) -> Self {
        let word = reply.trim().trim_matches(|c: char| !c.is_alphanumeric());
        match word.to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "neutral" => Self::Neutral,
            "negative" => Self::Negative,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive => write!(f, "Positive"),
            Self::Neutral => write!(f, "Neutral"),
            Self::Negative => write!(f, "Negative"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

fn or_unknown<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "Unknown".to_string(), |v| v.to_string())
}

fn tire_strategy(stints: &[StintSummary]) -> String {
    if stints.is_empty() {
        return "none recorded".to_string();
    }
    stints
        .iter()
        .map(|s| format!("stint {} {} ({} laps)", s.stint_number, s.compound, s.length))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Prompt for the full race analysis.
#[must_use]
pub fn race_summary(facts: &RaceFacts) -> Prompt {
    let final_position = facts
        .final_position
        .map_or_else(|| "N/A".to_string(), |p| p.to_string());
    let user = format!(
        "Create a comprehensive race summary for {driver} ({team}) during the {session} session of the {meeting}.\n\
         \n\
         Key data:\n\
         - Total laps: {laps}\n\
         - Final position: {final_position}\n\
         - Position changes: {changes}\n\
         - Fastest lap: {fastest:.3}s\n\
         - Tire strategy: {tires}\n\
         - Weather changes: {weather}\n\
         - Radio messages: {radio}\n\
         \n\
         Provide a detailed analysis covering:\n\
         1. Overall performance assessment\n\
         2. Tire strategy effectiveness\n\
         3. Position change patterns\n\
         4. Key moments from radio communications\n\
         5. Weather impact (if relevant)",
        driver = facts.driver_name,
        team = facts.team,
        session = facts.session,
        meeting = facts.meeting,
        laps = facts.total_laps,
        changes = facts.position_changes,
        fastest = facts.fastest_lap,
        tires = tire_strategy(&facts.tire_strategy),
        weather = facts.weather_changed,
        radio = facts.radio_messages,
    );
    Prompt::new(
        "You are an expert F1 analyst. Provide detailed race summaries.",
        user,
    )
    .temperature(0.7)
    .max_tokens(500)
}

/// Prompt for a one or two sentence summary of a radio transcript.
#[must_use]
pub fn radio_summary(transcript: &str) -> Prompt {
    Prompt::new(
        "You are a Formula 1 analyst summarizing team radio communications. \
         Be concise and highlight key information.",
        format!("Summarize this F1 team radio message in 1-2 sentences: {transcript}"),
    )
    .temperature(0.7)
    .max_tokens(100)
}

/// Prompt asking for a single-word sentiment; parse the reply with [`Sentiment::parse`].
#[must_use]
pub fn radio_sentiment(transcript: &str) -> Prompt {
    Prompt::new(
        "Analyze the sentiment of this F1 team radio message. \
         Respond with only one word: Positive, Neutral, or Negative.",
        format!("Message: {transcript}"),
    )
    .temperature(0.3)
    .max_tokens(10)
}

/// Prompt for a contextual analysis of one radio message.
#[must_use]
pub fn radio_analysis(transcript: &str, context: &RadioContext) -> Prompt {
    let user = format!(
        "Analyze this Formula 1 team radio message with the given context:\n\
         \n\
         Message: {transcript}\n\
         \n\
         Context:\n\
         - Lap: {lap}\n\
         - Position: {position}\n\
         - Session: {session}\n\
         - Team: {team}\n\
         \n\
         Provide analysis covering:\n\
         1. Key information conveyed\n\
         2. Likely purpose/strategy\n\
         3. Urgency level (Low/Medium/High)\n\
         4. Suggested team response",
        lap = or_unknown(context.lap_number),
        position = or_unknown(context.position),
        session = context.session_name,
        team = context.team_name,
    );
    Prompt::new(
        "You are a Formula 1 analyst summarizing team radio communications.",
        user,
    )
    .max_tokens(200)
}
