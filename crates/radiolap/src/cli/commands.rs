//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::align::AsOfDirection;
use crate::config::CorrelationConfig;
use crate::context::Selection;
use crate::correlate::CorrelationPolicy;

/// List the meetings of a season.
#[derive(Debug, Args)]
pub struct MeetingsCommand {
    /// Season year
    #[arg(short, long)]
    pub year: i32,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// List the sessions of a meeting.
#[derive(Debug, Args)]
pub struct SessionsCommand {
    /// Meeting key
    #[arg(short, long)]
    pub meeting: u32,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// List the teams entered in a session.
#[derive(Debug, Args)]
pub struct TeamsCommand {
    /// Session key
    #[arg(short, long)]
    pub session: u32,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// List the drivers of a session.
#[derive(Debug, Args)]
pub struct DriversCommand {
    /// Session key
    #[arg(short, long)]
    pub session: u32,

    /// Only drivers of this team
    #[arg(short, long)]
    pub team: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Session and driver selection shared by the per-driver commands.
#[derive(Debug, Clone, Copy, Args)]
pub struct SelectionArgs {
    /// Session key
    #[arg(short, long)]
    pub session: u32,

    /// Driver (car) number
    #[arg(short, long)]
    pub driver: u32,
}

impl From<SelectionArgs> for Selection {
    fn from(args: SelectionArgs) -> Self {
        Self {
            session_key: args.session,
            driver_number: args.driver,
        }
    }
}

/// Full per-driver session report.
#[derive(Debug, Args)]
pub struct AnalyzeCommand {
    /// Session and driver
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// How radio messages are placed on laps (overrides configuration)
    #[arg(short, long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// How position samples are joined to laps (overrides configuration)
    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,

    /// Append a generated race analysis
    #[arg(long)]
    pub narrate: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

impl AnalyzeCommand {
    /// Correlation settings with command-line overrides applied.
    #[must_use]
    pub fn correlation(&self, base: &CorrelationConfig) -> CorrelationConfig {
        CorrelationConfig {
            policy: self.policy.map_or(base.policy, Into::into),
            as_of_direction: self.direction.map_or(base.as_of_direction, Into::into),
            ..base.clone()
        }
    }
}

/// Team radio placed on laps.
#[derive(Debug, Args)]
pub struct RadioCommand {
    /// Session and driver
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// How radio messages are placed on laps (overrides configuration)
    #[arg(short, long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Transcribe each recording
    #[arg(short, long)]
    pub transcribe: bool,

    /// Summarize, classify and analyze each message (implies --transcribe)
    #[arg(long)]
    pub summarize: bool,

    /// Attach the car telemetry sample recorded at each message
    #[arg(long)]
    pub telemetry: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

impl RadioCommand {
    /// Correlation settings with command-line overrides applied.
    #[must_use]
    pub fn correlation(&self, base: &CorrelationConfig) -> CorrelationConfig {
        CorrelationConfig {
            policy: self.policy.map_or(base.policy, Into::into),
            ..base.clone()
        }
    }

    /// Whether recordings need transcribing.
    #[must_use]
    pub fn needs_transcripts(&self) -> bool {
        self.transcribe || self.summarize
    }
}

/// Generated race summary for one driver.
#[derive(Debug, Args)]
pub struct SummaryCommand {
    /// Session and driver
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Correlation policy argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Radio must fall within a lap's start/end window
    Containment,
    /// Radio goes to the lap with the closest start
    NearestStart,
}

impl From<PolicyArg> for CorrelationPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Containment => Self::Containment,
            PolicyArg::NearestStart => Self::NearestStart,
        }
    }
}

/// As-of join direction argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    /// Latest lap start at or before the sample
    Backward,
    /// Earliest lap start at or after the sample
    Forward,
    /// Closest lap start
    Nearest,
}

impl From<DirectionArg> for AsOfDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Backward => Self::Backward,
            DirectionArg::Forward => Self::Forward,
            DirectionArg::Nearest => Self::Nearest,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
