//! Command-line interface for radiolap.
//!
//! This module provides the CLI structure for the `radiolap` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AnalyzeCommand, ConfigCommand, DirectionArg, DriversCommand, MeetingsCommand, OutputFormat,
    PolicyArg, RadioCommand, SelectionArgs, SessionsCommand, SummaryCommand, TeamsCommand,
};

use crate::logging::Verbosity;

/// radiolap - Put F1 team radio on the lap it was heard
///
/// Fetches session timing data, places team radio and position changes on
/// laps, and derives per-driver race statistics.
#[derive(Debug, Parser)]
#[command(name = "radiolap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the meetings of a season
    Meetings(MeetingsCommand),

    /// List the sessions of a meeting
    Sessions(SessionsCommand),

    /// List the teams entered in a session
    Teams(TeamsCommand),

    /// List the drivers of a session
    Drivers(DriversCommand),

    /// Report laps, positions, strategy and radio for one driver
    Analyze(AnalyzeCommand),

    /// Show a driver's team radio by lap
    Radio(RadioCommand),

    /// Generate a race summary for one driver
    Summary(SummaryCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}
