//! `radiolap` - CLI for the session telemetry correlator
//!
//! This binary lists meetings, sessions and drivers, and reports a driver's
//! laps, positions, strategy and team radio for one session.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Parser;

use radiolap::cli::{
    AnalyzeCommand, Cli, Command, ConfigCommand, DriversCommand, OutputFormat, RadioCommand,
    SummaryCommand,
};
use radiolap::model::{drivers_of_team, team_names};
use radiolap::narrative::{
    narrate, prompt, OpenAiClient, RaceFacts, Retrying, WhisperClient,
};
use radiolap::report::{self, RadioLog, SessionReport};
use radiolap::{
    init_logging, Config, Narrative, NarrativeError, RequestContext, SessionGateway,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbosity());
    let Cli {
        config: config_path,
        command,
        ..
    } = cli;

    match command {
        Command::Meetings(cmd) => {
            let (_, mut gateway) = connect(config_path)?;
            let meetings = gateway.meetings(cmd.year).await?;
            emit(&report::render_meetings(&meetings, cmd.format)?);
        }
        Command::Sessions(cmd) => {
            let (_, mut gateway) = connect(config_path)?;
            let sessions = gateway.sessions(cmd.meeting).await?;
            emit(&report::render_sessions(&sessions, cmd.format)?);
        }
        Command::Teams(cmd) => {
            let (_, mut gateway) = connect(config_path)?;
            let drivers = gateway.drivers(cmd.session).await?;
            emit(&report::render_teams(&team_names(&drivers), cmd.format)?);
        }
        Command::Drivers(cmd) => {
            let (_, mut gateway) = connect(config_path)?;
            handle_drivers(&mut gateway, &cmd).await?;
        }
        Command::Analyze(cmd) => {
            let (config, mut gateway) = connect(config_path)?;
            handle_analyze(&mut gateway, &config, &cmd).await?;
        }
        Command::Radio(cmd) => {
            let (config, mut gateway) = connect(config_path)?;
            handle_radio(&mut gateway, &config, &cmd).await?;
        }
        Command::Summary(cmd) => {
            let (config, mut gateway) = connect(config_path)?;
            handle_summary(&mut gateway, &config, &cmd).await?;
        }
        Command::Config(cmd) => handle_config(config_path, cmd)?,
    }
    Ok(())
}

fn connect(config_path: Option<PathBuf>) -> Result<(Config, SessionGateway)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    let gateway =
        SessionGateway::from_config(&config.gateway).context("failed to build HTTP client")?;
    Ok((config, gateway))
}

fn emit(output: &str) {
    println!("{}", output.trim_end());
}

fn narrative_generator(config: &Config) -> Result<Retrying<OpenAiClient>, NarrativeError> {
    let client = OpenAiClient::from_config(&config.narrative)?;
    Ok(Retrying::new(client, config.narrative.retry_policy()))
}

async fn race_summary(config: &Config, facts: &RaceFacts) -> Narrative {
    match narrative_generator(config) {
        Ok(generator) => narrate(&generator, "race summary", &prompt::race_summary(facts)).await,
        Err(err) => Narrative::from_result("race summary", Err::<String, _>(err)),
    }
}

async fn handle_drivers(gateway: &mut SessionGateway, cmd: &DriversCommand) -> Result<()> {
    let drivers = gateway.drivers(cmd.session).await?;
    let drivers = match &cmd.team {
        Some(team) => drivers_of_team(&drivers, team).into_iter().cloned().collect(),
        None => drivers,
    };
    emit(&report::render_drivers(&drivers, cmd.format)?);
    Ok(())
}

async fn handle_analyze(
    gateway: &mut SessionGateway,
    config: &Config,
    cmd: &AnalyzeCommand,
) -> Result<()> {
    let context = RequestContext::load(gateway, cmd.selection.into()).await?;
    let mut session_report = SessionReport::build(&context, &cmd.correlation(&config.correlation));
    if cmd.narrate {
        let facts = RaceFacts::from_context(&context);
        session_report.set_analysis(race_summary(config, &facts).await);
    }
    emit(&session_report.render(cmd.format)?);
    Ok(())
}

async fn handle_radio(
    gateway: &mut SessionGateway,
    config: &Config,
    cmd: &RadioCommand,
) -> Result<()> {
    let context = RequestContext::load(gateway, cmd.selection.into()).await?;
    let mut log = RadioLog::build(&context, &cmd.correlation(&config.correlation));
    if cmd.telemetry {
        log.attach_telemetry(gateway, context.selection).await;
    }

    if cmd.needs_transcripts() {
        if !config.transcription.enabled {
            log.transcripts_unavailable(&"transcription is disabled in configuration");
        } else {
            match WhisperClient::from_config(&config.narrative, &config.transcription) {
                Ok(whisper) => log.transcribe(&whisper).await,
                Err(err) => log.transcripts_unavailable(&err),
            }
        }
    }
    if cmd.summarize {
        match narrative_generator(config) {
            Ok(generator) => log.summarize(&generator).await,
            Err(err) => log.summaries_unavailable(&err),
        }
    }

    emit(&log.render(cmd.format)?);
    Ok(())
}

async fn handle_summary(
    gateway: &mut SessionGateway,
    config: &Config,
    cmd: &SummaryCommand,
) -> Result<()> {
    let context = RequestContext::load(gateway, cmd.selection.into()).await?;
    let facts = RaceFacts::from_context(&context);
    let summary = race_summary(config, &facts).await;

    match cmd.format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "facts": facts, "summary": summary });
            emit(&serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain | OutputFormat::Table => {
            println!(
                "{} ({}) - {} {}",
                facts.driver_name, facts.team, facts.meeting, facts.session
            );
            println!();
            println!("{summary}");
        }
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config =
                Config::load_from(config_path).context("failed to load configuration")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }
        ConfigCommand::Path => {
            println!(
                "{}",
                config_path
                    .unwrap_or_else(Config::default_config_path)
                    .display()
            );
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn print_config(config: &Config) {
    let g = &config.gateway;
    let c = &config.correlation;
    let n = &config.narrative;
    let t = &config.transcription;

    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("[Gateway]");
    println!("  Base URL:           {}", g.base_url);
    println!("  Timeout (s):        {}", g.timeout_secs);
    println!("  Cache capacity:     {}", g.cache_capacity);
    println!("  User agent:         {}", g.user_agent);
    println!();
    println!("[Correlation]");
    println!("  Policy:             {}", c.policy);
    println!("  As-of direction:    {}", c.as_of_direction);
    println!(
        "  Nearest tolerance:  {}",
        c.nearest_tolerance_secs
            .map_or_else(|| "none".to_string(), |s| format!("{s}s"))
    );
    println!();
    println!("[Narrative]");
    println!("  Base URL:           {}", n.base_url);
    println!(
        "  API key:            {}",
        if n.api_key().is_some() { "set" } else { "not set" }
    );
    println!("  Model:              {}", n.model);
    println!("  Temperature:        {}", n.temperature);
    println!("  Max tokens:         {}", n.max_tokens);
    println!("  Timeout (s):        {}", n.timeout_secs);
    println!("  Max attempts:       {}", n.max_attempts);
    println!(
        "  Backoff (s):        x{} within {}-{}",
        n.backoff_multiplier_secs, n.backoff_min_secs, n.backoff_max_secs
    );
    println!();
    println!("[Transcription]");
    println!("  Enabled:            {}", t.enabled);
    println!("  Model:              {}", t.model);
}
