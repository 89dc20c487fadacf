//! DebateSim CLI - Simulated Formal Debates
//!
//! A command-line tool for running six-speaker formal debates between
//! AI personas, judged by a bias-resistant multi-layer verdict engine.

use clap::Parser;
use colored::Colorize;
use debatesim_core::{
    BioPersonaSource, Config, DebateEvent, DebateRunner, OpenAiClient, Side, SpeakerProfile,
};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "debatesim",
    version,
    about = "Simulated formal debates with a multi-layer verdict engine",
    long_about = "Runs a six-speech two-sided debate between AI personas over an \
                  OpenAI-compatible API, then judges it with anonymized dual-pass \
                  panels, a mechanical claim tally, and rubric scoring."
)]
struct Cli {
    /// The motion to debate, e.g. "This house would ban targeted advertising"
    #[arg(value_name = "MOTION")]
    motion: String,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to a JSON lineup file (array of six speaker profiles);
    /// a built-in demonstration lineup is used when omitted
    #[arg(short, long, value_name = "FILE")]
    lineup: Option<PathBuf>,

    /// Seed for the POI acceptance dice (overrides the config file)
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Write the full report (transcript + verdict) as JSON
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let lineup = match &cli.lineup {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Vec<SpeakerProfile>>(&content)?
        }
        None => demo_lineup(),
    };

    // Print header
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - Formal Debate", "DebateSim".bold())
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Motion:".bold(), cli.motion.bright_white());
    println!();
    println!("{}", "Speakers:".bold());
    for speaker in &lineup {
        println!(
            "  {}. {} ({})",
            speaker.position,
            speaker.name.bright_cyan(),
            side_color(speaker.side)
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());

    let client = OpenAiClient::new(&api_base, &api_key)?;
    let mut runner = DebateRunner::new(config, Box::new(client), Box::new(BioPersonaSource))
        .with_callback(create_console_callback());

    let report = runner.run(&cli.motion, lineup).await?;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  VERDICT".bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    for line in report.verdict.summary.lines() {
        println!("  {line}");
    }
    if !report.verdict.completeness.all() {
        println!();
        println!(
            "  {}",
            "Note: some judging units degraded; see the report for details.".yellow()
        );
    }
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    if let Some(path) = &cli.output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn side_color(side: Side) -> colored::ColoredString {
    match side {
        Side::Proposition => side.display_name().green(),
        Side::Opposition => side.display_name().red(),
    }
}

/// Create a callback that prints debate events to the console.
fn create_console_callback() -> Box<dyn Fn(DebateEvent) + Send + Sync> {
    Box::new(move |event| match event {
        DebateEvent::DebateStarted { .. } => {}
        DebateEvent::PersonasReady => {
            println!("{}", "All six personas prepared.".dimmed());
        }
        DebateEvent::SpeechStarted {
            position,
            speaker,
            side,
        } => {
            println!();
            println!(
                "{} {} {} {}",
                "▶".bright_cyan(),
                format!("Speech {position}:").bold(),
                speaker.bright_cyan().bold(),
                format!("({})", side.display_name()).yellow()
            );
        }
        DebateEvent::PoiExchange { from, accepted, .. } => {
            let status = if accepted {
                "accepted".green()
            } else {
                "waved off".dimmed()
            };
            println!("    {} POI from {} — {}", "✋".yellow(), from.bright_cyan(), status);
        }
        DebateEvent::SpeechCompleted {
            word_count,
            poi_count,
            ..
        } => {
            println!(
                "    {}",
                format!("{word_count} words, {poi_count} POIs").dimmed()
            );
        }
        DebateEvent::FrameworkExtracted { term_count } => {
            println!(
                "    {}",
                format!("Definitional framework set ({term_count} key terms)").dimmed()
            );
        }
        DebateEvent::ContestationExtracted {
            accepts,
            silent_divergence,
        } => {
            let status = if silent_divergence {
                "silently diverges".red().to_string()
            } else if accepts {
                "accepted".to_string()
            } else {
                "contested".to_string()
            };
            println!("    {}", format!("Definitions {status}").dimmed());
        }
        DebateEvent::JudgingStarted => {
            println!();
            println!("{}", "─".repeat(70).dimmed());
            println!("{}", "Judging...".bold());
        }
        DebateEvent::VerdictReached {
            winner,
            margin,
            contested,
        } => {
            let flag = if contested { " (contested)" } else { "" };
            println!(
                "{} {} by a {} margin{}",
                "Winner:".bold(),
                winner.display_name().bright_green().bold(),
                margin.label(),
                flag
            );
        }
    })
}

/// Built-in lineup used when no lineup file is given.
fn demo_lineup() -> Vec<SpeakerProfile> {
    let speakers = [
        (
            "winston", "Winston Albright", Side::Proposition,
            "A former trade union organizer turned member of parliament, known for \
             blunt, evidence-heavy speeches and a deep suspicion of untested technology.",
        ),
        (
            "margaret", "Margaret Osei", Side::Opposition,
            "A health economist who spent a decade running hospital systems, fond of \
             dry wit and pointed cost-benefit arguments.",
        ),
        (
            "tobias", "Tobias Lindqvist", Side::Proposition,
            "A safety engineer and author of two books on automation failures, \
             methodical, never raises his voice, lethal with a counter-example.",
        ),
        (
            "amara", "Amara Diallo", Side::Opposition,
            "A human rights barrister with a flair for rhetorical escalation and \
             a habit of turning the opposition's own evidence against them.",
        ),
        (
            "rosa", "Rosa Carvalho", Side::Proposition,
            "A veteran science journalist who closes cases the way she closes \
             stories, by making the stakes personal and concrete.",
        ),
        (
            "edmund", "Edmund Hartley", Side::Opposition,
            "A retired appellate judge, famously even-handed, who summarizes both \
             sides better than they summarize themselves before dismantling one.",
        ),
    ];

    speakers
        .iter()
        .enumerate()
        .map(|(i, (id, name, side, bio))| {
            SpeakerProfile::new(*id, *name, *side, (i + 1) as u8, *bio)
        })
        .collect()
}
