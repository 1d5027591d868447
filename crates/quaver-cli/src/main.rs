//! quaver: evaluate time and pitch literals, render automation curves

mod config;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use quaver_core::{
    Controller, ControllerRecord, Pan, ParseMode, PitchValue, SessionConfig, TimeValue, Volume,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "quaver")]
#[command(about = "Musical time, pitch and automation curves", long_about = None)]
struct Cli {
    /// Sample rate in Hz (overrides the config file)
    #[arg(long, global = true)]
    rate: Option<f64>,

    /// Tempo in beats per minute (overrides the config file)
    #[arg(long, global = true)]
    bpm: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a time literal (3qn, 1.5b, 2.0s, 441samp)
    Time {
        literal: String,

        /// Read bare numbers as beats and reject seconds or samples
        #[arg(long)]
        strict: bool,
    },

    /// Describe a pitch (A4, C#5+10c, 440)
    Pitch { literal: String },

    /// Render a saved controller
    Curve {
        path: PathBuf,

        #[arg(value_enum, default_value_t = ParamKind::Volume)]
        param: ParamKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ParamKind {
    Volume,
    Pan,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded session
    fn session(&self, mut session: SessionConfig) -> anyhow::Result<SessionConfig> {
        if let Some(rate) = self.rate {
            session.sample_rate = rate;
        }
        if let Some(bpm) = self.bpm {
            session.bpm = bpm;
        }
        session.validate()?;
        Ok(session)
    }
}

fn run_time(session: &SessionConfig, literal: &str, strict: bool) -> anyhow::Result<()> {
    let mode = if strict { ParseMode::StrictBeats } else { ParseMode::Time };
    let time = TimeValue::parse(literal, mode, session.time_context()?)?;
    println!("{time}");
    println!("  samples: {}", time.to_samples());
    println!("  seconds: {}", time.to_seconds());
    println!("  beats:   {}", time.to_beats());
    Ok(())
}

fn run_pitch(session: &SessionConfig, literal: &str) -> anyhow::Result<()> {
    let pitch = PitchValue::parse(literal)?;
    let rate = session.time_context()?.rate;
    println!("{pitch}");
    println!("  note:   {}", pitch.to_note());
    println!("  freq:   {}", pitch.to_freq());
    println!("  period: {} samples", pitch.get_period(&rate));
    Ok(())
}

fn run_curve(session: &SessionConfig, path: &Path, param: ParamKind) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let record = ControllerRecord::from_json(&json)?;
    let context = session.time_context()?;
    let resolution = session.resolution;
    let curve = match param {
        ParamKind::Volume => {
            Controller::from_record(&record, Volume::default(), context)?.generate(resolution)?
        }
        ParamKind::Pan => Controller::from_record(&record, Pan, context)?.generate(resolution)?,
    };
    tracing::info!(controller = %record.name, points = curve.len(), "rendered curve");
    for (index, value) in curve {
        println!("{index}\t{value}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quaver=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let session = cli.session(config::load_config().session)?;

    match &cli.command {
        Command::Time { literal, strict } => run_time(&session, literal, *strict),
        Command::Pitch { literal } => run_pitch(&session, literal),
        Command::Curve { path, param } => run_curve(&session, path, *param),
    }
}
