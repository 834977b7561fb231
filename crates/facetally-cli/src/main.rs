use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facetally_core::{match_descriptor, EuclideanMatcher, ProfileEngine, StoredProfileFormat};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod config;
mod roster;

use config::Config;

#[derive(Parser)]
#[command(name = "facetally", about = "Face profile enrollment and matching tool")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update a face profile from captured descriptors
    Enroll {
        /// JSON array of descriptors or {vector, score?, capturedAt?} objects
        #[arg(long)]
        captures: PathBuf,
        /// Previously stored profile to merge into
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Write the new profile here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Identify a descriptor against an employee roster
    Match {
        /// JSON array with one 128-value descriptor
        #[arg(long)]
        query: PathBuf,
        /// JSON array of {id, name?, active?, faceData?} records
        #[arg(long)]
        roster: PathBuf,
    },
    /// Describe a stored profile
    Inspect {
        #[arg(long)]
        profile: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Enroll {
            captures,
            profile,
            out,
        } => {
            let raw = read_json(&captures)?;
            let existing = profile.as_deref().map(read_json).transpose()?;

            let engine = ProfileEngine::new(config.tuning.clone());
            let built = engine
                .build(&raw, existing.as_ref())
                .context("building face profile")?;
            tracing::info!(
                captures = built.stats.capture_count,
                consistency = built.stats.consistency_score,
                "profile built"
            );

            let rendered = serde_json::to_string_pretty(&built)?;
            match out {
                Some(path) => std::fs::write(&path, rendered + "\n")
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{rendered}"),
            }
        }
        Commands::Match { query, roster } => {
            let raw_query = read_json(&query)?;
            let raw_roster = std::fs::read_to_string(&roster)
                .with_context(|| format!("reading {}", roster.display()))?;
            let employees = roster::parse_roster(&raw_roster)
                .with_context(|| format!("parsing roster {}", roster.display()))?;

            let matcher = EuclideanMatcher::new(&config.tuning);
            let found = match_descriptor(&matcher, &raw_query, &employees)
                .context("preparing query descriptor")?;

            let Some(found) = found else {
                println!("no match");
                return Ok(ExitCode::FAILURE);
            };
            let result = json!({
                "id": found.employee.id,
                "name": found.employee.name,
                "distance": found.distance,
                "confidence": found.confidence(),
                "threshold": matcher.threshold(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Inspect { profile } => {
            let stored = read_json(&profile)?;
            let engine = ProfileEngine::new(config.tuning.clone());
            let candidates = engine.comparison_vectors(Some(&stored));
            let format = StoredProfileFormat::parse(Some(&stored));

            let summary = json!({
                "format": format.kind(),
                "hasCentroid": format.centroid().is_some(),
                "storedCaptures": format.into_captures().len(),
                "comparisonVectors": candidates.len(),
                "stats": stored.get("stats").cloned().unwrap_or(Value::Null),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing JSON in {}", path.display()))
}
