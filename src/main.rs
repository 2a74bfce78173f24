use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

mod aggregate;
mod config;
mod error;
mod geocode;
mod identity;
mod models;
mod normalize;
mod pipeline;
mod report;
mod spatial;
mod stats;
mod tables;

use config::Config;
use geocode::{LookupTableGeocoder, ResolvedLocationTable};
use pipeline::{Inputs, Pipeline, PipelineRun};
use spatial::{CountryTable, ImportedDistances};

#[derive(Parser)]
#[command(name = "narrative-geography")]
#[command(about = "Location analysis for oral-history narratives", long_about = None)]
struct Cli {
    /// TOML file with prefixes, destination and default input paths
    #[arg(long, global = true, env = "NARRATIVE_GEOGRAPHY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AnalysisInputs {
    /// Raw location/person table
    #[arg(long)]
    mentions: Option<PathBuf>,
    /// Manually corrected resolved-location table
    #[arg(long)]
    resolved: Option<PathBuf>,
    /// Distances computed by the GIS tool; haversine is used when absent
    #[arg(long)]
    distances: Option<PathBuf>,
    /// Per-point country classification
    #[arg(long)]
    countries: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the deduplicated address list for geocoding
    Normalize {
        #[arg(long)]
        mentions: Option<PathBuf>,
        #[arg(long, default_value = "addresses.csv")]
        out: PathBuf,
    },
    /// Join distinct addresses with a geocode lookup table
    Geocode {
        #[arg(long)]
        mentions: Option<PathBuf>,
        #[arg(long)]
        lookup: Option<PathBuf>,
        #[arg(long, default_value = "geolocations.csv")]
        out: PathBuf,
    },
    /// Export hub-and-spoke lines for the GIS tool
    Edges {
        #[arg(long)]
        mentions: Option<PathBuf>,
        #[arg(long)]
        resolved: Option<PathBuf>,
        #[arg(long, default_value = "edges.csv")]
        out: PathBuf,
    },
    /// Print aggregates and statistical tests
    Stats {
        #[command(flatten)]
        inputs: AnalysisInputs,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        inputs: AnalysisInputs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn require(flag: Option<PathBuf>, configured: &Option<PathBuf>, name: &str) -> anyhow::Result<PathBuf> {
    flag.or_else(|| configured.clone()).with_context(|| {
        format!("--{name} was not given and inputs.{name} is not set in the config file")
    })
}

fn load_inputs(config: &Config, mentions: &Path, resolved: &Path, countries: Option<&Path>) -> anyhow::Result<Inputs> {
    let mentions = tables::read_mentions(mentions, &config.prefixes)
        .with_context(|| format!("failed to load mentions from {}", mentions.display()))?;
    let resolved = ResolvedLocationTable::from_path(resolved)
        .with_context(|| format!("failed to load resolved locations from {}", resolved.display()))?;
    if resolved.is_empty() {
        warn!("resolved-location table is empty; every mention will be unresolved");
    }
    info!(
        mentions = mentions.len(),
        resolved = resolved.len(),
        "loaded analysis inputs"
    );
    let countries = countries
        .map(|path| {
            CountryTable::from_path(path)
                .with_context(|| format!("failed to load countries from {}", path.display()))
        })
        .transpose()?;

    Ok(Inputs {
        mentions,
        resolved,
        countries,
    })
}

fn analyze(config: Config, inputs: AnalysisInputs) -> anyhow::Result<(Pipeline, PipelineRun)> {
    let mentions = require(inputs.mentions, &config.inputs.mentions, "mentions")?;
    let resolved = require(inputs.resolved, &config.inputs.resolved, "resolved")?;
    let countries = inputs.countries.or_else(|| config.inputs.countries.clone());
    let distances = inputs.distances.or_else(|| config.inputs.distances.clone());
    let lookup = config.inputs.lookup.clone();

    let loaded = load_inputs(&config, &mentions, &resolved, countries.as_deref())?;
    let mut pipeline = Pipeline::new(config);
    if let Some(path) = lookup {
        let geocoder = LookupTableGeocoder::from_path(&path)
            .with_context(|| format!("failed to load geocode lookup from {}", path.display()))?;
        pipeline = pipeline.with_geocoder(Box::new(geocoder));
    }
    if let Some(path) = distances {
        let imported = ImportedDistances::from_path(&path)
            .with_context(|| format!("failed to load distances from {}", path.display()))?;
        pipeline = pipeline.with_distance_computer(Box::new(imported));
    }

    let run = pipeline.run(&loaded);
    Ok((pipeline, run))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "narrative_geography=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Normalize { mentions, out } => {
            let mentions = require(mentions, &config.inputs.mentions, "mentions")?;
            let raw = tables::read_mentions(&mentions, &config.prefixes)
                .with_context(|| format!("failed to load mentions from {}", mentions.display()))?;
            let pipeline = Pipeline::new(config);
            let normalized = pipeline.normalize(&raw);
            let people: std::collections::BTreeSet<_> =
                normalized.iter().map(|row| &row.person_id).collect();
            for person in people {
                debug!(
                    %person,
                    addresses = normalize::distinct_address_count(&normalized, person),
                    "distinct addresses"
                );
            }
            let addresses = normalize::distinct_addresses(&normalized);
            tables::write_addresses(&out, &addresses)?;
            println!("Wrote {} distinct addresses to {}.", addresses.len(), out.display());
        }
        Commands::Geocode {
            mentions,
            lookup,
            out,
        } => {
            let mentions = require(mentions, &config.inputs.mentions, "mentions")?;
            let lookup = require(lookup, &config.inputs.lookup, "lookup")?;
            let raw = tables::read_mentions(&mentions, &config.prefixes)
                .with_context(|| format!("failed to load mentions from {}", mentions.display()))?;
            let geocoder = LookupTableGeocoder::from_path(&lookup)
                .with_context(|| format!("failed to load geocode lookup from {}", lookup.display()))?;
            if geocoder.is_empty() {
                warn!("geocode lookup is empty; every address will lack coordinates");
            }
            info!(entries = geocoder.len(), "loaded geocode lookup");

            let pipeline = Pipeline::new(config).with_geocoder(Box::new(geocoder));
            let geolocated = pipeline.geocode(&pipeline.normalize(&raw));
            let unmatched = geolocated.iter().filter(|row| row.latitude.is_none()).count();
            tables::write_rows(&out, &geolocated)?;
            println!(
                "Wrote {} geolocated addresses ({} without coordinates) to {}.",
                geolocated.len(),
                unmatched,
                out.display()
            );
        }
        Commands::Edges {
            mentions,
            resolved,
            out,
        } => {
            let mentions = require(mentions, &config.inputs.mentions, "mentions")?;
            let resolved = require(resolved, &config.inputs.resolved, "resolved")?;
            let loaded = load_inputs(&config, &mentions, &resolved, None)?;
            let pipeline = Pipeline::new(config);
            let run = pipeline.run(&loaded);
            spatial::write_edges(&out, &run.edges)?;
            println!(
                "Wrote {} edges to {} ({}).",
                run.edges.len(),
                out.display(),
                pipeline.config().destination.name
            );
        }
        Commands::Stats { inputs, json } => {
            let (_, run) = analyze(config, inputs)?;

            if json {
                let document = report::StatsDocument::from_run(&run);
                println!("{}", serde_json::to_string_pretty(&document)?);
                return Ok(());
            }

            if run.aggregates.loc_by_name.is_empty() {
                println!("No people in the analytic subpopulation.");
                return Ok(());
            }

            println!("Mean locations per person:");
            for (gender, summary) in &run.aggregates.locations.by_gender {
                println!("- {} {:.2} (n={})", gender, summary.mean, summary.count);
            }
            for (occupation, summary) in &run.aggregates.locations.by_occupation {
                println!("- {} {:.2} (n={})", occupation, summary.mean, summary.count);
            }
            for ((gender, occupation), summary) in &run.aggregates.locations.by_category {
                println!(
                    "- {} {:.2} (n={})",
                    models::category_label(*gender, *occupation),
                    summary.mean,
                    summary.count
                );
            }

            println!("Tests:");
            println!("- {}", report::t_test_line("by gender", &run.tests.by_gender));
            println!("- {}", report::t_test_line("by occupation", &run.tests.by_occupation));
            println!("- {}", report::anova_line("by gender and occupation", &run.tests.by_category));
        }
        Commands::Report { inputs, out } => {
            let (pipeline, run) = analyze(config, inputs)?;
            let report = report::build_report(
                &run,
                &pipeline.config().destination.name,
                chrono::Utc::now(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
