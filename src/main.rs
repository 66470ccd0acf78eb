// Command-line runner for the court finder.
//
// Loads configuration (file, then environment, then flags), builds the static
// map imagery source and the classifier backend, and runs either a region scan
// or a single-point prediction. Results are printed to stdout as JSON; progress
// and diagnostics go to the log.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};

use court_finder::config::FinderConfig;
use court_finder::{
    Classifier, Coordinate, LogProgressSink, MergeStrategy, ScanOrchestrator, ScanRequest, StaticMapSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scan satellite imagery of a region for tennis courts")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "COURT_FINDER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the region between two corners and print the courts found.
    Scan {
        /// North-west corner as LAT,LON.
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        top_left: Coordinate,

        /// South-east corner as LAT,LON.
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        bottom_right: Coordinate,

        /// Grid cell side length in meters.
        #[arg(long)]
        cell_size: Option<f64>,

        /// Merge detections closer than this many meters.
        #[arg(long)]
        proximity: Option<f64>,

        /// Minimum classifier score for a court.
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum simultaneous imagery requests.
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Number of quadrant refinement levels.
        #[arg(long)]
        refinement_depth: Option<u32>,

        /// Merge into the nearest detection instead of the first close one.
        #[arg(long)]
        nearest_match: bool,
    },
    /// Classify the single tile centered on a location.
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

fn parse_coordinate(raw: &str) -> Result<Coordinate, String> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{}'", raw))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude '{}'", lat))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("invalid longitude '{}'", lon))?;
    Ok(Coordinate::new(lat, lon))
}

fn build_source(config: &FinderConfig) -> Result<StaticMapSource> {
    let api_key = config
        .api_key
        .clone()
        .context("no imagery API key configured; set GOOGLE_MAPS_API_KEY or api_key in the config file")?;
    let mut source = StaticMapSource::new(api_key).with_base_url(config.static_map_url.clone());
    if let Some(timeout) = config.request_timeout {
        source = source.with_timeout(timeout);
    }
    Ok(source)
}

#[cfg(feature = "backend-tract")]
fn build_classifier(config: &FinderConfig) -> Result<Box<dyn Classifier>> {
    let model_path = config
        .model_path
        .as_ref()
        .context("no model configured; set COURT_FINDER_MODEL_PATH or model_path in the config file")?;
    let classifier = court_finder::TractClassifier::load(model_path, config.preprocess)?;
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "backend-tract"))]
fn build_classifier(_config: &FinderConfig) -> Result<Box<dyn Classifier>> {
    Err(anyhow!(
        "no classifier backend compiled in; rebuild with --features backend-tract"
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = FinderConfig::load(args.config.as_deref())?;
    let source = build_source(&config)?;
    let classifier = build_classifier(&config)?;
    let mut orchestrator = ScanOrchestrator::new(source, classifier, LogProgressSink);

    match args.command {
        Command::Scan {
            top_left,
            bottom_right,
            cell_size,
            proximity,
            threshold,
            max_concurrency,
            refinement_depth,
            nearest_match,
        } => {
            let mut base = config.scan.clone();
            if let Some(threshold) = threshold {
                base.classification_threshold = threshold;
            }
            if let Some(limit) = max_concurrency {
                base.max_concurrent_fetches = Some(limit);
            }
            if let Some(depth) = refinement_depth {
                base.refinement_depth = depth;
            }
            if nearest_match {
                base.merge_strategy = MergeStrategy::NearestMatch;
            }

            let request = ScanRequest {
                cell_size_meters: cell_size,
                proximity_meters: proximity,
                ..ScanRequest::from_corners(top_left, bottom_right)
            };
            let response = orchestrator.handle_request(&request, &base).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.is_success() {
                bail!("scan failed");
            }
        }
        Command::Predict { lat, lon } => {
            let prediction = orchestrator
                .predict_point(Coordinate::new(lat, lon), &config.scan)
                .await?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
    }
    Ok(())
}
