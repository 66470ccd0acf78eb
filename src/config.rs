// THEORY:
// Runtime settings come from three layers, later ones winning: built-in
// defaults, an optional TOML file, then environment variables. The file format
// is a set of private, all-optional `*ConfigFile` structs that reject unknown
// keys; `FinderConfig` is what the rest of the binary sees, fully resolved and
// validated.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core_modules::image_source::{DEFAULT_STATIC_MAP_URL, TileRequest};
use crate::core_modules::preprocess::PreprocessOptions;
use crate::core_modules::proximity_merger::MergeStrategy;
use crate::pipeline::ScanConfig;

pub const CONFIG_PATH_ENV: &str = "COURT_FINDER_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FinderConfigFile {
    api_key: Option<String>,
    static_map_url: Option<String>,
    request_timeout_secs: Option<u64>,
    model_path: Option<PathBuf>,
    scan: Option<ScanConfigFile>,
    imagery: Option<ImageryConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ScanConfigFile {
    cell_size_meters: Option<f64>,
    proximity_meters: Option<f64>,
    classification_threshold: Option<f64>,
    refinement_depth: Option<u32>,
    max_concurrent_fetches: Option<usize>,
    max_cells: Option<usize>,
    merge_strategy: Option<MergeStrategy>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ImageryConfigFile {
    zoom: Option<u8>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreprocessConfigFile {
    input_width: Option<u32>,
    input_height: Option<u32>,
    attribution_crop_fraction: Option<f64>,
}

/// Runtime configuration for the scanner binary.
#[derive(Debug, Clone)]
pub struct FinderConfig {
    pub api_key: Option<String>,
    pub static_map_url: String,
    pub request_timeout: Option<Duration>,
    pub model_path: Option<PathBuf>,
    pub scan: ScanConfig,
    pub preprocess: PreprocessOptions,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self::from_file(FinderConfigFile::default())
    }
}

impl FinderConfig {
    /// Loads the config file at `path` (or named by `COURT_FINDER_CONFIG`), then
    /// applies environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok().filter(|p| !p.trim().is_empty());
        let path = path.map(Path::to_path_buf).or_else(|| env_path.map(PathBuf::from));
        let file_cfg = match path {
            Some(path) => read_config_file(&path)?,
            None => FinderConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env_from(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses TOML text without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: FinderConfigFile = toml::from_str(raw).context("invalid config")?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FinderConfigFile) -> Self {
        let defaults = ScanConfig::default();
        let scan_file = file.scan.unwrap_or_default();
        let imagery = file.imagery.unwrap_or_default();
        let tile_request = TileRequest {
            zoom: imagery.zoom.unwrap_or(defaults.tile_request.zoom),
            width: imagery.width.unwrap_or(defaults.tile_request.width),
            height: imagery.height.unwrap_or(defaults.tile_request.height),
        };
        let scan = ScanConfig {
            cell_size_meters: scan_file.cell_size_meters.unwrap_or(defaults.cell_size_meters),
            proximity_meters: scan_file.proximity_meters.unwrap_or(defaults.proximity_meters),
            classification_threshold: scan_file
                .classification_threshold
                .unwrap_or(defaults.classification_threshold),
            refinement_depth: scan_file.refinement_depth.unwrap_or(defaults.refinement_depth),
            max_concurrent_fetches: scan_file.max_concurrent_fetches.or(defaults.max_concurrent_fetches),
            max_cells: scan_file.max_cells.unwrap_or(defaults.max_cells),
            merge_strategy: scan_file.merge_strategy.unwrap_or(defaults.merge_strategy),
            tile_request,
        };

        let preprocess_defaults = PreprocessOptions::default();
        let preprocess_file = file.preprocess.unwrap_or_default();
        let preprocess = PreprocessOptions {
            input_width: preprocess_file.input_width.unwrap_or(preprocess_defaults.input_width),
            input_height: preprocess_file.input_height.unwrap_or(preprocess_defaults.input_height),
            attribution_crop_fraction: preprocess_file
                .attribution_crop_fraction
                .unwrap_or(preprocess_defaults.attribution_crop_fraction),
        };

        Self {
            api_key: file.api_key,
            static_map_url: file
                .static_map_url
                .unwrap_or_else(|| DEFAULT_STATIC_MAP_URL.to_string()),
            request_timeout: file.request_timeout_secs.map(Duration::from_secs),
            model_path: file.model_path,
            scan,
            preprocess,
        }
    }

    /// Applies `GOOGLE_MAPS_API_KEY` and the `COURT_FINDER_*` overrides, reading
    /// variables through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = var("GOOGLE_MAPS_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = var("COURT_FINDER_STATIC_MAP_URL") {
            self.static_map_url = url;
        }
        if let Some(path) = var("COURT_FINDER_MODEL_PATH") {
            self.model_path = Some(PathBuf::from(path));
        }
        if let Some(value) = var("COURT_FINDER_CELL_SIZE") {
            self.scan.cell_size_meters = parse_env("COURT_FINDER_CELL_SIZE", &value)?;
        }
        if let Some(value) = var("COURT_FINDER_PROXIMITY") {
            self.scan.proximity_meters = parse_env("COURT_FINDER_PROXIMITY", &value)?;
        }
        if let Some(value) = var("COURT_FINDER_THRESHOLD") {
            self.scan.classification_threshold = parse_env("COURT_FINDER_THRESHOLD", &value)?;
        }
        if let Some(value) = var("COURT_FINDER_MAX_CONCURRENCY") {
            self.scan.max_concurrent_fetches = Some(parse_env("COURT_FINDER_MAX_CONCURRENCY", &value)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        if self.preprocess.input_width == 0 || self.preprocess.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if !(0.0..1.0).contains(&self.preprocess.attribution_crop_fraction) {
            return Err(anyhow!(
                "attribution crop fraction must lie in [0, 1), got {}",
                self.preprocess.attribution_crop_fraction
            ));
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} has an invalid value '{}'", key, value))
}

fn read_config_file(path: &Path) -> Result<FinderConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = FinderConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.scan, ScanConfig::default());
        assert_eq!(cfg.preprocess, PreprocessOptions::default());
        assert_eq!(cfg.static_map_url, DEFAULT_STATIC_MAP_URL);
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = FinderConfig::from_toml_str(
            r#"
            model_path = "models/court.onnx"
            request_timeout_secs = 30

            [scan]
            cell_size_meters = 75.0
            classification_threshold = 0.6
            merge_strategy = "nearest-match"
            max_concurrent_fetches = 16

            [imagery]
            zoom = 20
            width = 500
            height = 400
            "#,
        )
        .unwrap();

        assert_eq!(cfg.scan.cell_size_meters, 75.0);
        assert_eq!(cfg.scan.classification_threshold, 0.6);
        assert_eq!(cfg.scan.merge_strategy, MergeStrategy::NearestMatch);
        assert_eq!(cfg.scan.max_concurrent_fetches, Some(16));
        assert_eq!(cfg.scan.proximity_meters, 200.0);
        assert_eq!(cfg.scan.tile_request, TileRequest { zoom: 20, width: 500, height: 400 });
        assert_eq!(cfg.model_path, Some(PathBuf::from("models/court.onnx")));
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(FinderConfig::from_toml_str("[scan]\ncell_size_meters = -5.0").is_err());
        assert!(FinderConfig::from_toml_str("[preprocess]\nattribution_crop_fraction = 1.0").is_err());
        assert!(FinderConfig::from_toml_str("unknown_key = 1").is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GOOGLE_MAPS_API_KEY", "abc123"),
            ("COURT_FINDER_CELL_SIZE", "90"),
            ("COURT_FINDER_MAX_CONCURRENCY", "8"),
            ("COURT_FINDER_PROXIMITY", "   "),
        ]);
        let mut cfg = FinderConfig::default();
        cfg.apply_env_from(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.api_key.as_deref(), Some("abc123"));
        assert_eq!(cfg.scan.cell_size_meters, 90.0);
        assert_eq!(cfg.scan.max_concurrent_fetches, Some(8));
        assert_eq!(cfg.scan.proximity_meters, 200.0);
    }

    #[test]
    fn unparsable_environment_value_is_an_error() {
        let mut cfg = FinderConfig::default();
        let result = cfg.apply_env_from(|key| (key == "COURT_FINDER_THRESHOLD").then(|| "high".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn load_reads_an_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scan]\nproximity_meters = 120.0").unwrap();

        let cfg = FinderConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.scan.proximity_meters, 120.0);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = FinderConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
