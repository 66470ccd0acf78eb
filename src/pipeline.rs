// THEORY:
// The `pipeline` module is the top-level API of the scanner. It composes every
// core module into one end-to-end operation: take a bounding box, cover it with
// a grid, fetch imagery for every cell, classify it, refine the positives, merge
// the duplicates, and hand back a single deduplicated set of court locations.
//
// Key architectural principles:
// 1.  **Explicit Collaborators**: The imagery source, the classifier and the
//     progress sink are injected at construction. Nothing is global, so a scan
//     can be driven end to end with in-memory fakes.
// 2.  **One Barrier, Then Sequential**: Fetching is the only concurrent stage.
//     Once every tile has resolved, classification, refinement and merging walk
//     the grid strictly in order, so the merge result is reproducible.
// 3.  **Two Tiers of Failure**: A tile that fails to arrive is skipped. Anything
//     else that goes wrong aborts the whole request with a `ScanError`; there are
//     no partial results.
// 4.  **Observable State**: The orchestrator records which stage it is in
//     (`ScanState`), ending in `Done` or `Failed`.

use log::{debug, error, info};
use serde::Serialize;

use crate::core_modules::classifier::{Classifier, DEFAULT_CLASSIFICATION_THRESHOLD};
use crate::core_modules::geo_math::{BoundingBox, Coordinate};
use crate::core_modules::grid_tiler::{DEFAULT_CELL_SIZE_METERS, GridTiler};
use crate::core_modules::image_source::{ImageSource, TileRequest};
use crate::core_modules::proximity_merger::{DEFAULT_PROXIMITY_METERS, DetectionSet, MergeStrategy};
use crate::core_modules::quadrant_refiner::{DEFAULT_REFINEMENT_DEPTH, QuadrantRefiner, max_refinement_depth};
use crate::core_modules::tile_fetcher::TileFetcher;
use crate::error::ScanError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::request::{ScanRequest, ScanResponse};

const DEFAULT_MAX_CELLS: usize = 10_000;

/// Tunable parameters for one scan. Fixed for the duration of the scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Side length of a grid cell in meters.
    pub cell_size_meters: f64,
    /// Detections closer than this are merged.
    pub proximity_meters: f64,
    /// Scores at or above this count as a court.
    pub classification_threshold: f64,
    /// How many times positive tiles are split into quadrants.
    pub refinement_depth: u32,
    /// Cap on simultaneous imagery requests. `None` fetches every cell at once.
    pub max_concurrent_fetches: Option<usize>,
    /// Regions needing more cells than this are rejected.
    pub max_cells: usize,
    pub merge_strategy: MergeStrategy,
    pub tile_request: TileRequest,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cell_size_meters: DEFAULT_CELL_SIZE_METERS,
            proximity_meters: DEFAULT_PROXIMITY_METERS,
            classification_threshold: DEFAULT_CLASSIFICATION_THRESHOLD,
            refinement_depth: DEFAULT_REFINEMENT_DEPTH,
            max_concurrent_fetches: None,
            max_cells: DEFAULT_MAX_CELLS,
            merge_strategy: MergeStrategy::default(),
            tile_request: TileRequest::default(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if !(self.cell_size_meters.is_finite() && self.cell_size_meters > 0.0) {
            return Err(ScanError::Input(format!(
                "cell size must be a positive number of meters, got {}",
                self.cell_size_meters
            )));
        }
        if !(self.proximity_meters.is_finite() && self.proximity_meters >= 0.0) {
            return Err(ScanError::Input(format!(
                "proximity threshold must be a non-negative number of meters, got {}",
                self.proximity_meters
            )));
        }
        if !(0.0..=1.0).contains(&self.classification_threshold) {
            return Err(ScanError::Input(format!(
                "classification threshold must lie in [0, 1], got {}",
                self.classification_threshold
            )));
        }
        if self.refinement_depth == 0 {
            return Err(ScanError::Input("refinement depth must be at least 1".into()));
        }
        if self.max_concurrent_fetches == Some(0) {
            return Err(ScanError::Input("fetch concurrency limit must be at least 1".into()));
        }
        if self.tile_request.width == 0 || self.tile_request.height == 0 {
            return Err(ScanError::Input("tile size must be non-zero".into()));
        }
        let max_depth = max_refinement_depth(self.tile_request.width, self.tile_request.height);
        if self.refinement_depth > max_depth {
            return Err(ScanError::Input(format!(
                "refinement depth {} is deeper than a {}x{} tile can be split (at most {})",
                self.refinement_depth, self.tile_request.width, self.tile_request.height, max_depth
            )));
        }
        Ok(())
    }
}

/// The stage a scan is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Tiling,
    Fetching,
    Classifying,
    Refining,
    Merging,
    Done,
    Failed,
}

/// The result of a successful scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub detections: DetectionSet,
    /// Number of grid cells covering the region.
    pub cells: usize,
    /// Number of cells whose tile arrived and decoded.
    pub tiles_fetched: usize,
    /// Number of full tiles that classified positive.
    pub positive_tiles: usize,
}

/// The classification of a single location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointPrediction {
    pub latitude: f64,
    pub longitude: f64,
    pub score: f64,
    pub is_court: bool,
}

/// Checks that a box is finite, on the globe, away from the poles, and has its
/// corners the right way round.
pub fn validate_bounding_box(bbox: &BoundingBox) -> Result<BoundingBox, ScanError> {
    for (name, corner) in [("top-left", bbox.top_left), ("bottom-right", bbox.bottom_right)] {
        validate_coordinate(name, &corner)?;
    }
    if bbox.top_left.latitude < bbox.bottom_right.latitude {
        return Err(ScanError::Input(format!(
            "top-left latitude {} is south of bottom-right latitude {}",
            bbox.top_left.latitude, bbox.bottom_right.latitude
        )));
    }
    if bbox.top_left.longitude > bbox.bottom_right.longitude {
        return Err(ScanError::Input(format!(
            "top-left longitude {} is east of bottom-right longitude {}",
            bbox.top_left.longitude, bbox.bottom_right.longitude
        )));
    }
    Ok(*bbox)
}

fn validate_coordinate(name: &str, coordinate: &Coordinate) -> Result<(), ScanError> {
    let Coordinate { latitude, longitude } = *coordinate;
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(ScanError::Input(format!("{} coordinate is not a finite number", name)));
    }
    if latitude <= -90.0 || latitude >= 90.0 {
        return Err(ScanError::Input(format!("{} latitude {} is out of range", name, latitude)));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ScanError::Input(format!("{} longitude {} is out of range", name, longitude)));
    }
    Ok(())
}

/// Drives a scan from bounding box to detection set.
pub struct ScanOrchestrator<S, C, P> {
    source: S,
    classifier: C,
    progress: P,
    state: ScanState,
}

impl<S, C, P> ScanOrchestrator<S, C, P>
where
    S: ImageSource,
    C: Classifier,
    P: ProgressSink,
{
    pub fn new(source: S, classifier: C, progress: P) -> Self {
        Self {
            source,
            classifier,
            progress,
            state: ScanState::Idle,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Scans a region. Input problems are rejected before anything is fetched;
    /// any later fault fails the whole scan and is reported to the progress sink.
    pub async fn scan(&mut self, bbox: &BoundingBox, config: &ScanConfig) -> Result<ScanReport, ScanError> {
        self.state = ScanState::Idle;
        config.validate()?;
        let bbox = validate_bounding_box(bbox)?;

        let tiler = GridTiler::new(config.cell_size_meters);
        let estimate = tiler.estimate_cell_count(&bbox);
        if estimate > config.max_cells {
            return Err(ScanError::Input(format!(
                "region needs about {} cells, more than the limit of {}",
                estimate, config.max_cells
            )));
        }

        info!(
            "scanning ({:.6}, {:.6}) to ({:.6}, {:.6}) with {} m cells",
            bbox.top_left.latitude,
            bbox.top_left.longitude,
            bbox.bottom_right.latitude,
            bbox.bottom_right.longitude,
            config.cell_size_meters
        );

        match self.run(&bbox, &tiler, config).await {
            Ok(report) => {
                self.transition(ScanState::Done);
                info!(
                    "scan done: {} court(s) from {}/{} tiles, {} positive",
                    report.detections.len(),
                    report.tiles_fetched,
                    report.cells,
                    report.positive_tiles
                );
                self.progress.notify(ProgressEvent::ScanComplete {
                    count: report.detections.len(),
                });
                Ok(report)
            }
            Err(err) => {
                self.transition(ScanState::Failed);
                error!("scan failed: {}", err);
                self.progress.notify(ProgressEvent::ScanError {
                    message: err.public_message(),
                });
                Err(err)
            }
        }
    }

    async fn run(&mut self, bbox: &BoundingBox, tiler: &GridTiler, config: &ScanConfig) -> Result<ScanReport, ScanError> {
        // --- 1. Tiling ---
        self.transition(ScanState::Tiling);
        let cells = tiler.tile(bbox);
        let centers: Vec<Coordinate> = cells.iter().map(|cell| cell.center).collect();
        debug!("grid has {} cells", cells.len());

        // --- 2. Fetching (single barrier) ---
        self.transition(ScanState::Fetching);
        self.progress.notify(ProgressEvent::FetchingStarted { tiles: cells.len() });
        let fetcher = TileFetcher::new(config.tile_request, config.max_concurrent_fetches);
        let tiles = fetcher.fetch_all(&self.source, &centers).await;
        if tiles.len() != cells.len() {
            return Err(ScanError::ProcessingFault(format!(
                "fetched {} tiles for {} cells",
                tiles.len(),
                cells.len()
            )));
        }

        // --- 3. Classify, refine and merge in grid order ---
        self.progress.notify(ProgressEvent::ScanningStarted);
        let refiner = QuadrantRefiner::new(config.classification_threshold, config.refinement_depth);
        let mut merger = config.merge_strategy.build();
        let mut tiles_fetched = 0;
        let mut positive_tiles = 0;

        for (cell, tile) in cells.iter().zip(tiles.iter()) {
            let Some(image) = tile else {
                continue;
            };
            tiles_fetched += 1;

            self.transition(ScanState::Classifying);
            let score = self
                .classifier
                .classify(image)
                .map_err(ScanError::ClassificationFault)?;
            if !score.is_positive(config.classification_threshold) {
                continue;
            }
            positive_tiles += 1;

            self.transition(ScanState::Merging);
            merger.add(cell.center.into(), config.proximity_meters);

            self.transition(ScanState::Refining);
            let refined = refiner.refine(&self.classifier, image, cell)?;

            self.transition(ScanState::Merging);
            for center in refined {
                merger.add(center.into(), config.proximity_meters);
            }
        }

        Ok(ScanReport {
            detections: merger.take_detections(),
            cells: cells.len(),
            tiles_fetched,
            positive_tiles,
        })
    }

    /// Serves one boundary request: validates it, applies its overrides on top
    /// of `base`, scans, and shapes the outcome for the caller.
    pub async fn handle_request(&mut self, request: &ScanRequest, base: &ScanConfig) -> ScanResponse {
        let bbox = match request.bounding_box() {
            Ok(bbox) => bbox,
            Err(err) => return ScanResponse::failure(&err),
        };
        let config = request.apply_overrides(base);
        match self.scan(&bbox, &config).await {
            Ok(report) => ScanResponse::found(report.detections),
            Err(err) => ScanResponse::failure(&err),
        }
    }

    /// Fetches and classifies the single tile centered on `coordinate`.
    pub async fn predict_point(&self, coordinate: Coordinate, config: &ScanConfig) -> Result<PointPrediction, ScanError> {
        config.validate()?;
        validate_coordinate("requested", &coordinate)?;

        let fetcher = TileFetcher::new(config.tile_request, None);
        let image = fetcher
            .fetch_one(&self.source, 0, coordinate)
            .await
            .ok_or_else(|| ScanError::ProcessingFault("could not fetch image for the provided coordinates".into()))?;
        let score = self
            .classifier
            .classify(&image)
            .map_err(ScanError::ClassificationFault)?;

        Ok(PointPrediction {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            score: score.value(),
            is_court: score.is_positive(config.classification_threshold),
        })
    }

    fn transition(&mut self, next: ScanState) {
        if self.state != next {
            debug!("scan state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
