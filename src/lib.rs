// THEORY:
// This file is the main entry point for the `court_finder` library crate.
// It exposes the `ScanOrchestrator` and its configuration and result types as
// the high-level interface for scanning a region for courts. The components the
// orchestrator is assembled from live in `core_modules` and are public as well,
// so a caller can tile, fetch, refine or merge on its own when it needs to.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod request;

pub use crate::core_modules::classifier::{ClassificationScore, Classifier};
pub use crate::core_modules::geo_math::{BoundingBox, Coordinate};
pub use crate::core_modules::image_source::{ImageSource, StaticMapSource, TileRequest};
pub use crate::core_modules::proximity_merger::{Detection, DetectionSet, MergeStrategy};
#[cfg(feature = "backend-tract")]
pub use crate::core_modules::tract_classifier::TractClassifier;
pub use crate::error::ScanError;
pub use crate::pipeline::{PointPrediction, ScanConfig, ScanOrchestrator, ScanReport, ScanState};
pub use crate::progress::{ChannelProgressSink, LogProgressSink, ProgressEvent, ProgressSink};
pub use crate::request::{ScanRequest, ScanResponse};
