// THEORY:
// The shapes a transport layer exchanges with the scanner. A request carries
// the four corner numbers of a bounding box, any of which may be missing from
// the wire, plus optional per-request overrides. A response is either the list
// of court locations or a single error message.

use serde::{Deserialize, Serialize};

use crate::core_modules::geo_math::{BoundingBox, Coordinate};
use crate::core_modules::proximity_merger::Detection;
use crate::error::ScanError;
use crate::pipeline::ScanConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub lat_top_left: Option<f64>,
    pub lon_top_left: Option<f64>,
    pub lat_bottom_right: Option<f64>,
    pub lon_bottom_right: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_size_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proximity_meters: Option<f64>,
}

impl ScanRequest {
    pub fn from_corners(top_left: Coordinate, bottom_right: Coordinate) -> Self {
        Self {
            lat_top_left: Some(top_left.latitude),
            lon_top_left: Some(top_left.longitude),
            lat_bottom_right: Some(bottom_right.latitude),
            lon_bottom_right: Some(bottom_right.longitude),
            ..Default::default()
        }
    }

    /// Assembles the bounding box, rejecting missing or non-finite fields.
    /// Range and orientation checks happen when the scan starts.
    pub fn bounding_box(&self) -> Result<BoundingBox, ScanError> {
        let field = |value: Option<f64>, name: &str| -> Result<f64, ScanError> {
            match value {
                Some(v) if v.is_finite() => Ok(v),
                Some(v) => Err(ScanError::Input(format!("{} is not a finite number: {}", name, v))),
                None => Err(ScanError::Input(
                    "Please provide top-left and bottom-right coordinates".to_string(),
                )),
            }
        };
        Ok(BoundingBox::new(
            Coordinate::new(
                field(self.lat_top_left, "lat_top_left")?,
                field(self.lon_top_left, "lon_top_left")?,
            ),
            Coordinate::new(
                field(self.lat_bottom_right, "lat_bottom_right")?,
                field(self.lon_bottom_right, "lon_bottom_right")?,
            ),
        ))
    }

    /// The scan configuration for this request: `base` with any overrides applied.
    pub fn apply_overrides(&self, base: &ScanConfig) -> ScanConfig {
        let mut config = base.clone();
        if let Some(cell_size) = self.cell_size_meters {
            config.cell_size_meters = cell_size;
        }
        if let Some(proximity) = self.proximity_meters {
            config.proximity_meters = proximity;
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScanResponse {
    Found { tennis_courts: Vec<Detection> },
    Failed { error: String },
}

impl ScanResponse {
    pub fn found(detections: Vec<Detection>) -> Self {
        ScanResponse::Found {
            tennis_courts: detections,
        }
    }

    pub fn failure(err: &ScanError) -> Self {
        ScanResponse::Failed {
            error: err.public_message(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanResponse::Found { .. })
    }
}
