// THEORY:
// A single court usually shows up more than once: in a tile, in one or two of
// that tile's quadrants, and sometimes again in a neighbouring tile that caught
// its edge. The `ProximityMerger` collapses those repeats into one detection.
//
// Key architectural principles:
// 1.  **Incremental**: Detections are fed in one at a time, in grid order, and the
//     set is valid after every step. There is no separate clustering pass.
// 2.  **Merge by Averaging**: When a new detection lands within the threshold of
//     an existing one, the existing entry moves to the midpoint of the two. The
//     set does not grow.
// 3.  **Swappable Strategy**: The default `FirstMatchMerger` merges into the
//     first entry in insertion order that is close enough. It is greedy and
//     order-dependent, so the result is a best-effort deduplication rather than
//     a minimal clustering. `NearestMatchMerger` merges into the closest entry
//     instead. Both sit behind the same trait so the orchestrator never changes.

use serde::{Deserialize, Serialize};

use crate::core_modules::geo_math::Coordinate;
use crate::core_modules::geo_math::geo_math::great_circle_distance_meters;

/// Default merge distance in meters.
pub const DEFAULT_PROXIMITY_METERS: f64 = 200.0;

/// A believed real-world court location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub latitude: f64,
    pub longitude: f64,
}

impl Detection {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    fn distance_to(&self, other: &Detection) -> f64 {
        great_circle_distance_meters(&self.coordinate(), &other.coordinate())
    }

    fn absorb(&mut self, other: &Detection) {
        let mid = self.coordinate().midpoint(&other.coordinate());
        self.latitude = mid.latitude;
        self.longitude = mid.longitude;
    }
}

impl From<Coordinate> for Detection {
    fn from(coordinate: Coordinate) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        }
    }
}

/// The ordered result of a scan.
pub type DetectionSet = Vec<Detection>;

/// Builds a deduplicated detection set one detection at a time.
pub trait ProximityMerger: Send {
    /// Merges `detection` into an existing entry closer than `threshold_meters`,
    /// or appends it.
    fn add(&mut self, detection: Detection, threshold_meters: f64);

    fn detections(&self) -> &[Detection];

    /// Hands over the accumulated set, leaving the merger empty.
    fn take_detections(&mut self) -> DetectionSet;
}

/// Which merge rule a scan uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    #[default]
    FirstMatch,
    NearestMatch,
}

impl MergeStrategy {
    pub fn build(self) -> Box<dyn ProximityMerger> {
        match self {
            MergeStrategy::FirstMatch => Box::new(FirstMatchMerger::new()),
            MergeStrategy::NearestMatch => Box::new(NearestMatchMerger::new()),
        }
    }
}

/// Merges into the first entry, in insertion order, that is close enough.
#[derive(Debug, Default, Clone)]
pub struct FirstMatchMerger {
    detections: DetectionSet,
}

impl FirstMatchMerger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProximityMerger for FirstMatchMerger {
    fn add(&mut self, detection: Detection, threshold_meters: f64) {
        if let Some(existing) = self
            .detections
            .iter_mut()
            .find(|existing| existing.distance_to(&detection) < threshold_meters)
        {
            existing.absorb(&detection);
            return;
        }
        self.detections.push(detection);
    }

    fn detections(&self) -> &[Detection] {
        &self.detections
    }

    fn take_detections(&mut self) -> DetectionSet {
        std::mem::take(&mut self.detections)
    }
}

/// Merges into the closest entry within the threshold.
#[derive(Debug, Default, Clone)]
pub struct NearestMatchMerger {
    detections: DetectionSet,
}

impl NearestMatchMerger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProximityMerger for NearestMatchMerger {
    fn add(&mut self, detection: Detection, threshold_meters: f64) {
        let nearest = self
            .detections
            .iter()
            .enumerate()
            .map(|(index, existing)| (index, existing.distance_to(&detection)))
            .filter(|(_, distance)| *distance < threshold_meters)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((index, _)) => self.detections[index].absorb(&detection),
            None => self.detections.push(detection),
        }
    }

    fn detections(&self) -> &[Detection] {
        &self.detections
    }

    fn take_detections(&mut self) -> DetectionSet {
        std::mem::take(&mut self.detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(origin: Coordinate, north_m: f64, east_m: f64) -> Detection {
        origin.offset_by_meters(north_m, east_m).into()
    }

    const ORIGIN: Coordinate = Coordinate {
        latitude: 41.9028,
        longitude: 12.4964,
    };

    #[test]
    fn nearby_detection_moves_entry_to_midpoint() {
        let mut merger = FirstMatchMerger::new();
        let first = at(ORIGIN, 0.0, 0.0);
        let second = at(ORIGIN, 0.0, 90.0);

        merger.add(first, 200.0);
        merger.add(second, 200.0);

        assert_eq!(merger.detections().len(), 1);
        let merged = merger.detections()[0];
        assert!((merged.latitude - (first.latitude + second.latitude) / 2.0).abs() < 1e-12);
        assert!((merged.longitude - (first.longitude + second.longitude) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn distant_detection_grows_the_set() {
        let mut merger = FirstMatchMerger::new();
        merger.add(at(ORIGIN, 0.0, 0.0), 200.0);
        merger.add(at(ORIGIN, 250.0, 0.0), 200.0);
        merger.add(at(ORIGIN, 0.0, 250.0), 200.0);
        assert_eq!(merger.detections().len(), 3);
    }

    #[test]
    fn threshold_is_strict() {
        let mut merger = FirstMatchMerger::new();
        merger.add(at(ORIGIN, 0.0, 0.0), 100.0);
        merger.add(at(ORIGIN, 100.5, 0.0), 100.0);
        assert_eq!(merger.detections().len(), 2);
    }

    #[test]
    fn first_match_is_not_nearest_match() {
        // Entries at 0 m and 350 m east; a new detection at 190 m is within 200 m
        // of both but closer to the second.
        let seed = [at(ORIGIN, 0.0, 0.0), at(ORIGIN, 0.0, 350.0)];
        let incoming = at(ORIGIN, 0.0, 190.0);

        let mut first = FirstMatchMerger::new();
        let mut nearest = NearestMatchMerger::new();
        for d in seed {
            first.add(d, 200.0);
            nearest.add(d, 200.0);
        }
        first.add(incoming, 200.0);
        nearest.add(incoming, 200.0);

        assert_eq!(first.detections()[0], Detection::from(seed[0].coordinate().midpoint(&incoming.coordinate())));
        assert_eq!(first.detections()[1], seed[1]);
        assert_eq!(nearest.detections()[0], seed[0]);
        assert_eq!(nearest.detections()[1], Detection::from(seed[1].coordinate().midpoint(&incoming.coordinate())));
    }

    #[test]
    fn take_detections_empties_the_merger() {
        let mut merger = MergeStrategy::default().build();
        merger.add(at(ORIGIN, 0.0, 0.0), 200.0);
        assert_eq!(merger.take_detections().len(), 1);
        assert!(merger.detections().is_empty());
    }

    #[test]
    fn strategy_names_are_kebab_case() {
        let parsed: MergeStrategy = serde_json::from_str("\"nearest-match\"").unwrap();
        assert_eq!(parsed, MergeStrategy::NearestMatch);
    }
}
