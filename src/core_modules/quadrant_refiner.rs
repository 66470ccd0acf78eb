// THEORY:
// A positive tile only says "there is a court somewhere in these 140 meters."
// The `QuadrantRefiner` narrows that down. It cuts the tile's raster into four
// equal quadrants, works out where each quadrant's center sits on the ground,
// and asks the classifier about each quadrant on its own. Every quadrant that
// still scores positive becomes an extra, more tightly placed detection.
//
// Key architectural principles:
// 1.  **Fixed Quadrant Order**: Quadrants are always visited top-left, top-right,
//     bottom-left, bottom-right. Together with grid order this keeps the merge
//     deterministic.
// 2.  **Geometry From the Parent**: A quadrant's center is the parent center moved
//     a quarter of the footprint north or south and east or west, with the
//     longitude step taken at the parent's latitude.
// 3.  **Bounded Depth**: By default refinement stops after one split. A deeper
//     setting re-splits positive quadrants, halving the footprint each level.

use image::DynamicImage;
use log::debug;

use crate::core_modules::classifier::Classifier;
use crate::core_modules::geo_math::Coordinate;
use crate::core_modules::grid_tiler::GridCell;
use crate::error::ScanError;

/// Default number of split levels.
pub const DEFAULT_REFINEMENT_DEPTH: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TopLeft,
        Quadrant::TopRight,
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
    ];

    /// +1 for the northern half, -1 for the southern half.
    fn north_sign(self) -> f64 {
        match self {
            Quadrant::TopLeft | Quadrant::TopRight => 1.0,
            Quadrant::BottomLeft | Quadrant::BottomRight => -1.0,
        }
    }

    /// +1 for the eastern half, -1 for the western half.
    fn east_sign(self) -> f64 {
        match self {
            Quadrant::TopRight | Quadrant::BottomRight => 1.0,
            Quadrant::TopLeft | Quadrant::BottomLeft => -1.0,
        }
    }

    /// Ground center of this quadrant of a square footprint.
    pub fn center(self, parent: Coordinate, footprint_meters: f64) -> Coordinate {
        let quarter = footprint_meters / 4.0;
        parent.offset_by_meters(self.north_sign() * quarter, self.east_sign() * quarter)
    }
}

/// Cuts an image into four quadrants along its midlines, in `Quadrant::ALL` order.
/// With odd dimensions the right and bottom quadrants take the extra pixel.
pub fn split_quadrants(image: &DynamicImage) -> Result<[DynamicImage; 4], ScanError> {
    let (width, height) = (image.width(), image.height());
    if width < 2 || height < 2 {
        return Err(ScanError::ProcessingFault(format!(
            "cannot split a {}x{} tile into quadrants",
            width, height
        )));
    }
    let (mid_w, mid_h) = (width / 2, height / 2);
    Ok([
        image.crop_imm(0, 0, mid_w, mid_h),
        image.crop_imm(mid_w, 0, width - mid_w, mid_h),
        image.crop_imm(0, mid_h, mid_w, height - mid_h),
        image.crop_imm(mid_w, mid_h, width - mid_w, height - mid_h),
    ])
}

/// Deepest refinement a `width` x `height` tile supports. Each level halves the
/// image and a split needs at least 2 px per side.
pub fn max_refinement_depth(width: u32, height: u32) -> u32 {
    match width.min(height) {
        0 => 0,
        side => side.ilog2(),
    }
}

/// Re-examines positive tiles at sub-cell resolution.
#[derive(Debug, Clone)]
pub struct QuadrantRefiner {
    threshold: f64,
    depth: u32,
}

impl QuadrantRefiner {
    pub fn new(threshold: f64, depth: u32) -> Self {
        Self { threshold, depth }
    }

    /// Classifies the quadrants of a positive tile and returns the ground center
    /// of every quadrant that scores positive, in visiting order.
    pub fn refine<C: Classifier + ?Sized>(
        &self,
        classifier: &C,
        tile: &DynamicImage,
        cell: &GridCell,
    ) -> Result<Vec<Coordinate>, ScanError> {
        let mut found = Vec::new();
        self.refine_level(classifier, tile, cell.center, cell.size_meters, self.depth, &mut found)?;
        debug!(
            "refined tile at ({:.6}, {:.6}): {} positive quadrant(s)",
            cell.center.latitude,
            cell.center.longitude,
            found.len()
        );
        Ok(found)
    }

    fn refine_level<C: Classifier + ?Sized>(
        &self,
        classifier: &C,
        image: &DynamicImage,
        center: Coordinate,
        footprint_meters: f64,
        remaining: u32,
        found: &mut Vec<Coordinate>,
    ) -> Result<(), ScanError> {
        if remaining == 0 {
            return Ok(());
        }

        let quadrants = split_quadrants(image)?;
        for (quadrant, sub_image) in Quadrant::ALL.into_iter().zip(quadrants.iter()) {
            let score = classifier
                .classify(sub_image)
                .map_err(ScanError::ClassificationFault)?;
            if !score.is_positive(self.threshold) {
                continue;
            }

            let sub_center = quadrant.center(center, footprint_meters);
            found.push(sub_center);
            self.refine_level(classifier, sub_image, sub_center, footprint_meters / 2.0, remaining - 1, found)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::ClassificationScore;
    use crate::core_modules::geo_math::geo_math::great_circle_distance_meters;
    use anyhow::anyhow;
    use image::{GenericImageView, Rgb, RgbImage};
    use std::cell::Cell;

    /// Scores an image by its mean red channel.
    struct RedClassifier {
        calls: Cell<usize>,
    }

    impl RedClassifier {
        fn new() -> Self {
            Self { calls: Cell::new(0) }
        }
    }

    impl Classifier for RedClassifier {
        fn classify(&self, image: &DynamicImage) -> anyhow::Result<ClassificationScore> {
            self.calls.set(self.calls.get() + 1);
            let rgb = image.to_rgb8();
            let sum: u64 = rgb.pixels().map(|p| p.0[0] as u64).sum();
            ClassificationScore::new(sum as f64 / ((rgb.width() * rgb.height()) as f64 * 255.0))
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _image: &DynamicImage) -> anyhow::Result<ClassificationScore> {
            Err(anyhow!("model crashed"))
        }
    }

    fn cell() -> GridCell {
        GridCell {
            center: Coordinate::new(45.0, 7.0),
            size_meters: 140.0,
        }
    }

    /// 8x8 tile, red only in the given quadrant.
    fn tile_with_red(quadrant: Quadrant) -> DynamicImage {
        let (x0, y0) = match quadrant {
            Quadrant::TopLeft => (0, 0),
            Quadrant::TopRight => (4, 0),
            Quadrant::BottomLeft => (0, 4),
            Quadrant::BottomRight => (4, 4),
        };
        let mut img = RgbImage::new(8, 8);
        for y in y0..y0 + 4 {
            for x in x0..x0 + 4 {
                img.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn quadrant_centers_average_to_the_parent_center() {
        let parent = Coordinate::new(-23.5505, -46.6333);
        let centers: Vec<Coordinate> = Quadrant::ALL.iter().map(|q| q.center(parent, 140.0)).collect();
        let lat = centers.iter().map(|c| c.latitude).sum::<f64>() / 4.0;
        let lon = centers.iter().map(|c| c.longitude).sum::<f64>() / 4.0;

        assert!((lat - parent.latitude).abs() < 1e-12);
        assert!((lon - parent.longitude).abs() < 1e-12);
    }

    #[test]
    fn quadrant_centers_point_in_the_right_directions() {
        let parent = cell().center;
        let top_left = Quadrant::TopLeft.center(parent, 140.0);
        let bottom_right = Quadrant::BottomRight.center(parent, 140.0);

        assert!(top_left.latitude > parent.latitude && top_left.longitude < parent.longitude);
        assert!(bottom_right.latitude < parent.latitude && bottom_right.longitude > parent.longitude);

        let diagonal = great_circle_distance_meters(&parent, &top_left);
        assert!((diagonal - (35.0f64 * 35.0 * 2.0).sqrt()).abs() < 0.05, "got {diagonal}");
    }

    #[test]
    fn split_follows_fixed_order_and_odd_sizes() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(5, 7));
        let quadrants = split_quadrants(&img).unwrap();
        let dims: Vec<(u32, u32)> = quadrants.iter().map(|q| q.dimensions()).collect();
        assert_eq!(dims, vec![(2, 3), (3, 3), (2, 4), (3, 4)]);
    }

    #[test]
    fn tiny_tiles_cannot_be_split() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(1, 8));
        assert!(matches!(split_quadrants(&img), Err(ScanError::ProcessingFault(_))));
    }

    #[test]
    fn max_depth_splits_down_to_single_pixels() {
        assert_eq!(max_refinement_depth(1000, 1000), 9);
        assert_eq!(max_refinement_depth(8, 20), 3);
        assert_eq!(max_refinement_depth(1, 64), 0);

        let solid = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 0])));
        let found = QuadrantRefiner::new(0.5, 3).refine(&RedClassifier::new(), &solid, &cell()).unwrap();
        assert_eq!(found.len(), 4 + 16 + 64);

        let too_deep = QuadrantRefiner::new(0.5, 4).refine(&RedClassifier::new(), &solid, &cell());
        assert!(matches!(too_deep, Err(ScanError::ProcessingFault(_))));
    }

    #[test]
    fn only_positive_quadrants_become_detections() {
        let refiner = QuadrantRefiner::new(0.5, 1);
        let classifier = RedClassifier::new();

        for quadrant in Quadrant::ALL {
            let found = refiner.refine(&classifier, &tile_with_red(quadrant), &cell()).unwrap();
            assert_eq!(found, vec![quadrant.center(cell().center, 140.0)]);
        }
        assert_eq!(classifier.calls.get(), 16);
    }

    #[test]
    fn depth_two_splits_positive_quadrants_again() {
        // Solid red: every quadrant and every sub-quadrant is positive.
        let solid = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 0])));
        let classifier = RedClassifier::new();

        let found = QuadrantRefiner::new(0.5, 2).refine(&classifier, &solid, &cell()).unwrap();

        assert_eq!(found.len(), 4 + 16);
        assert_eq!(classifier.calls.get(), 20);
        // The first sub-quadrant sits inside the top-left quadrant, 17.5 m further out.
        let top_left = Quadrant::TopLeft.center(cell().center, 140.0);
        assert_eq!(found[0], top_left);
        assert_eq!(found[1], Quadrant::TopLeft.center(top_left, 70.0));
    }

    #[test]
    fn classifier_errors_become_classification_faults() {
        let result = QuadrantRefiner::new(0.5, 1).refine(&FailingClassifier, &tile_with_red(Quadrant::TopLeft), &cell());
        assert!(matches!(result, Err(ScanError::ClassificationFault(_))));
    }
}
