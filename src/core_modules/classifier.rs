// THEORY:
// The `Classifier` is the scanner's only source of judgement: given a raster it
// answers "how likely is it that this contains a court?" with a score in [0, 1].
// The scanner treats it as a black box. Where the score comes from (an ONNX
// network, a remote service, a test double) is an implementation detail.
//
// The same classifier judges full tiles and the quadrants cut from them, so an
// implementation must accept images of any size and do its own preprocessing.

use anyhow::{Result, anyhow};
use image::DynamicImage;

/// Default score at or above which a tile counts as positive.
pub const DEFAULT_CLASSIFICATION_THRESHOLD: f64 = 0.5;

/// A classifier output, guaranteed to lie in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ClassificationScore(f64);

impl ClassificationScore {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(anyhow!("classification score {} is outside [0, 1]", value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_positive(&self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

/// A binary image classifier.
pub trait Classifier {
    /// Scores a raster of any size.
    fn classify(&self, image: &DynamicImage) -> Result<ClassificationScore>;
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn classify(&self, image: &DynamicImage) -> Result<ClassificationScore> {
        (**self).classify(image)
    }
}

impl<T: Classifier + ?Sized> Classifier for &T {
    fn classify(&self, image: &DynamicImage) -> Result<ClassificationScore> {
        (**self).classify(image)
    }
}
