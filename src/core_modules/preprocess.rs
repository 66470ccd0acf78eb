// THEORY:
// Imagery arrives at whatever size the provider serves it, with an attribution
// strip burned into the bottom edge. Before a tile (or a quadrant of one) reaches
// a model it is brought to the exact shape the model was trained on.
//
// Steps, in order:
// 1.  **Attribution Crop**: Drop the bottom few percent of rows so the provider's
//     logo and copyright text never influence the score.
// 2.  **Resize**: Stretch to the model's input size. Aspect ratio is not
//     preserved, matching how training images were prepared.
// 3.  **Normalize**: Convert to RGB and scale each channel to [0, 1].

use image::DynamicImage;
use image::imageops::FilterType;

/// Shape of the model input and how much of the tile bottom to discard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessOptions {
    pub input_width: u32,
    pub input_height: u32,
    /// Fraction of the image height removed from the bottom edge.
    pub attribution_crop_fraction: f64,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            input_width: 150,
            input_height: 150,
            attribution_crop_fraction: 0.03,
        }
    }
}

/// A model-ready RGB buffer in row-major, channel-interleaved (HWC) order.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTile {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

/// Removes the bottom `fraction` of rows. Always keeps at least one row.
pub fn crop_attribution(image: &DynamicImage, fraction: f64) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let cropped_rows = (height as f64 * fraction.clamp(0.0, 1.0)) as u32;
    let kept = height.saturating_sub(cropped_rows).max(1).min(height);
    image.crop_imm(0, 0, width, kept)
}

pub fn prepare_tile(image: &DynamicImage, options: &PreprocessOptions) -> PreparedTile {
    let cropped = crop_attribution(image, options.attribution_crop_fraction);
    let resized = cropped
        .resize_exact(options.input_width, options.input_height, FilterType::Triangle)
        .to_rgb8();

    let pixels = resized.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    PreparedTile {
        width: options.input_width,
        height: options.input_height,
        pixels,
    }
}
