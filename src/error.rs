// THEORY:
// Scan failures fall into two tiers. Tile-level failures (a fetch that returns
// nothing usable) are absorbed where they happen and never show up here.
// Request-level failures abort the whole scan, and `ScanError` is how they
// travel back to the caller.

/// Generic message handed to callers for any request-level fault.
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred during processing";

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Malformed or missing request input. Raised before any processing starts.
    #[error("invalid scan input: {0}")]
    Input(String),
    /// The classifier failed or returned an out-of-range score.
    #[error("classification failed: {0:#}")]
    ClassificationFault(anyhow::Error),
    /// Any other unexpected fault during tiling, refinement or merging.
    #[error("processing failed: {0}")]
    ProcessingFault(String),
}

impl ScanError {
    /// The message safe to return across the request boundary. Input errors
    /// describe what was wrong; every other fault collapses to one generic text.
    pub fn public_message(&self) -> String {
        match self {
            ScanError::Input(_) => self.to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn is_input_error(&self) -> bool {
        matches!(self, ScanError::Input(_))
    }
}
