pub mod classifier;
pub mod geo_math;
pub mod grid_tiler;
pub mod image_source;
pub mod preprocess;
pub mod proximity_merger;
pub mod quadrant_refiner;
pub mod tile_fetcher;
pub mod tract_classifier;
