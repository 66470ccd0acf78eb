// THEORY:
// The `GridTiler` is the first stage of every scan. It turns a geographic
// bounding box into an ordered list of square sample regions (`GridCell`s), each
// represented by its center coordinate and a fixed side length in meters.
//
// Key architectural principles:
// 1.  **Row-Major From the North-West**: Cells are produced row by row, north to
//     south, and within each row west to east. Every later stage processes the
//     cells in exactly this order, which is what makes the order-dependent merge
//     reproducible.
// 2.  **One Longitude Step Per Box**: The east-west step in degrees is computed
//     once from the box's mid latitude rather than per row. Boxes are small, so
//     the drift between the northern and southern rows is negligible.
// 3.  **Centers, Not Corners**: Each reported coordinate sits half a step inside
//     the raw grid line in both axes, so the imagery request is centered on the
//     square it is meant to cover.
// 4.  **Strict Bounds**: Grid lines are generated with strict comparisons and
//     indexed arithmetic (no accumulated floating point), so the terminal edge
//     is never emitted and the loop always terminates. A partial row or column
//     is kept only when its center still falls inside the box.

use crate::core_modules::geo_math::geo_math::{meters_to_lat_degrees, meters_to_lon_degrees};
use crate::core_modules::geo_math::{BoundingBox, Coordinate};

/// Default side length of a grid cell in meters.
pub const DEFAULT_CELL_SIZE_METERS: f64 = 140.0;

/// One square sample region of the scanned area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    /// The center of the cell's square footprint.
    pub center: Coordinate,
    /// The side length of the footprint in meters.
    pub size_meters: f64,
}

/// Builds the ordered cell sequence covering a bounding box.
#[derive(Debug, Clone)]
pub struct GridTiler {
    cell_size_meters: f64,
}

impl GridTiler {
    pub fn new(cell_size_meters: f64) -> Self {
        Self { cell_size_meters }
    }

    /// Upper bound on the number of cells `tile` will produce for this box.
    /// Cheap to compute, so callers can refuse oversized regions up front.
    pub fn estimate_cell_count(&self, bbox: &BoundingBox) -> usize {
        let rows = (bbox.lat_span_meters() / self.cell_size_meters).ceil().max(0.0);
        let cols = (bbox.lon_span_meters() / self.cell_size_meters).ceil().max(0.0);
        (rows * cols) as usize
    }

    /// Produces the row-major sequence of cell centers for the box.
    pub fn tile(&self, bbox: &BoundingBox) -> Vec<GridCell> {
        let north = bbox.top_left.latitude;
        let south = bbox.bottom_right.latitude;
        let west = bbox.top_left.longitude;
        let east = bbox.bottom_right.longitude;

        let d_lat = meters_to_lat_degrees(self.cell_size_meters);
        let d_lon = meters_to_lon_degrees(self.cell_size_meters, bbox.mid_latitude());

        let mut cells = Vec::with_capacity(self.estimate_cell_count(bbox));

        // --- Rows: north to south ---
        let mut row = 0u32;
        loop {
            let row_line = north - row as f64 * d_lat;
            if row_line <= south {
                break;
            }
            let center_lat = row_line - d_lat / 2.0;
            if center_lat < south {
                break;
            }

            // --- Columns: west to east ---
            let mut col = 0u32;
            loop {
                let col_line = west + col as f64 * d_lon;
                if col_line >= east {
                    break;
                }
                let center_lon = col_line + d_lon / 2.0;
                if center_lon > east {
                    break;
                }

                cells.push(GridCell {
                    center: Coordinate::new(center_lat, center_lon),
                    size_meters: self.cell_size_meters,
                });
                col += 1;
            }
            row += 1;
        }

        cells
    }
}

impl Default for GridTiler {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE_METERS)
    }
}
