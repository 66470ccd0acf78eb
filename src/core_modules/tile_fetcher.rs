// THEORY:
// The `TileFetcher` is the only concurrent stage of a scan. It takes the full,
// ordered list of cell centers and asks the `ImageSource` for every one of them
// at once, then waits at a single barrier until every request has resolved.
//
// Key architectural principles:
// 1.  **Index Alignment**: The output has exactly one slot per input coordinate,
//     in the same order. Slot `i` belongs to coordinate `i` and nothing else, so
//     the concurrent requests never share mutable state.
// 2.  **Failure Is Local**: A non-success status, a transport error or a payload
//     that does not decode only empties its own slot. The batch as a whole never
//     fails.
// 3.  **Optional Bound**: By default every request is in flight at once. A
//     concurrency limit can be configured for large regions; it changes how many
//     requests run together, never the shape or order of the result.
// 4.  **No Timeouts, No Retries**: Both belong to the `ImageSource`. A source
//     that never answers stalls the barrier.

use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use image::DynamicImage;
use log::{debug, warn};

use crate::core_modules::geo_math::Coordinate;
use crate::core_modules::image_source::{ImageSource, TileRequest};

/// A decoded tile, or `None` where acquisition failed.
pub type Tile = Option<DynamicImage>;

/// Fans tile requests out to an `ImageSource` and gathers the decoded results.
#[derive(Debug, Clone)]
pub struct TileFetcher {
    request: TileRequest,
    max_concurrent: Option<usize>,
}

impl TileFetcher {
    pub fn new(request: TileRequest, max_concurrent: Option<usize>) -> Self {
        Self {
            request,
            max_concurrent,
        }
    }

    /// Fetches and decodes one tile per coordinate. The result is index-aligned
    /// with `coordinates`.
    pub async fn fetch_all<S: ImageSource>(&self, source: &S, coordinates: &[Coordinate]) -> Vec<Tile> {
        let fetches = coordinates
            .iter()
            .enumerate()
            .map(|(index, coordinate)| self.fetch_one(source, index, *coordinate));

        let tiles: Vec<Tile> = match self.max_concurrent {
            None => join_all(fetches).await,
            Some(limit) => stream::iter(fetches).buffered(limit.max(1)).collect().await,
        };

        let present = tiles.iter().filter(|t| t.is_some()).count();
        debug!("fetched {}/{} tiles", present, tiles.len());
        tiles
    }

    /// Fetches and decodes a single tile.
    pub async fn fetch_one<S: ImageSource>(&self, source: &S, index: usize, coordinate: Coordinate) -> Tile {
        let bytes = match source.fetch(coordinate, self.request).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    "tile {} at ({:.6}, {:.6}) unavailable: {:#}",
                    index, coordinate.latitude, coordinate.longitude, err
                );
                return None;
            }
        };

        match image::load_from_memory(&bytes) {
            Ok(image) => Some(image),
            Err(err) => {
                warn!(
                    "tile {} at ({:.6}, {:.6}) could not be decoded: {}",
                    index, coordinate.latitude, coordinate.longitude, err
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::future::Future;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn png_with_width(width: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, 4, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    /// Encodes the coordinate's latitude as the image width, and sleeps longer
    /// for earlier coordinates so completion order is the reverse of input order.
    struct WidthSource {
        total: usize,
    }

    impl ImageSource for WidthSource {
        fn fetch(&self, coordinate: Coordinate, _request: TileRequest) -> impl Future<Output = Result<Vec<u8>>> + Send {
            let index = coordinate.latitude as usize;
            let delay = Duration::from_millis(((self.total - index) * 5) as u64);
            async move {
                tokio::time::sleep(delay).await;
                match index % 3 {
                    1 => Err(anyhow!("status 403")),
                    2 => Ok(b"not an image".to_vec()),
                    _ => Ok(png_with_width(index as u32 + 1)),
                }
            }
        }
    }

    #[tokio::test]
    async fn results_are_index_aligned_and_failures_are_absent() {
        let coordinates: Vec<Coordinate> = (0..9).map(|i| Coordinate::new(i as f64, 0.0)).collect();
        let fetcher = TileFetcher::new(TileRequest::default(), None);

        let tiles = fetcher.fetch_all(&WidthSource { total: 9 }, &coordinates).await;

        assert_eq!(tiles.len(), coordinates.len());
        for (index, tile) in tiles.iter().enumerate() {
            match index % 3 {
                0 => assert_eq!(tile.as_ref().map(|t| t.width()), Some(index as u32 + 1)),
                _ => assert!(tile.is_none(), "slot {index} should be absent"),
            }
        }
    }

    struct CountingSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl ImageSource for CountingSource {
        fn fetch(&self, _coordinate: Coordinate, _request: TileRequest) -> impl Future<Output = Result<Vec<u8>>> + Send {
            async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(png_with_width(2))
            }
        }
    }

    #[tokio::test]
    async fn unbounded_fetch_launches_every_request_at_once() {
        let coordinates = vec![Coordinate::new(0.0, 0.0); 12];
        let source = CountingSource::new();

        let tiles = TileFetcher::new(TileRequest::default(), None).fetch_all(&source, &coordinates).await;

        assert_eq!(tiles.iter().filter(|t| t.is_some()).count(), 12);
        assert_eq!(source.peak.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn concurrency_limit_caps_in_flight_requests_without_changing_results() {
        let coordinates = vec![Coordinate::new(0.0, 0.0); 12];
        let source = CountingSource::new();

        let tiles = TileFetcher::new(TileRequest::default(), Some(3)).fetch_all(&source, &coordinates).await;

        assert_eq!(tiles.len(), 12);
        assert!(tiles.iter().all(|t| t.is_some()));
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let tiles = TileFetcher::new(TileRequest::default(), Some(4))
            .fetch_all(&CountingSource::new(), &[])
            .await;
        assert!(tiles.is_empty());
    }
}
