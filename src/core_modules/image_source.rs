// THEORY:
// The `ImageSource` is the boundary between the scanner and whatever service
// supplies overhead imagery. The scanner only ever asks one question of it:
// "give me the encoded image centered on this coordinate." Everything about
// URLs, keys, HTTP status codes and retries lives behind this trait.
//
// A source reports any failure as an `Err`. The fetch orchestrator is the one
// that decides such a failure only costs a single tile; the source itself does
// not need to know that.

use std::future::Future;
use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use url::Url;

use crate::core_modules::geo_math::Coordinate;

/// Default static map endpoint.
pub const DEFAULT_STATIC_MAP_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";

const MAX_TILE_BYTES: usize = 8 * 1024 * 1024;

/// Imagery parameters sent with every tile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
}

impl Default for TileRequest {
    fn default() -> Self {
        Self {
            zoom: 19,
            width: 1000,
            height: 1000,
        }
    }
}

/// A provider of encoded imagery for a coordinate.
pub trait ImageSource: Send + Sync {
    /// Fetches the encoded image centered on `coordinate`.
    fn fetch(
        &self,
        coordinate: Coordinate,
        request: TileRequest,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

impl<T: ImageSource> ImageSource for &T {
    fn fetch(
        &self,
        coordinate: Coordinate,
        request: TileRequest,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send {
        (**self).fetch(coordinate, request)
    }
}

/// Satellite imagery from a static-map HTTP service.
///
/// Requests are blocking `ureq` calls moved onto tokio's blocking pool, so many
/// of them can be in flight at once without stalling the runtime.
#[derive(Clone)]
pub struct StaticMapSource {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl StaticMapSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: DEFAULT_STATIC_MAP_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Points the source at a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Applies an overall per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::AgentBuilder::new().timeout(timeout).build();
        self
    }

    /// Builds the request URL for a tile.
    pub fn tile_url(&self, coordinate: Coordinate, request: TileRequest) -> Result<Url> {
        let center = format!("{},{}", coordinate.latitude, coordinate.longitude);
        let zoom = request.zoom.to_string();
        let size = format!("{}x{}", request.width, request.height);
        Url::parse_with_params(
            &self.base_url,
            &[
                ("center", center.as_str()),
                ("zoom", zoom.as_str()),
                ("size", size.as_str()),
                ("maptype", "satellite"),
                ("key", self.api_key.as_str()),
            ],
        )
        .with_context(|| format!("invalid static map base url '{}'", self.base_url))
    }
}

impl ImageSource for StaticMapSource {
    fn fetch(
        &self,
        coordinate: Coordinate,
        request: TileRequest,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send {
        let agent = self.agent.clone();
        let url = self.tile_url(coordinate, request);
        async move {
            let url = url?;
            tokio::task::spawn_blocking(move || fetch_blocking(&agent, &url))
                .await
                .context("tile fetch task did not complete")?
        }
    }
}

fn fetch_blocking(agent: &ureq::Agent, url: &Url) -> Result<Vec<u8>> {
    let response = match agent.get(url.as_str()).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => return Err(anyhow!("image source returned status {}", code)),
        Err(err) => return Err(anyhow!("image source transport error: {}", err)),
    };
    if response.status() != 200 {
        return Err(anyhow!("image source returned status {}", response.status()));
    }

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_TILE_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .context("read tile body")?;
    if bytes.len() > MAX_TILE_BYTES {
        return Err(anyhow!("tile body exceeds {} bytes", MAX_TILE_BYTES));
    }
    Ok(bytes)
}
