//! HTTP image fetching with decode verification.
//!
//! Priority requests go straight to the network. Everything else waits for one of a
//! fixed number of download slots.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::domain::entities::{
    ConnectionSnapshot, Dimensions, EffectiveConnectionType, ImageFormat,
};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{ConnectionProbe, DimensionProbe, FetchedImage, ImageFetcher};

/// Decoded sizes remembered for the dimension side channel.
const DIMENSION_CACHE_SIZE: usize = 256;

/// Weight of the newest sample in the throughput estimate.
const THROUGHPUT_SMOOTHING: f64 = 0.3;

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Concurrent non-priority downloads.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Base URL that relative image URLs are resolved against.
    #[serde(default)]
    pub base_url: Option<String>,
}

const fn default_max_concurrent() -> usize {
    6
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::NAME, crate::VERSION)
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            base_url: None,
        }
    }
}

/// Fetches images over HTTP and verifies that they decode.
///
/// Also serves as the dimension and connection probe, reporting what its own
/// downloads observed.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    throttle: Arc<Semaphore>,
    base_url: Option<reqwest::Url>,
    dimensions: Mutex<LruCache<String, Dimensions>>,
    downlink_mbps: Mutex<Option<f64>>,
    config: FetchConfig,
}

impl std::fmt::Debug for HttpImageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpImageFetcher")
            .field("config", &self.config)
            .field("available_slots", &self.throttle.available_permits())
            .finish_non_exhaustive()
    }
}

impl HttpImageFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    /// Returns `LoadError::Network` if the HTTP client cannot be built or the base URL
    /// does not parse.
    pub fn new(config: FetchConfig) -> LoadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| LoadError::network("", format!("Failed to create HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .as_deref()
            .map(reqwest::Url::parse)
            .transpose()
            .map_err(|e| LoadError::network("", format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            throttle: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
            base_url,
            dimensions: Mutex::new(LruCache::new(
                NonZeroUsize::new(DIMENSION_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
            downlink_mbps: Mutex::new(None),
            config,
        })
    }

    /// Creates a fetcher with default configuration.
    ///
    /// # Errors
    /// Returns `LoadError::Network` if the HTTP client cannot be built.
    pub fn with_defaults() -> LoadResult<Self> {
        Self::new(FetchConfig::default())
    }

    fn resolve(&self, url: &str) -> LoadResult<reqwest::Url> {
        if let Ok(parsed) = reqwest::Url::parse(url) {
            return Ok(parsed);
        }
        self.base_url
            .as_ref()
            .ok_or_else(|| LoadError::network(url, "relative URL without a base URL"))?
            .join(url)
            .map_err(|e| LoadError::network(url, format!("Invalid URL: {e}")))
    }

    async fn download(&self, url: &str) -> LoadResult<(Bytes, Option<String>)> {
        let target = self.resolve(url)?;
        let started = Instant::now();

        let response = self.client.get(target).send().await.map_err(|e| {
            if e.is_timeout() {
                LoadError::timeout(url)
            } else {
                LoadError::network(url, format!("Request failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            return Err(LoadError::network(
                url,
                format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    response.status().canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                LoadError::timeout(url)
            } else {
                LoadError::network(url, format!("Failed to read body: {e}"))
            }
        })?;

        self.record_throughput(bytes.len(), started.elapsed());
        Ok((bytes, content_type))
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_throughput(&self, byte_len: usize, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if byte_len == 0 || secs <= f64::EPSILON {
            return;
        }
        let sample = (byte_len as f64 * 8.0) / secs / 1_000_000.0;
        let mut downlink = self.downlink_mbps.lock();
        *downlink = Some(downlink.map_or(sample, |previous| {
            previous + THROUGHPUT_SMOOTHING * (sample - previous)
        }));
    }
}

fn detect_format(url: &str, content_type: Option<&str>, bytes: &[u8]) -> ImageFormat {
    if let Some(format) = content_type
        .map(ImageFormat::from_content_type)
        .filter(|f| *f != ImageFormat::Unknown)
    {
        return format;
    }

    match image::guess_format(bytes) {
        Ok(image::ImageFormat::WebP) => ImageFormat::Webp,
        Ok(image::ImageFormat::Png) => ImageFormat::Png,
        Ok(image::ImageFormat::Jpeg) => ImageFormat::Jpeg,
        Ok(image::ImageFormat::Gif) => ImageFormat::Gif,
        Ok(image::ImageFormat::Avif) => ImageFormat::Avif,
        _ => ImageFormat::from_url(url),
    }
}

/// Formats the built-in codecs can verify.
const fn is_decodable(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Webp | ImageFormat::Png | ImageFormat::Jpeg
    )
}

async fn decode_dimensions(url: &str, bytes: Bytes) -> LoadResult<Dimensions> {
    let owned_url = url.to_string();
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes)
            .map(|img| Dimensions {
                width: img.width(),
                height: img.height(),
            })
            .map_err(|e| LoadError::decode(&owned_url, format!("Decode failed: {e}")))
    })
    .await
    .map_err(|e| LoadError::decode(url, format!("Decode task panicked: {e}")))?
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str, priority: bool) -> LoadResult<FetchedImage> {
        let _permit = if priority {
            None
        } else {
            trace!(url = %url, available = self.throttle.available_permits(), "Waiting for download slot");
            Some(
                self.throttle
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| LoadError::network(url, format!("Download slots closed: {e}")))?,
            )
        };

        debug!(url = %url, priority = priority, "Downloading image");
        let (bytes, content_type) = self.download(url).await?;
        let format = detect_format(url, content_type.as_deref(), &bytes);
        let byte_len = bytes.len();

        let dimensions = if is_decodable(format) {
            let dims = decode_dimensions(url, bytes).await?;
            self.dimensions.lock().put(url.to_string(), dims);
            Some(dims)
        } else {
            warn!(url = %url, format = %format, "No decoder for format, accepting bytes as-is");
            None
        };

        debug!(url = %url, format = %format, bytes = byte_len, "Image fetched");
        Ok(FetchedImage {
            url: url.to_string(),
            format,
            dimensions,
            byte_len,
        })
    }
}

#[async_trait]
impl DimensionProbe for HttpImageFetcher {
    async fn dimensions(&self, url: &str) -> Option<Dimensions> {
        self.dimensions.lock().get(url).copied()
    }
}

impl ConnectionProbe for HttpImageFetcher {
    fn snapshot(&self) -> ConnectionSnapshot {
        let downlink = *self.downlink_mbps.lock();
        ConnectionSnapshot {
            effective_type: downlink.map_or(
                EffectiveConnectionType::Unknown,
                EffectiveConnectionType::from_downlink_mbps,
            ),
            bandwidth_mbps: downlink,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// Serves one canned response per connection.
    async fn serve(status: &'static str, content_type: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let head = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_decodes_dimensions() {
        let base = serve("200 OK", "image/png", png(4, 3)).await;
        let fetcher = HttpImageFetcher::with_defaults().unwrap();
        let url = format!("{base}/product.png");

        let image = fetcher.fetch(&url, false).await.unwrap();

        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(
            image.dimensions,
            Some(Dimensions {
                width: 4,
                height: 3
            })
        );
        assert_eq!(fetcher.dimensions(&url).await, image.dimensions);
        assert!(fetcher.snapshot().bandwidth_mbps.is_some());
    }

    #[tokio::test]
    async fn test_http_error_is_network_error() {
        let base = serve("404 Not Found", "text/plain", b"missing".to_vec()).await;
        let fetcher = HttpImageFetcher::with_defaults().unwrap();

        let err = fetcher.fetch(&format!("{base}/gone.webp"), true).await.unwrap_err();

        assert!(err.is_network_error());
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_corrupt_body_is_decode_error() {
        let base = serve("200 OK", "image/webp", b"not really webp".to_vec()).await;
        let fetcher = HttpImageFetcher::with_defaults().unwrap();

        let err = fetcher.fetch(&format!("{base}/broken.webp"), false).await.unwrap_err();

        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_relative_url_uses_base() {
        let base = serve("200 OK", "image/png", png(2, 2)).await;
        let fetcher = HttpImageFetcher::new(FetchConfig {
            base_url: Some(base),
            ..FetchConfig::default()
        })
        .unwrap();

        let image = fetcher.fetch("/static/logo.png", true).await.unwrap();
        assert!(image.dimensions.is_some_and(Dimensions::is_square));
    }

    #[tokio::test]
    async fn test_relative_url_without_base_fails() {
        let fetcher = HttpImageFetcher::with_defaults().unwrap();
        let err = fetcher.fetch("/static/logo.png", true).await.unwrap_err();
        assert!(err.is_network_error());
    }

    #[test]
    fn test_unknown_connection_before_downloads() {
        let fetcher = HttpImageFetcher::with_defaults().unwrap();
        assert_eq!(fetcher.snapshot(), ConnectionSnapshot::default());
    }
}
